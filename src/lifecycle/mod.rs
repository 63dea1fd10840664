// Certificate lifecycle: issuance decision, persistence, and side effects

pub mod csr;
pub mod hook;
pub mod orchestrator;
pub mod scheduler;
pub mod store;
pub mod validity;

pub use orchestrator::{Orchestrator, RunOutcome, RunReport};
pub use store::{CertificateRecord, CertificateStore};
