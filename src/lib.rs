//! Automated issuance and renewal of Cloudflare origin certificates.
//!
//! The lifecycle core lives in [`lifecycle`]: the renewal decision, CSR
//! generation, atomic persistence, prior-certificate revocation, and the
//! post-renewal side effects. [`ca`] abstracts the certificate authority
//! behind a capability trait with a Cloudflare adapter. The binary in
//! `main.rs` is a thin clap/tracing shell around [`lifecycle::Orchestrator`].

pub mod ca;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
