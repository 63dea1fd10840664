//! Certificate authority abstraction for issuance and revocation

pub mod cloudflare;

pub use cloudflare::CloudflareCaClient;

use async_trait::async_trait;

use crate::error::LifecycleError;

/// Everything the CA needs to issue an origin certificate.
#[derive(Debug, Clone)]
pub struct IssuanceRequest {
    /// PEM-encoded PKCS#10 certificate signing request.
    pub csr_pem: String,
    /// Hostnames the certificate must cover.
    pub hostnames: Vec<String>,
    /// Requested validity in days.
    pub validity_days: u32,
}

/// A certificate freshly issued by the CA.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    /// PEM-encoded certificate.
    pub certificate_pem: String,
    /// CA-assigned identifier, used for later revocation.
    pub certificate_id: String,
}

/// Capability interface to a certificate authority.
///
/// The credential is held by the adapter; callers never see it. Neither
/// operation retries internally: retry policy belongs to the orchestrator,
/// whose resilience comes from the external scheduler re-invoking the
/// whole flow.
#[async_trait]
pub trait CaClient: Send + Sync {
    /// Request issuance of an origin certificate from a CSR.
    ///
    /// Fails with `Authentication` when the credential is rejected and
    /// `CaRequest` for any other rejection (invalid hostnames, quota,
    /// network failure, timeout).
    async fn issue_certificate(
        &self,
        request: &IssuanceRequest,
    ) -> Result<IssuedCertificate, LifecycleError>;

    /// Revoke a previously issued certificate by id. Best-effort: a
    /// `Revocation` error must never invalidate a completed renewal.
    async fn revoke_certificate(&self, certificate_id: &str) -> Result<(), LifecycleError>;

    /// CA name for logging.
    fn ca_name(&self) -> &str;
}
