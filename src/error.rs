//! Error taxonomy for the certificate lifecycle

use thiserror::Error;

/// Errors surfaced by the lifecycle core.
///
/// Fatal variants abort the run before anything on disk is replaced.
/// `Hook` and `Revocation` are reported on the run outcome instead of
/// propagated: by the time they can occur the new certificate is already
/// durably persisted.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Invalid resolved configuration (missing auth key, empty hostnames,
    /// non-positive validity). Not retryable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// RSA key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// PKCS#10 request construction failed.
    #[error("CSR construction failed: {0}")]
    Csr(String),

    /// The CA rejected the credential. Not retryable.
    #[error("CA authentication failed: {0}")]
    Authentication(String),

    /// Any other CA-side or network failure, including a timed-out
    /// issuance call. Retryable on the next scheduled run.
    #[error("CA request failed: {0}")]
    CaRequest(String),

    /// Filesystem failure while loading or persisting artifacts. The
    /// previous triple on disk is left intact.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The stored certificate is unreadable or malformed. Treated by the
    /// orchestrator as renewal-required, not as fatal.
    #[error("stored certificate unparseable: {0}")]
    CertificateParse(String),

    /// The post-renew command could not be started, timed out, or exited
    /// non-zero. Never unwinds a completed renewal.
    #[error("post-renew hook failed: {0}")]
    Hook(String),

    /// Revoking the superseded certificate failed. Never unwinds a
    /// completed renewal.
    #[error("revocation failed: {0}")]
    Revocation(String),

    /// The periodic job definition could not be written. Fatal only
    /// during initial provisioning.
    #[error("scheduler install failed: {0}")]
    SchedulerInstall(String),
}

impl LifecycleError {
    /// Process exit code for the CLI boundary. Success paths exit 0; the
    /// mapping here is stable so wrapper scripts can branch on it.
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::Configuration(_) => 2,
            LifecycleError::KeyGeneration(_) | LifecycleError::Csr(_) => 3,
            LifecycleError::Authentication(_) => 4,
            LifecycleError::CaRequest(_) => 5,
            LifecycleError::Persistence(_) => 6,
            LifecycleError::CertificateParse(_) => 7,
            LifecycleError::SchedulerInstall(_) => 8,
            // Non-fatal kinds still get a code in case a caller surfaces
            // them directly.
            LifecycleError::Hook(_) | LifecycleError::Revocation(_) => 9,
        }
    }
}
