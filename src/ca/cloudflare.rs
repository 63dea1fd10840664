//! Cloudflare Origin CA API client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{CaClient, IssuanceRequest, IssuedCertificate};
use crate::error::LifecycleError;

const CLOUDFLARE_API_ENDPOINT: &str = "https://api.cloudflare.com/client/v4";

/// Cloudflare Origin CA adapter.
///
/// Authenticates with an Origin CA service key sent as
/// `X-Auth-User-Service-Key`. Requests are bounded by the timeout handed
/// in at construction; expiry surfaces as `CaRequest`.
#[derive(Clone)]
pub struct CloudflareCaClient {
    service_key: String,
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for CloudflareCaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareCaClient")
            .field("base_url", &self.base_url)
            .field("service_key", &"<REDACTED>")
            .finish()
    }
}

/// Standard Cloudflare v4 response envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct CertificateResult {
    id: String,
    certificate: String,
}

#[derive(Debug, Deserialize)]
struct RevokeResult {
    #[allow(dead_code)]
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateCertificateBody<'a> {
    hostnames: &'a [String],
    requested_validity: u32,
    request_type: &'static str,
    csr: &'a str,
}

impl CloudflareCaClient {
    pub fn new(service_key: String, timeout: Duration) -> Result<Self, LifecycleError> {
        Self::with_base_url(service_key, CLOUDFLARE_API_ENDPOINT.to_string(), timeout)
    }

    /// Construct against an alternate endpoint. Used by tests.
    pub fn with_base_url(
        service_key: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, LifecycleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LifecycleError::CaRequest(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            service_key,
            base_url,
            client,
        })
    }

    fn format_errors(errors: &[ApiError]) -> String {
        if errors.is_empty() {
            return "no error detail returned".to_string();
        }
        errors
            .iter()
            .map(|e| format!("{} (code {})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[async_trait]
impl CaClient for CloudflareCaClient {
    async fn issue_certificate(
        &self,
        request: &IssuanceRequest,
    ) -> Result<IssuedCertificate, LifecycleError> {
        let url = format!("{}/certificates", self.base_url);
        let body = CreateCertificateBody {
            hostnames: &request.hostnames,
            requested_validity: request.validity_days,
            request_type: "origin-rsa",
            csr: &request.csr_pem,
        };

        debug!(
            hostnames = ?request.hostnames,
            validity_days = request.validity_days,
            "Requesting origin certificate"
        );

        let response = self
            .client
            .post(&url)
            .header("X-Auth-User-Service-Key", &self.service_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LifecycleError::CaRequest("issuance request timed out".to_string())
                } else {
                    LifecycleError::CaRequest(format!("issuance request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LifecycleError::Authentication(format!(
                "service key rejected (HTTP {})",
                status.as_u16()
            )));
        }

        let envelope: ApiEnvelope<CertificateResult> = response.json().await.map_err(|e| {
            LifecycleError::CaRequest(format!("malformed issuance response: {}", e))
        })?;

        if !envelope.success {
            return Err(LifecycleError::CaRequest(format!(
                "issuance rejected: {}",
                Self::format_errors(&envelope.errors)
            )));
        }

        let result = envelope.result.ok_or_else(|| {
            LifecycleError::CaRequest("issuance response missing result".to_string())
        })?;

        info!(certificate_id = %result.id, "Origin certificate issued");

        Ok(IssuedCertificate {
            certificate_pem: result.certificate,
            certificate_id: result.id,
        })
    }

    async fn revoke_certificate(&self, certificate_id: &str) -> Result<(), LifecycleError> {
        let url = format!("{}/certificates/{}", self.base_url, certificate_id);

        let response = self
            .client
            .delete(&url)
            .header("X-Auth-User-Service-Key", &self.service_key)
            .send()
            .await
            .map_err(|e| LifecycleError::Revocation(format!("revocation request failed: {}", e)))?;

        let status = response.status();
        let envelope: ApiEnvelope<RevokeResult> = response.json().await.map_err(|e| {
            LifecycleError::Revocation(format!("malformed revocation response: {}", e))
        })?;

        if !envelope.success {
            return Err(LifecycleError::Revocation(format!(
                "revocation rejected (HTTP {}): {}",
                status.as_u16(),
                Self::format_errors(&envelope.errors)
            )));
        }

        info!(certificate_id = %certificate_id, "Revoked superseded certificate");
        Ok(())
    }

    fn ca_name(&self) -> &str {
        "Cloudflare Origin CA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_service_key() {
        let client = CloudflareCaClient::new(
            "v1.0-secret-key".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<REDACTED>"));
    }

    #[test]
    fn test_format_errors_joins_messages() {
        let errors = vec![
            ApiError {
                code: 1010,
                message: "bad key".to_string(),
            },
            ApiError {
                code: 1100,
                message: "quota".to_string(),
            },
        ];
        let text = CloudflareCaClient::format_errors(&errors);
        assert!(text.contains("bad key (code 1010)"));
        assert!(text.contains("quota (code 1100)"));
    }

    #[test]
    fn test_format_errors_empty() {
        assert_eq!(
            CloudflareCaClient::format_errors(&[]),
            "no error detail returned"
        );
    }

    #[test]
    fn test_envelope_parses_issuance_result() {
        let json = r#"{
            "success": true,
            "errors": [],
            "messages": [],
            "result": {
                "id": "cert-123",
                "certificate": "-----BEGIN CERTIFICATE-----\n...",
                "expires_on": "2027-01-01 00:00:00 +0000 UTC"
            }
        }"#;
        let envelope: ApiEnvelope<CertificateResult> = serde_json::from_str(json).unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.result.unwrap().id, "cert-123");
    }
}
