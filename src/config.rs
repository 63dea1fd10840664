use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::LifecycleError;

/// How this invocation was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// First run for a destination: issue, persist, install the cron job.
    Initial,
    /// Steady-state run: evaluate validity, conditionally re-issue and
    /// revoke the superseded certificate.
    Renewal,
}

/// Fully-resolved configuration for one run.
///
/// Constructed once by the CLI layer (flags on initial runs, the persisted
/// state file on renewal runs) and passed by reference through every
/// component call. No component reads ambient state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Origin CA service key used to authenticate against the CA API.
    pub auth_key: String,
    /// Hostnames for the certificate SAN list. Non-empty, unique.
    pub hostnames: Vec<String>,
    /// Requested certificate validity in days.
    pub validity_days: u32,
    /// Command executed through a shell after a successful issuance.
    /// Empty means no-op.
    pub post_renew_command: String,
    /// Command executed through a shell when a run aborts. Empty means
    /// no-op. Its own failure is only logged.
    pub on_error_command: String,
    /// Directory holding the state file and the `live/` key/cert pair.
    pub destination_dir: PathBuf,
    pub run_mode: RunMode,
    /// Identifier of the certificate currently in force, revoked after a
    /// successful renewal. Absent means nothing to revoke; never
    /// fabricated.
    pub previous_certificate_id: Option<String>,
    /// Upper bound on the CA issuance/revocation calls, in seconds.
    pub ca_timeout_secs: u64,
    /// Upper bound on the post-renew command, in seconds.
    pub hook_timeout_secs: u64,
    /// Renewal lead time before expiry, in hours.
    pub buffer_hours: i64,
}

/// Default renewal buffer: twice-daily scheduled checks get at least one
/// retry window before actual expiry.
pub const DEFAULT_BUFFER_HOURS: i64 = 48;

pub const DEFAULT_CA_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 120;

impl Config {
    /// Validate the invariants every component is allowed to assume.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.auth_key.is_empty() {
            return Err(LifecycleError::Configuration(
                "auth key not set (pass --auth)".to_string(),
            ));
        }
        if self.hostnames.is_empty() {
            return Err(LifecycleError::Configuration(
                "hostnames not set (pass --hostnames)".to_string(),
            ));
        }
        let mut unique = self.hostnames.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != self.hostnames.len() {
            return Err(LifecycleError::Configuration(
                "hostnames must be unique".to_string(),
            ));
        }
        if self.validity_days == 0 {
            return Err(LifecycleError::Configuration(
                "validity must be a positive number of days".to_string(),
            ));
        }
        Ok(())
    }
}

/// On-disk state file (`originbot.json`).
///
/// Holds the non-secret-derivable fields needed for unattended renewal
/// runs. Unknown keys are ignored on read for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(rename = "auth")]
    pub auth_key: String,
    pub hostnames: Vec<String>,
    #[serde(rename = "validity")]
    pub validity_days: u32,
    #[serde(rename = "postRenewCommand", default, skip_serializing_if = "String::is_empty")]
    pub post_renew_command: String,
    #[serde(rename = "previousCertificateId", default, skip_serializing_if = "Option::is_none")]
    pub previous_certificate_id: Option<String>,
}

impl StateFile {
    /// Resolve a renewal-run `Config` from persisted state.
    pub fn into_config(self, destination_dir: &Path) -> Config {
        Config {
            auth_key: self.auth_key,
            hostnames: self.hostnames,
            validity_days: self.validity_days,
            post_renew_command: self.post_renew_command,
            on_error_command: String::new(),
            destination_dir: destination_dir.to_path_buf(),
            run_mode: RunMode::Renewal,
            previous_certificate_id: self.previous_certificate_id,
            ca_timeout_secs: DEFAULT_CA_TIMEOUT_SECS,
            hook_timeout_secs: DEFAULT_HOOK_TIMEOUT_SECS,
            buffer_hours: DEFAULT_BUFFER_HOURS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            auth_key: "v1.0-test-key".to_string(),
            hostnames: vec!["a.example.com".to_string()],
            validity_days: 30,
            post_renew_command: String::new(),
            on_error_command: String::new(),
            destination_dir: PathBuf::from("/tmp/originbot"),
            run_mode: RunMode::Initial,
            previous_certificate_id: None,
            ca_timeout_secs: DEFAULT_CA_TIMEOUT_SECS,
            hook_timeout_secs: DEFAULT_HOOK_TIMEOUT_SECS,
            buffer_hours: DEFAULT_BUFFER_HOURS,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_auth_rejected() {
        let mut config = valid_config();
        config.auth_key = String::new();
        assert!(matches!(
            config.validate(),
            Err(LifecycleError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_hostnames_rejected() {
        let mut config = valid_config();
        config.hostnames.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_hostnames_rejected() {
        let mut config = valid_config();
        config.hostnames = vec!["a.example.com".into(), "a.example.com".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_validity_rejected() {
        let mut config = valid_config();
        config.validity_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_file_round_trip_uses_wire_keys() {
        let state = StateFile {
            auth_key: "key".to_string(),
            hostnames: vec!["a.example.com".to_string()],
            validity_days: 30,
            post_renew_command: "systemctl reload nginx".to_string(),
            previous_certificate_id: Some("cert-123".to_string()),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["auth"], "key");
        assert_eq!(json["validity"], 30);
        assert_eq!(json["previousCertificateId"], "cert-123");

        let parsed: StateFile = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.previous_certificate_id.as_deref(), Some("cert-123"));
    }

    #[test]
    fn test_state_file_ignores_unknown_keys() {
        let json = r#"{
            "auth": "key",
            "hostnames": ["a.example.com"],
            "validity": 30,
            "futureField": {"nested": true}
        }"#;
        let parsed: StateFile = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.validity_days, 30);
        assert!(parsed.previous_certificate_id.is_none());
        assert!(parsed.post_renew_command.is_empty());
    }
}
