//! Run orchestration: one initial-provisioning or renewal pass

use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::ca::{CaClient, IssuanceRequest};
use crate::config::{Config, RunMode, StateFile};
use crate::error::LifecycleError;
use crate::lifecycle::csr;
use crate::lifecycle::hook;
use crate::lifecycle::scheduler;
use crate::lifecycle::store::CertificateStore;
use crate::lifecycle::validity;

/// Terminal result of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Initial provisioning completed and the periodic job was installed.
    Provisioned,
    /// A new certificate replaced the expiring one.
    Renewed,
    /// The stored certificate is still outside the renewal buffer. The
    /// run was a no-op, which is success, not an error.
    NotDue,
}

/// What a completed run produced. Non-fatal failures (hook, revocation)
/// are carried as warnings: by the time they can occur the new
/// certificate is already durably in force.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub warnings: Vec<LifecycleError>,
}

/// Drives one run through the lifecycle state machine.
pub struct Orchestrator<'a> {
    config: &'a Config,
    ca: &'a dyn CaClient,
    store: CertificateStore,
    cron_path: PathBuf,
    invocation_command: String,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a Config, ca: &'a dyn CaClient) -> Self {
        Self {
            config,
            ca,
            store: CertificateStore::new(&config.destination_dir),
            cron_path: PathBuf::from(scheduler::DEFAULT_CRON_PATH),
            invocation_command: format!(
                "test -x /usr/bin/originbot && originbot >> {}/debug.log 2>&1",
                config.destination_dir.display()
            ),
        }
    }

    /// Override where the periodic job definition is written.
    pub fn with_cron_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cron_path = path.into();
        self
    }

    /// Override the command line the periodic job invokes.
    pub fn with_invocation_command(mut self, command: impl Into<String>) -> Self {
        self.invocation_command = command.into();
        self
    }

    /// Execute the run. On a fatal error the configured on-error command
    /// is attempted best-effort before the error propagates.
    pub async fn run(&self) -> Result<RunReport, LifecycleError> {
        let result = self.run_inner().await;

        if result.is_err() && !self.config.on_error_command.is_empty() {
            let timeout = Duration::from_secs(self.config.hook_timeout_secs);
            if let Err(hook_err) = hook::run_hook(&self.config.on_error_command, timeout).await {
                warn!("On-error command failed: {}", hook_err);
            }
        }

        result
    }

    async fn run_inner(&self) -> Result<RunReport, LifecycleError> {
        // START: nothing downstream re-checks these invariants.
        self.config.validate()?;

        self.store.ensure_directory()?;
        let _lock = self.store.acquire_lock()?;

        let mut warnings = Vec::new();
        let existing = self.store.load()?;

        // Initial mode, or nothing (complete) on disk: there is no record
        // to evaluate, go straight to issuance.
        let prior_id = match (&self.config.run_mode, &existing) {
            (RunMode::Initial, _) | (_, None) => None,
            (RunMode::Renewal, Some(record)) => {
                match validity::parse_expiry(&record.certificate_pem) {
                    Ok(expires_at) => {
                        let now = chrono::Utc::now();
                        if !validity::needs_renewal(expires_at, now, self.config.buffer_hours) {
                            info!(
                                expires_at = %expires_at,
                                buffer_hours = self.config.buffer_hours,
                                "Certificate is still valid outside the buffer, not renewing"
                            );
                            return Ok(RunReport {
                                outcome: RunOutcome::NotDue,
                                warnings,
                            });
                        }
                        info!(expires_at = %expires_at, "Certificate is due for renewal");
                    }
                    Err(parse_err) => {
                        // Corrupted local state is handled conservatively:
                        // re-issue rather than trust it.
                        warn!("Stored certificate unparseable, forcing renewal: {}", parse_err);
                        warnings.push(parse_err);
                    }
                }

                self.config
                    .previous_certificate_id
                    .clone()
                    .or_else(|| record.certificate_id().map(str::to_string))
            }
        };

        // ISSUING
        let generated = csr::generate_key_and_csr(&self.config.hostnames)?;
        let request = IssuanceRequest {
            csr_pem: generated.csr_pem,
            hostnames: self.config.hostnames.clone(),
            validity_days: self.config.validity_days,
        };

        let ca_timeout = Duration::from_secs(self.config.ca_timeout_secs);
        let issued = tokio::time::timeout(ca_timeout, self.ca.issue_certificate(&request))
            .await
            .map_err(|_| {
                LifecycleError::CaRequest(format!(
                    "{} did not answer within {} seconds",
                    self.ca.ca_name(),
                    ca_timeout.as_secs()
                ))
            })??;

        // PERSISTED: the state file records the new certificate id so the
        // next renewal run knows what to revoke.
        let state = StateFile {
            auth_key: self.config.auth_key.clone(),
            hostnames: self.config.hostnames.clone(),
            validity_days: self.config.validity_days,
            post_renew_command: self.config.post_renew_command.clone(),
            previous_certificate_id: Some(issued.certificate_id.clone()),
        };
        self.store
            .persist_atomically(&generated.key_pem, &issued.certificate_pem, &state)?;
        info!(
            certificate_id = %issued.certificate_id,
            directory = %self.config.destination_dir.display(),
            "New certificate persisted"
        );

        // HOOK_RUN: always attempted after persistence, never fatal.
        let hook_timeout = Duration::from_secs(self.config.hook_timeout_secs);
        if let Err(hook_err) = hook::run_hook(&self.config.post_renew_command, hook_timeout).await {
            error!("Post-renew hook failed (certificate is still valid): {}", hook_err);
            warnings.push(hook_err);
        }

        match self.config.run_mode {
            RunMode::Initial => {
                // SCHEDULED: setup-time failure is fatal, the operator
                // asked for unattended renewal and did not get it.
                let definition = scheduler::render_cron_definition(
                    self.config.buffer_hours,
                    &self.invocation_command,
                );
                scheduler::install(&self.cron_path, &definition)?;
                Ok(RunReport {
                    outcome: RunOutcome::Provisioned,
                    warnings,
                })
            }
            RunMode::Renewal => {
                // REVOKED: best-effort, the renewal already succeeded.
                if let Some(prior_id) = prior_id {
                    let revoke = tokio::time::timeout(
                        ca_timeout,
                        self.ca.revoke_certificate(&prior_id),
                    )
                    .await
                    .unwrap_or_else(|_| {
                        Err(LifecycleError::Revocation(format!(
                            "revocation of {} timed out",
                            prior_id
                        )))
                    });
                    if let Err(revoke_err) = revoke {
                        error!("Failed to revoke superseded certificate: {}", revoke_err);
                        warnings.push(revoke_err);
                    }
                } else {
                    info!("No prior certificate id recorded, nothing to revoke");
                }
                Ok(RunReport {
                    outcome: RunOutcome::Renewed,
                    warnings,
                })
            }
        }
    }
}
