use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use originbot::ca::CloudflareCaClient;
use originbot::config::{
    Config, RunMode, StateFile, DEFAULT_BUFFER_HOURS, DEFAULT_CA_TIMEOUT_SECS,
    DEFAULT_HOOK_TIMEOUT_SECS,
};
use originbot::error::LifecycleError;
use originbot::lifecycle::{scheduler, CertificateStore, Orchestrator, RunOutcome};
use originbot::observability;

#[derive(Parser)]
#[command(name = "originbot")]
#[command(version)]
#[command(about = "Automatically obtain and renew origin certificates from Cloudflare", long_about = None)]
struct Cli {
    /// Initialize: issue the first certificate and install the renewal cron job
    #[arg(long)]
    init: bool,

    /// Origin CA service key used as auth
    #[arg(long, default_value = "")]
    auth: String,

    /// Hostnames for the certificate SAN list (comma separated)
    #[arg(long, value_delimiter = ',')]
    hostnames: Vec<String>,

    /// Requested certificate validity in days
    #[arg(short = 'v', long, default_value_t = 30)]
    validity: u32,

    /// Command executed after a successful issuance (e.g. "nginx -s reload")
    #[arg(short = 'p', long = "post-renew", default_value = "")]
    post_renew: String,

    /// Command executed when a run aborts
    #[arg(short = 'e', long = "on-error", default_value = "")]
    on_error: String,

    /// Directory for the state file and live key/certificate pair
    #[arg(short = 'd', long, default_value = "/etc/originbot")]
    destination: PathBuf,

    /// Where the periodic job definition is written on --init
    #[arg(long, default_value = scheduler::DEFAULT_CRON_PATH)]
    cron_path: PathBuf,

    /// Renewal lead time before expiry, in hours
    #[arg(long, default_value_t = DEFAULT_BUFFER_HOURS)]
    buffer_hours: i64,

    /// Upper bound on CA API calls, in seconds
    #[arg(long, default_value_t = DEFAULT_CA_TIMEOUT_SECS)]
    ca_timeout: u64,

    /// Upper bound on hook commands, in seconds
    #[arg(long, default_value_t = DEFAULT_HOOK_TIMEOUT_SECS)]
    hook_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

/// Resolve the run configuration. Initial runs take everything from
/// flags; unattended renewal runs read the persisted state file so the
/// cron invocation needs no arguments.
fn resolve_config(cli: &Cli) -> Result<Config, LifecycleError> {
    let from_flags = |run_mode| Config {
        auth_key: cli.auth.clone(),
        hostnames: cli.hostnames.clone(),
        validity_days: cli.validity,
        post_renew_command: cli.post_renew.clone(),
        on_error_command: cli.on_error.clone(),
        destination_dir: cli.destination.clone(),
        run_mode,
        previous_certificate_id: None,
        ca_timeout_secs: cli.ca_timeout,
        hook_timeout_secs: cli.hook_timeout,
        buffer_hours: cli.buffer_hours,
    };

    if cli.init {
        return Ok(from_flags(RunMode::Initial));
    }

    let state_path = CertificateStore::new(&cli.destination).state_path();
    match std::fs::read_to_string(&state_path) {
        Ok(contents) => {
            let state: StateFile = serde_json::from_str(&contents).map_err(|e| {
                LifecycleError::Persistence(format!(
                    "state file {} is malformed: {}",
                    state_path.display(),
                    e
                ))
            })?;
            let mut config = state.into_config(&cli.destination);
            config.on_error_command = cli.on_error.clone();
            config.ca_timeout_secs = cli.ca_timeout;
            config.hook_timeout_secs = cli.hook_timeout;
            config.buffer_hours = cli.buffer_hours;
            Ok(config)
        }
        // No state file yet: fall back to flags so a renewal run against
        // a fresh directory still provisions (without the cron job).
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(from_flags(RunMode::Renewal)),
        Err(e) => Err(LifecycleError::Persistence(format!(
            "failed to read {}: {}",
            state_path.display(),
            e
        ))),
    }
}

fn check_privileges(cli: &Cli) {
    // Writing /etc/originbot and /etc/cron.d needs root; the real failure
    // will surface from the store or scheduler either way.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 && cli.init {
        warn!("Not running as root; writing the destination directory or cron job may fail");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    observability::logging::init_logging(&cli.log_level, cli.log_json);

    check_privileges(&cli);

    let exit_code = match execute(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn execute(cli: &Cli) -> Result<i32, LifecycleError> {
    let config = resolve_config(cli)?;
    config.validate()?;

    let ca = CloudflareCaClient::new(
        config.auth_key.clone(),
        Duration::from_secs(config.ca_timeout_secs),
    )?;

    let orchestrator = Orchestrator::new(&config, &ca).with_cron_path(&cli.cron_path);
    let report = orchestrator.run().await?;

    match report.outcome {
        RunOutcome::Provisioned => {
            info!("Initial provisioning complete, renewal job installed")
        }
        RunOutcome::Renewed => info!("Certificate renewed"),
        RunOutcome::NotDue => info!("Certificate still valid, nothing to do"),
    }
    for warning in &report.warnings {
        warn!("Completed with warning: {}", warning);
    }

    Ok(0)
}
