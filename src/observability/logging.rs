use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize console logging. `RUST_LOG` overrides the level flag; the
/// scheduled cron invocation captures stdout into the debug log.
pub fn init_logging(level: &str, json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(match level {
            "trace" => Level::TRACE.into(),
            "debug" => Level::DEBUG.into(),
            "info" => Level::INFO.into(),
            "warn" => Level::WARN.into(),
            "error" => Level::ERROR.into(),
            _ => Level::INFO.into(),
        })
        .from_env_lossy();

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stdout))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stdout))
            .init();
    }
}
