//! Periodic-run installation via a cron.d definition

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::info;

use crate::error::LifecycleError;

/// Default location for the periodic job definition.
pub const DEFAULT_CRON_PATH: &str = "/etc/cron.d/originbot";

/// Twice-daily schedule: upstream recommends attempting renewal twice a
/// day so a failed attempt still has a retry window inside the buffer.
const CRON_SCHEDULE: &str = "0 */12 * * *";

/// Render the cron.d definition text. Pure: no ambient paths, no I/O.
pub fn render_cron_definition(buffer_hours: i64, invocation_command: &str) -> String {
    format!(
        r#"# /etc/cron.d/originbot: crontab entries for the originbot package
#
# Renewal runs twice a day and only re-issues when expiration is within
# {buffer_hours} hours.
SHELL=/bin/sh
PATH=/usr/local/sbin:/usr/local/bin:/sbin:/bin:/usr/sbin:/usr/bin

{schedule} root {command}
"#,
        buffer_hours = buffer_hours,
        schedule = CRON_SCHEDULE,
        command = invocation_command,
    )
}

/// Write the periodic job definition to `path`, replacing any previous
/// content. Re-running initial provisioning therefore never accumulates
/// duplicate entries.
pub fn install(path: &Path, definition: &str) -> Result<(), LifecycleError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .map_err(|e| {
            LifecycleError::SchedulerInstall(format!(
                "cannot write {} (insufficient privilege?): {}",
                path.display(),
                e
            ))
        })?;

    file.write_all(definition.as_bytes()).map_err(|e| {
        LifecycleError::SchedulerInstall(format!("failed to write {}: {}", path.display(), e))
    })?;

    info!(path = %path.display(), "Installed periodic renewal job");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_definition_contains_schedule_and_command() {
        let definition = render_cron_definition(48, "originbot >> /var/log/originbot.log 2>&1");
        assert!(definition.contains("0 */12 * * * root originbot"));
        assert!(definition.contains("48 hours"));
    }

    #[test]
    fn test_definition_is_pure_over_inputs() {
        let a = render_cron_definition(48, "originbot");
        let b = render_cron_definition(48, "originbot");
        assert_eq!(a, b);
        assert_ne!(a, render_cron_definition(24, "originbot"));
    }

    #[test]
    fn test_install_overwrites_instead_of_appending() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("originbot");

        install(&path, &render_cron_definition(48, "originbot")).unwrap();
        install(&path, &render_cron_definition(48, "originbot")).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("0 */12 * * *").count(), 1);
    }

    #[test]
    fn test_install_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("originbot");
        let result = install(&path, "definition");
        assert!(matches!(result, Err(LifecycleError::SchedulerInstall(_))));
    }
}
