//! Shell command execution for post-renew and on-error hooks

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::LifecycleError;

/// Execute an operator-supplied command through a shell.
///
/// No-op for an empty command. Output is discarded; only the exit status
/// matters. The command is bounded by `timeout`: expiry kills it and
/// surfaces as a `Hook` error. A failure here never rolls back an
/// already-persisted certificate.
pub async fn run_hook(command: &str, timeout: Duration) -> Result<(), LifecycleError> {
    if command.is_empty() {
        debug!("No hook command configured, skipping");
        return Ok(());
    }

    info!(command = %command, "Executing hook command");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| LifecycleError::Hook(format!("failed to start command: {}", e)))?;

    let status = tokio::time::timeout(timeout, child.wait())
        .await
        .map_err(|_| {
            LifecycleError::Hook(format!(
                "command did not finish within {} seconds",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| LifecycleError::Hook(format!("failed to wait for command: {}", e)))?;

    if !status.success() {
        return Err(LifecycleError::Hook(format!(
            "command exited with status {}",
            status.code().map_or_else(|| "signal".to_string(), |c| c.to_string())
        )));
    }

    info!("Hook command completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_empty_command_is_noop() {
        assert!(run_hook("", TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn test_successful_command() {
        assert!(run_hook("true", TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_hook_error() {
        let result = run_hook("exit 3", TIMEOUT).await;
        match result {
            Err(LifecycleError::Hook(msg)) => assert!(msg.contains("3")),
            other => panic!("expected Hook error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_hook_error() {
        let result = run_hook("sleep 30", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(LifecycleError::Hook(_))));
    }

    #[tokio::test]
    async fn test_output_is_discarded_but_status_checked() {
        // Writes to both streams and still succeeds.
        assert!(run_hook("echo out; echo err >&2", TIMEOUT).await.is_ok());
    }
}
