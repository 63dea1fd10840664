//! Filesystem persistence for key material, certificate, and run state

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::StateFile;
use crate::error::LifecycleError;

pub const STATE_FILE_NAME: &str = "originbot.json";
pub const LIVE_DIR_NAME: &str = "live";
pub const KEY_FILE_NAME: &str = "key.pem";
pub const CERT_FILE_NAME: &str = "certificate.pem";
const LOCK_FILE_NAME: &str = ".originbot.lock";

/// The persisted triple read back from a destination directory.
#[derive(Debug, Clone)]
pub struct CertificateRecord {
    pub key_pem: String,
    pub certificate_pem: String,
    pub state: StateFile,
}

impl CertificateRecord {
    /// CA identifier of the certificate currently in force.
    pub fn certificate_id(&self) -> Option<&str> {
        self.state.previous_certificate_id.as_deref()
    }
}

/// Exclusive advisory lock on a destination directory, held for the
/// duration of one run. Released on drop, on every exit path.
#[derive(Debug)]
pub struct DirectoryLock {
    path: PathBuf,
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "Failed to release lock file: {}", e);
        }
    }
}

/// Owns the on-disk representation of one destination directory. The only
/// component permitted to write it.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    root: PathBuf,
}

impl CertificateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE_NAME)
    }

    pub fn live_dir(&self) -> PathBuf {
        self.root.join(LIVE_DIR_NAME)
    }

    pub fn key_path(&self) -> PathBuf {
        self.live_dir().join(KEY_FILE_NAME)
    }

    pub fn certificate_path(&self) -> PathBuf {
        self.live_dir().join(CERT_FILE_NAME)
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    /// Create the destination layout (`root/` and `root/live/`) if absent.
    /// Returns whether the root directory already existed.
    pub fn ensure_directory(&self) -> Result<bool, LifecycleError> {
        let existed = self.root.is_dir();
        fs::create_dir_all(self.live_dir()).map_err(|e| {
            LifecycleError::Persistence(format!(
                "failed to create {}: {}",
                self.live_dir().display(),
                e
            ))
        })?;
        Ok(existed)
    }

    /// Acquire the exclusive per-directory lock. Fails when another run
    /// holds it (or a crashed run left it behind, which an operator
    /// resolves by deleting the lock file).
    pub fn acquire_lock(&self) -> Result<DirectoryLock, LifecycleError> {
        let path = self.lock_path();
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                LifecycleError::Persistence(format!(
                    "destination directory is locked by another run ({}): {}",
                    path.display(),
                    e
                ))
            })?;
        // Record the owner for stale-lock diagnostics.
        let _ = writeln!(file, "{}", std::process::id());
        debug!(path = %path.display(), "Acquired directory lock");
        Ok(DirectoryLock { path })
    }

    /// Read the persisted triple. Returns `None` when the directory is
    /// absent or any of the three files is missing: an interrupted
    /// initialization is treated as not yet provisioned.
    pub fn load(&self) -> Result<Option<CertificateRecord>, LifecycleError> {
        let key_path = self.key_path();
        let cert_path = self.certificate_path();
        let state_path = self.state_path();

        if !key_path.is_file() || !cert_path.is_file() || !state_path.is_file() {
            return Ok(None);
        }

        let key_pem = read_file(&key_path)?;
        let certificate_pem = read_file(&cert_path)?;
        let state_json = read_file(&state_path)?;
        let state: StateFile = serde_json::from_str(&state_json).map_err(|e| {
            LifecycleError::Persistence(format!(
                "state file {} is malformed: {}",
                state_path.display(),
                e
            ))
        })?;

        Ok(Some(CertificateRecord {
            key_pem,
            certificate_pem,
            state,
        }))
    }

    /// Write the key, certificate, and state file all-or-nothing.
    ///
    /// All three are staged as temporary files in their final directories
    /// first, then renamed into place with the state file last, so the
    /// recorded prior-certificate id never points at artifacts that are
    /// not durably written. Any failure during staging removes the
    /// temporaries and leaves the previous triple untouched.
    pub fn persist_atomically(
        &self,
        key_pem: &str,
        certificate_pem: &str,
        state: &StateFile,
    ) -> Result<(), LifecycleError> {
        let state_json = serde_json::to_string_pretty(state).map_err(|e| {
            LifecycleError::Persistence(format!("state serialization failed: {}", e))
        })?;

        let key_tmp = tmp_path(&self.key_path());
        let cert_tmp = tmp_path(&self.certificate_path());
        let state_tmp = tmp_path(&self.state_path());

        let staged = [&key_tmp, &cert_tmp, &state_tmp];

        let result = (|| {
            // Key and certificate are owner-only; the state file may be
            // group-readable.
            write_with_mode(&key_tmp, key_pem.as_bytes(), 0o600)?;
            write_with_mode(&cert_tmp, certificate_pem.as_bytes(), 0o600)?;
            write_with_mode(&state_tmp, state_json.as_bytes(), 0o664)?;

            rename_into_place(&key_tmp, &self.key_path())?;
            rename_into_place(&cert_tmp, &self.certificate_path())?;
            rename_into_place(&state_tmp, &self.state_path())?;
            Ok(())
        })();

        if result.is_err() {
            for path in staged {
                let _ = fs::remove_file(path);
            }
        }

        result
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn read_file(path: &Path) -> Result<String, LifecycleError> {
    fs::read_to_string(path).map_err(|e| {
        LifecycleError::Persistence(format!("failed to read {}: {}", path.display(), e))
    })
}

fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> Result<(), LifecycleError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(|e| {
            LifecycleError::Persistence(format!("failed to create {}: {}", path.display(), e))
        })?;
    file.write_all(contents).map_err(|e| {
        LifecycleError::Persistence(format!("failed to write {}: {}", path.display(), e))
    })?;
    file.sync_all().map_err(|e| {
        LifecycleError::Persistence(format!("failed to sync {}: {}", path.display(), e))
    })
}

fn rename_into_place(from: &Path, to: &Path) -> Result<(), LifecycleError> {
    fs::rename(from, to).map_err(|e| {
        LifecycleError::Persistence(format!(
            "failed to move {} into place: {}",
            to.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn test_state() -> StateFile {
        StateFile {
            auth_key: "key".to_string(),
            hostnames: vec!["a.example.com".to_string()],
            validity_days: 30,
            post_renew_command: String::new(),
            previous_certificate_id: Some("cert-123".to_string()),
        }
    }

    #[test]
    fn test_ensure_directory_reports_pre_existence() {
        let dir = TempDir::new().unwrap();
        let store = CertificateStore::new(dir.path().join("certs"));

        assert!(!store.ensure_directory().unwrap());
        assert!(store.live_dir().is_dir());
        assert!(store.ensure_directory().unwrap());
    }

    #[test]
    fn test_load_empty_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = CertificateStore::new(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_persist_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CertificateStore::new(dir.path());
        store.ensure_directory().unwrap();

        store
            .persist_atomically("KEY PEM", "CERT PEM", &test_state())
            .unwrap();

        let record = store.load().unwrap().expect("record should exist");
        assert_eq!(record.key_pem, "KEY PEM");
        assert_eq!(record.certificate_pem, "CERT PEM");
        assert_eq!(record.certificate_id(), Some("cert-123"));
        assert_eq!(record.state.hostnames, vec!["a.example.com".to_string()]);
    }

    #[test]
    fn test_incomplete_triple_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = CertificateStore::new(dir.path());
        store.ensure_directory().unwrap();
        store
            .persist_atomically("KEY PEM", "CERT PEM", &test_state())
            .unwrap();

        fs::remove_file(store.certificate_path()).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_key_and_certificate_are_owner_only() {
        let dir = TempDir::new().unwrap();
        let store = CertificateStore::new(dir.path());
        store.ensure_directory().unwrap();
        store
            .persist_atomically("KEY PEM", "CERT PEM", &test_state())
            .unwrap();

        let key_mode = fs::metadata(store.key_path()).unwrap().permissions().mode();
        let cert_mode = fs::metadata(store.certificate_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(key_mode & 0o777, 0o600);
        assert_eq!(cert_mode & 0o777, 0o600);
    }

    #[test]
    fn test_failed_persist_leaves_previous_triple_intact() {
        let dir = TempDir::new().unwrap();
        let store = CertificateStore::new(dir.path());
        store.ensure_directory().unwrap();
        store
            .persist_atomically("OLD KEY", "OLD CERT", &test_state())
            .unwrap();

        // Force the certificate staging write to fail after the key has
        // been staged: a directory squats on the temporary path.
        let cert_tmp = store.live_dir().join(format!("{}.tmp", CERT_FILE_NAME));
        fs::create_dir(&cert_tmp).unwrap();

        let mut new_state = test_state();
        new_state.previous_certificate_id = Some("cert-456".to_string());
        let result = store.persist_atomically("NEW KEY", "NEW CERT", &new_state);
        assert!(matches!(result, Err(LifecycleError::Persistence(_))));

        fs::remove_dir(&cert_tmp).unwrap();

        let record = store.load().unwrap().expect("old record should survive");
        assert_eq!(record.key_pem, "OLD KEY");
        assert_eq!(record.certificate_pem, "OLD CERT");
        assert_eq!(record.certificate_id(), Some("cert-123"));

        // No stray staged key file either.
        assert!(!store.live_dir().join(format!("{}.tmp", KEY_FILE_NAME)).exists());
    }

    #[test]
    fn test_lock_is_exclusive_until_released() {
        let dir = TempDir::new().unwrap();
        let store = CertificateStore::new(dir.path());
        store.ensure_directory().unwrap();

        let lock = store.acquire_lock().unwrap();
        assert!(store.acquire_lock().is_err());

        drop(lock);
        let relock = store.acquire_lock();
        assert!(relock.is_ok());
    }
}
