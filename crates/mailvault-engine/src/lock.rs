//! Advisory lock file signaling "backup in progress" to external callers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    /// The lock file already exists and the job is configured to treat a
    /// held lock as fatal.
    #[error("lock file {0} is already held")]
    AlreadyHeld(PathBuf),
}

/// A created lock file. Release is explicit: there is no `Drop` cleanup, so
/// a crashed run leaves the lock behind as an operator-visible fault.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Create the lock file containing this process's pid.
    ///
    /// A pre-existing lock is logged as an error; the run proceeds unless
    /// `fail_if_held` is set, in which case the foreign lock is left
    /// untouched and acquisition fails. Write failures are logged, not
    /// fatal.
    ///
    /// # Errors
    ///
    /// Returns `LockError::AlreadyHeld` when the lock exists and
    /// `fail_if_held` is set.
    pub fn acquire(path: PathBuf, fail_if_held: bool) -> Result<Self, LockError> {
        if path.exists() {
            if fail_if_held {
                tracing::error!(lock = %path.display(), "lock file exists, aborting run");
                return Err(LockError::AlreadyHeld(path));
            }
            tracing::error!(lock = %path.display(), "lock file exists");
        }

        if let Err(err) = std::fs::write(&path, std::process::id().to_string()) {
            tracing::error!(lock = %path.display(), %err, "failed to write lock file");
        }

        Ok(Self { path })
    }

    /// Remove the lock file, logging (not propagating) a removal failure.
    pub fn release(self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::error!(lock = %self.path.display(), %err, "failed to remove lock file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_pid_and_release_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.lock");

        let lock = LockFile::acquire(path.clone(), false).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, std::process::id().to_string());

        lock.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_held_lock_is_advisory_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.lock");
        std::fs::write(&path, "12345").unwrap();

        let lock = LockFile::acquire(path.clone(), false).unwrap();
        // The stale content is overwritten with our pid.
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, std::process::id().to_string());
        lock.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_held_lock_is_fatal_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.lock");
        std::fs::write(&path, "12345").unwrap();

        let result = LockFile::acquire(path.clone(), true);
        assert!(matches!(result, Err(LockError::AlreadyHeld(_))));
        // The foreign lock is untouched.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "12345");
    }

    #[test]
    fn test_release_on_missing_file_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.lock");
        let lock = LockFile::acquire(path.clone(), false).unwrap();
        std::fs::remove_file(&path).unwrap();
        lock.release();
    }
}
