//! Cross-process session lock.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{Error, Result};

/// Exclusive advisory lock on a lock file, released on drop.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    /// Blocks until the lock at `path` is held.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the lock file cannot be created or locked.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::operation("create_data_dir", e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                Error::operation("open_session_lock", format!("{}: {e}", path.display()))
            })?;
        FileExt::lock_exclusive(&file).map_err(|e| {
            Error::operation("acquire_session_lock", format!("{}: {e}", path.display()))
        })?;
        tracing::trace!(path = %path.display(), "Acquired session lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.lock");
        let lock = SessionLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path);

        let other = File::open(&path).unwrap();
        assert!(FileExt::try_lock_exclusive(&other).is_err());

        drop(lock);
        assert!(FileExt::try_lock_exclusive(&other).is_ok());
        FileExt::unlock(&other).unwrap();
    }
}
