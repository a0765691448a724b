//! JSON file handle store.
//!
//! All entity scopes share one file:
//!
//! ```json
//! { "default": { "assistant_id": "asst_..", "thread_id": "thread_.." } }
//! ```
//!
//! Reads take a shared lock on the file and writes an exclusive one, so concurrent
//! processes never observe a half-written state.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::models::SessionHandles;
use crate::storage::traits::HandleStore;
use crate::{Error, Result};

/// Maximum state file size (64KB).
const MAX_FILE_SIZE: u64 = 64 * 1024;

type StoredHandles = BTreeMap<String, SessionHandles>;

/// Handle store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileHandleStore {
    path: PathBuf,
}

impl FileHandleStore {
    /// Creates a store at `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<StoredHandles> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoredHandles::new()),
            Err(e) => return Err(self.io_error("open_state_file", &e)),
        };
        FileExt::lock_shared(&file)
            .map_err(|e| self.io_error("lock_state_file", &e))?;
        let result = read_locked(&file, &self.path);
        let _ = FileExt::unlock(&file);
        result
    }

    /// Runs `update` on the stored map under an exclusive lock and writes it back.
    fn modify<T>(&self, update: impl FnOnce(&mut StoredHandles) -> T) -> Result<T> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error("create_data_dir", &e))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.io_error("open_state_file", &e))?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| self.io_error("lock_state_file", &e))?;

        let result = (|| {
            // Re-read under lock to get latest state
            let mut stored = read_locked(&file, &self.path)?;
            let value = update(&mut stored);
            let json = serde_json::to_string_pretty(&stored)
                .map_err(|e| Error::operation("serialize_state", e))?;
            write_locked(&mut file, json.as_bytes())
                .map_err(|e| self.io_error("write_state_file", &e))?;
            Ok(value)
        })();

        let _ = FileExt::unlock(&file);
        result
    }

    fn io_error(&self, operation: &str, e: &std::io::Error) -> Error {
        Error::operation(operation, format!("{}: {e}", self.path.display()))
    }
}

fn write_locked(file: &mut File, contents: &[u8]) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(contents)?;
    file.sync_all()
}

fn read_locked(mut file: &File, path: &Path) -> Result<StoredHandles> {
    let size = file
        .metadata()
        .map_err(|e| Error::operation("stat_state_file", e))?
        .len();
    if size > MAX_FILE_SIZE {
        return Err(Error::operation(
            "read_state_file",
            format!("{} exceeds {MAX_FILE_SIZE} bytes", path.display()),
        ));
    }
    let mut data = String::new();
    file.read_to_string(&mut data)
        .map_err(|e| Error::operation("read_state_file", e))?;
    if data.trim().is_empty() {
        return Ok(StoredHandles::new());
    }
    serde_json::from_str(&data).map_err(|e| {
        Error::operation("parse_state_file", format!("{}: {e}", path.display()))
    })
}

impl HandleStore for FileHandleStore {
    fn load(&self, entity: &str) -> Result<Option<SessionHandles>> {
        Ok(self.read_all()?.remove(entity))
    }

    fn save(&self, entity: &str, handles: &SessionHandles) -> Result<()> {
        self.modify(|stored| {
            stored.insert(entity.to_string(), handles.clone());
        })?;
        tracing::debug!(entity, path = %self.path.display(), "Stored session handles");
        Ok(())
    }

    fn clear(&self, entity: &str) -> Result<Option<SessionHandles>> {
        self.modify(|stored| stored.remove(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileHandleStore::new(tmp.path().join("state.json"));
        assert!(store.load("default").unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_load_clear() {
        let tmp = TempDir::new().unwrap();
        let store = FileHandleStore::new(tmp.path().join("nested").join("state.json"));
        let first = SessionHandles::new("asst_1", "thread_1");
        let second = SessionHandles::new("asst_2", "thread_2");

        store.save("default", &first).unwrap();
        store.save("other", &second).unwrap();
        store.save("default", &second).unwrap();

        // A second store on the same file sees the same state.
        let reopened = FileHandleStore::new(store.path());
        assert_eq!(reopened.load("default").unwrap(), Some(second.clone()));
        assert_eq!(reopened.load("other").unwrap(), Some(second.clone()));

        assert_eq!(store.clear("other").unwrap(), Some(second));
        assert!(reopened.load("other").unwrap().is_none());
    }

    #[test]
    fn test_file_layout() {
        let tmp = TempDir::new().unwrap();
        let store = FileHandleStore::new(tmp.path().join("state.json"));
        store
            .save("default", &SessionHandles::new("asst_1", "thread_1"))
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(json["default"]["assistant_id"], "asst_1");
        assert_eq!(json["default"]["thread_id"], "thread_1");
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        let err = FileHandleStore::new(path).load("default").unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }));
    }
}
