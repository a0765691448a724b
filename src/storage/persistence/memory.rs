//! In-memory handle store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::models::SessionHandles;
use crate::storage::traits::HandleStore;
use crate::{Error, Result};

/// Handle store that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryHandleStore {
    handles: Mutex<HashMap<String, SessionHandles>>,
}

impl MemoryHandleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> Result<MutexGuard<'_, HashMap<String, SessionHandles>>> {
        self.handles
            .lock()
            .map_err(|e| Error::operation("lock_handle_store", e))
    }
}

impl HandleStore for MemoryHandleStore {
    fn load(&self, entity: &str) -> Result<Option<SessionHandles>> {
        Ok(self.guard()?.get(entity).cloned())
    }

    fn save(&self, entity: &str, handles: &SessionHandles) -> Result<()> {
        self.guard()?.insert(entity.to_string(), handles.clone());
        Ok(())
    }

    fn clear(&self, entity: &str) -> Result<Option<SessionHandles>> {
        Ok(self.guard()?.remove(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_replaces_per_entity() {
        let store = MemoryHandleStore::new();
        assert!(!store.exists("a").unwrap());
        store.save("a", &SessionHandles::new("asst_1", "thread_1")).unwrap();
        store.save("a", &SessionHandles::new("asst_2", "thread_2")).unwrap();
        store.save("b", &SessionHandles::new("asst_3", "thread_3")).unwrap();
        assert_eq!(
            store.load("a").unwrap(),
            Some(SessionHandles::new("asst_2", "thread_2"))
        );
        assert_eq!(
            store.clear("b").unwrap(),
            Some(SessionHandles::new("asst_3", "thread_3"))
        );
        assert!(store.load("b").unwrap().is_none());
    }
}
