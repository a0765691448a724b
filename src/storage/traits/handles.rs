//! Handle store trait.

use crate::Result;
use crate::models::SessionHandles;

/// Trait for session handle stores.
///
/// Holds at most one [`SessionHandles`] pair per entity scope. Saving replaces the
/// previous pair.
pub trait HandleStore: Send + Sync {
    /// Loads the pair stored for `entity`.
    fn load(&self, entity: &str) -> Result<Option<SessionHandles>>;

    /// Stores `handles` for `entity`, replacing any previous pair.
    fn save(&self, entity: &str, handles: &SessionHandles) -> Result<()>;

    /// Removes the pair for `entity`, returning it.
    fn clear(&self, entity: &str) -> Result<Option<SessionHandles>>;

    /// Checks if a pair is stored for `entity`.
    fn exists(&self, entity: &str) -> Result<bool> {
        Ok(self.load(entity)?.is_some())
    }
}
