//! Storage for conversation session handles.
//!
//! - **Traits**: [`HandleStore`], the per-entity assistant/thread pair store
//! - **Persistence**: a JSON file backend and an in-memory backend
//! - **Lock**: [`SessionLock`], the cross-process session lock

mod lock;
pub mod persistence;
pub mod traits;

pub use lock::SessionLock;
pub use persistence::{FileHandleStore, MemoryHandleStore};
pub use traits::HandleStore;
