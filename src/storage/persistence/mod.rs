//! Handle store backends.

mod filesystem;
mod memory;

pub use filesystem::FileHandleStore;
pub use memory::MemoryHandleStore;
