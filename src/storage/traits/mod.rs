//! Storage backend traits.

mod handles;

pub use handles::HandleStore;
