//! Data models for ifc-chat.
//!
//! Records flow from the flattener to the bridge, fragments from the bridge to
//! the renderer, and session handles between the bridge and the handle store.

mod fragment;
mod record;
mod session;

pub use fragment::MessageFragment;
pub use record::FlattenedEntityRecord;
pub use session::SessionHandles;
