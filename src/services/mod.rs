//! Business logic services.
//!
//! Services orchestrate the model reader, the assistant service and the handle
//! store, and provide the application's high-level operations.

mod bridge;
mod chat;
pub mod flatten;

pub use bridge::{BridgeSettings, ConversationBridge};
pub use chat::{ChatService, ChatStatus, Transcript, UploadSummary, check_ask_ready, flatten_file};
pub use flatten::{flatten, read_records, write_records};
