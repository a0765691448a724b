//! Handles of the externally hosted conversation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The assistant/thread pair a conversation runs against.
///
/// Both values are opaque identifiers issued by the assistant service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandles {
    /// Assistant (agent configuration) id.
    pub assistant_id: String,
    /// Thread (session) id.
    pub thread_id: String,
}

impl SessionHandles {
    /// Creates a handle pair.
    #[must_use]
    pub fn new(assistant_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            thread_id: thread_id.into(),
        }
    }
}

impl fmt::Display for SessionHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.thread_id, self.assistant_id)
    }
}
