//! # ifc-chat
//!
//! Talk to building models.
//!
//! ifc-chat flattens the building elements of an IFC file into a JSON record set,
//! hands that record set to a hosted AI assistant with code execution enabled, and
//! renders the assistant's replies (markdown text and generated charts) as a single
//! self-contained HTML transcript.
//!
//! ## Pipeline
//!
//! - [`services::flatten`] walks a parsed [`ifc::IfcModel`] and emits one
//!   [`FlattenedEntityRecord`] per element of the requested class
//! - [`ConversationBridge`] uploads the records, owns the assistant/thread handle pair
//!   and collects replies into ordered [`MessageFragment`]s
//! - [`rendering::render`] turns a question plus fragments into HTML
//!
//! ## Example
//!
//! ```rust,ignore
//! use ifc_chat::{ConversationBridge, IfcChatConfig, ifc, rendering, services};
//!
//! let model = ifc::open("building.ifc")?;
//! let records = services::flatten(&model, "IfcBuildingElement")?;
//! let bridge = ConversationBridge::from_config(&config)?;
//! bridge.initialize_session(&records)?;
//! let fragments = bridge.ask("How many walls are on level 2?")?;
//! let html = rendering::render("How many walls are on level 2?", &fragments);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod assistant;
pub mod config;
pub mod ifc;
pub mod models;
pub mod observability;
pub mod rendering;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use assistant::{AssistantApi, OpenAiAssistantClient, RunEvent, RunEventSink};
pub use config::IfcChatConfig;
pub use models::{FlattenedEntityRecord, MessageFragment, SessionHandles};
pub use services::{ChatService, ConversationBridge};
pub use storage::{FileHandleStore, HandleStore, MemoryHandleStore};

/// Error type for ifc-chat operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidModelFile` | The upload is not a parseable IFC/STEP file |
/// | `NoModelUploaded` | A question is asked before any model was confirmed |
/// | `SessionNotInitialized` | `ask` runs before a handle pair was stored |
/// | `ExternalServiceFailure` | An assistant API call or run failed |
/// | `InvalidInput` | Empty question, missing upload, bad configuration value |
/// | `OperationFailed` | Local I/O: scratch files, state file, lock file |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The uploaded file could not be parsed as a building model.
    ///
    /// The user has to upload a different file.
    #[error("invalid model file: {0}")]
    InvalidModelFile(String),

    /// A question was asked before any model was uploaded and confirmed.
    #[error("no model uploaded: upload and confirm an IFC file before asking questions")]
    NoModelUploaded,

    /// No assistant/thread handle pair has been stored yet.
    ///
    /// Should not reach a user who follows the upload-then-ask flow.
    #[error("conversation session not initialized")]
    SessionNotInitialized,

    /// An assistant, run or file-store call failed.
    ///
    /// Propagated unmodified. Nothing in this crate retries.
    #[error("external service call '{operation}' failed: {cause}")]
    ExternalServiceFailure {
        /// The external operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A local operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds an [`Error::ExternalServiceFailure`].
    pub fn external(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::ExternalServiceFailure {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Builds an [`Error::OperationFailed`].
    pub fn operation(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Returns true for errors the user can fix by changing their input.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidModelFile(_) | Self::NoModelUploaded | Self::InvalidInput(_)
        )
    }
}

/// Result type alias for ifc-chat operations.
pub type Result<T> = std::result::Result<T, Error>;
