//! Chat service: the upload, ask and close actions of the application.

use std::path::{Path, PathBuf};

use crate::config::IfcChatConfig;
use crate::ifc;
use crate::models::{FlattenedEntityRecord, MessageFragment, SessionHandles};
use crate::rendering;
use crate::services::ConversationBridge;
use crate::services::flatten::{flatten, read_records, write_records};
use crate::{Error, Result};

/// Result of an upload-and-confirm action.
#[derive(Debug, Clone)]
pub struct UploadSummary {
    /// Number of flattened records.
    pub record_count: usize,
    /// Where the records were written.
    pub model_data_path: PathBuf,
    /// The new session.
    pub session: SessionHandles,
}

/// A rendered answer.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// The question asked.
    pub question: String,
    /// Reply fragments in thread order.
    pub fragments: Vec<MessageFragment>,
    /// Rendered HTML document.
    pub html: String,
}

/// Current state of the application.
#[derive(Debug, Clone)]
pub struct ChatStatus {
    /// Model data file path.
    pub model_data_path: PathBuf,
    /// Record count when model data exists.
    pub record_count: Option<usize>,
    /// Stored session, if any.
    pub session: Option<SessionHandles>,
}

impl ChatStatus {
    /// Documents included in the conversation, for display.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        self.record_count
            .map(|count| {
                vec![format!(
                    "{} ({count} elements)",
                    self.model_data_path.display()
                )]
            })
            .unwrap_or_default()
    }
}

/// Service for the application's user actions.
pub struct ChatService {
    config: IfcChatConfig,
    bridge: ConversationBridge,
}

impl ChatService {
    /// Creates a chat service.
    #[must_use]
    pub const fn new(config: IfcChatConfig, bridge: ConversationBridge) -> Self {
        Self { config, bridge }
    }

    /// Creates a chat service with the `OpenAI` bridge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when no API key is configured.
    pub fn from_config(config: IfcChatConfig) -> Result<Self> {
        let bridge = ConversationBridge::from_config(&config)?;
        Ok(Self::new(config, bridge))
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &IfcChatConfig {
        &self.config
    }

    /// Flattens the model at `path` and starts a new session with the records.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] when `path` does not exist or the target class is
    ///   not in the model's schema
    /// - [`Error::InvalidModelFile`] when the file is not an IFC model
    /// - any error of [`ConversationBridge::initialize_session`]
    pub fn upload(&self, path: &Path) -> Result<UploadSummary> {
        let records = flatten_file(path, &self.config.target_class)?;
        self.upload_records(&records)
    }

    /// Starts a new session with `records`, then persists them.
    ///
    /// The model data file is only replaced once the session exists, so a failed
    /// upload leaves the previous model data and session paired.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be created or the records cannot be
    /// written.
    pub fn upload_records(&self, records: &[FlattenedEntityRecord]) -> Result<UploadSummary> {
        let session = self.bridge.initialize_session(records)?;
        let model_data_path = self.config.model_data_path();
        write_records(&model_data_path, records)?;
        Ok(UploadSummary {
            record_count: records.len(),
            model_data_path,
            session,
        })
    }

    /// Asks a question about the uploaded model and renders the reply.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for an empty question
    /// - [`Error::NoModelUploaded`] when no model data was written yet
    /// - any error of [`ConversationBridge::ask`]
    pub fn ask(&self, question: &str) -> Result<Transcript> {
        check_ask_ready(&self.config, question)?;
        let fragments = self.bridge.ask(question)?;
        let html = rendering::render(question, &fragments);
        Ok(Transcript {
            question: question.to_string(),
            fragments,
            html,
        })
    }

    /// Retires the stored session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be deleted.
    pub fn close(&self) -> Result<Option<SessionHandles>> {
        self.bridge.close_session()
    }

    /// Reports model data and session state.
    ///
    /// # Errors
    ///
    /// Returns an error if the model data or handle store exists but is unreadable.
    pub fn status(&self) -> Result<ChatStatus> {
        let model_data_path = self.config.model_data_path();
        let record_count = match read_records(&model_data_path) {
            Ok(records) => Some(records.len()),
            Err(Error::NoModelUploaded) => None,
            Err(e) => return Err(e),
        };
        Ok(ChatStatus {
            model_data_path,
            record_count,
            session: self.bridge.current_session()?,
        })
    }
}

/// Validates a question before anything is sent.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an empty question and
/// [`Error::NoModelUploaded`] when no model data was written yet.
pub fn check_ask_ready(config: &IfcChatConfig, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(Error::InvalidInput("question cannot be empty".to_string()));
    }
    if !config.model_data_path().is_file() {
        return Err(Error::NoModelUploaded);
    }
    Ok(())
}

/// Reads the model at `path` and flattens `class`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when `path` does not exist or `class` is unknown,
/// and [`Error::InvalidModelFile`] when the file is not an IFC model.
pub fn flatten_file(path: &Path, class: &str) -> Result<Vec<FlattenedEntityRecord>> {
    if !path.is_file() {
        return Err(Error::InvalidInput(format!(
            "model file not found: {}",
            path.display()
        )));
    }
    let model = ifc::open(path)?;
    flatten(&model, class)
}
