//! Conversation bridge.
//!
//! Owns the assistant service client and the handle store, and turns one question
//! into the ordered fragments of the session's thread.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::instrument;

use crate::assistant::{AssistantApi, ContentBlock, OpenAiAssistantClient, RunEventSink};
use crate::config::IfcChatConfig;
use crate::models::{FlattenedEntityRecord, MessageFragment, SessionHandles};
use crate::services::flatten::records_to_json;
use crate::storage::{FileHandleStore, HandleStore, SessionLock};
use crate::{Error, Result};

/// Name the model data is uploaded under.
const MODEL_DATA_FILENAME: &str = "model_data.json";

/// Bridge settings.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Entity scope for the stored handle pair.
    pub entity: String,
    /// Model for new assistants.
    pub model: String,
    /// Instructions for new assistants.
    pub instructions: String,
    /// First message of new threads.
    pub seed_message: String,
    /// Directory reply images are written to.
    pub scratch_dir: PathBuf,
    /// Cross-process lock file; `None` serializes within the process only.
    pub lock_path: Option<PathBuf>,
    /// Delete the previous assistant and thread when a new session starts.
    pub retire_previous_session: bool,
}

impl BridgeSettings {
    /// Derives bridge settings from the application configuration.
    #[must_use]
    pub fn from_config(config: &IfcChatConfig) -> Self {
        Self {
            entity: config.entity.clone(),
            model: config.assistant.model.clone(),
            instructions: config.assistant.instructions.clone(),
            seed_message: config.assistant.seed_message.clone(),
            scratch_dir: config.scratch_dir.clone(),
            lock_path: Some(config.lock_path()),
            retire_previous_session: config.assistant.retire_previous_session,
        }
    }
}

/// Bridge between flattened records and a hosted assistant session.
pub struct ConversationBridge {
    api: Arc<dyn AssistantApi>,
    store: Arc<dyn HandleStore>,
    settings: BridgeSettings,
    sink: Option<Arc<dyn RunEventSink>>,
    /// Serializes session operations within the process.
    session_guard: Mutex<()>,
}

impl ConversationBridge {
    /// Creates a bridge.
    #[must_use]
    pub fn new(
        api: Arc<dyn AssistantApi>,
        store: Arc<dyn HandleStore>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            api,
            store,
            settings,
            sink: None,
            session_guard: Mutex::new(()),
        }
    }

    /// Creates a bridge talking to `OpenAI` with a file handle store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when no API key is configured.
    pub fn from_config(config: &IfcChatConfig) -> Result<Self> {
        let api = OpenAiAssistantClient::from_config(&config.assistant)?;
        let store = FileHandleStore::new(config.state_path());
        Ok(Self::new(
            Arc::new(api),
            Arc::new(store),
            BridgeSettings::from_config(config),
        ))
    }

    /// Sets the receiver of live run events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn RunEventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Bridge settings.
    #[must_use]
    pub const fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Stored handle pair, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle store cannot be read.
    pub fn current_session(&self) -> Result<Option<SessionHandles>> {
        self.store.load(&self.settings.entity)
    }

    /// Starts a new session seeded with `records`.
    ///
    /// Uploads the records, creates an assistant and a thread whose first message
    /// attaches the upload, and stores the new pair in place of the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalServiceFailure`] if a service call fails; the stored
    /// pair is left unchanged in that case.
    #[instrument(
        skip(self, records),
        fields(entity = %self.settings.entity, records = records.len())
    )]
    pub fn initialize_session(&self, records: &[FlattenedEntityRecord]) -> Result<SessionHandles> {
        let json = records_to_json(records)?;
        let _guard = self.lock_session()?;

        let file_id = self.api.upload_file(MODEL_DATA_FILENAME, json)?;
        let assistant_id = self
            .api
            .create_assistant(&self.settings.model, &self.settings.instructions)?;
        let thread_id = self.api.create_thread(&self.settings.seed_message, &file_id)?;
        let handles = SessionHandles::new(assistant_id, thread_id);

        let previous = self.store.load(&self.settings.entity)?;
        self.store.save(&self.settings.entity, &handles)?;
        tracing::info!(session = %handles, file_id = %file_id, "Initialized conversation session");

        if let Some(previous) = previous.filter(|p| *p != handles) {
            if self.settings.retire_previous_session {
                // The new pair is already stored, so a failed cleanup only leaks.
                match self.api.retire_session(&previous) {
                    Ok(()) => tracing::info!(session = %previous, "Retired previous session"),
                    Err(e) => {
                        tracing::warn!(
                            session = %previous,
                            error = %e,
                            "Failed to retire previous session"
                        );
                    },
                }
            } else {
                tracing::debug!(session = %previous, "Previous session abandoned");
            }
        }

        Ok(handles)
    }

    /// Asks `question` in the stored session and collects the thread's content.
    ///
    /// Returns one fragment per content block of every message in the thread, in
    /// the order the service lists them. Image bytes are also written to
    /// `image_<i>.png` in the scratch directory.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for an empty question
    /// - [`Error::SessionNotInitialized`] when no pair is stored (no service call made)
    /// - [`Error::ExternalServiceFailure`] when a service call fails or the run does
    ///   not complete
    /// - [`Error::OperationFailed`] when an image cannot be written
    #[instrument(skip(self, question), fields(entity = %self.settings.entity))]
    pub fn ask(&self, question: &str) -> Result<Vec<MessageFragment>> {
        if question.trim().is_empty() {
            return Err(Error::InvalidInput("question cannot be empty".to_string()));
        }
        let _guard = self.lock_session()?;
        let handles = self
            .store
            .load(&self.settings.entity)?
            .ok_or(Error::SessionNotInitialized)?;

        let outcome = self
            .api
            .stream_run(&handles, question, self.sink.as_deref())?;
        if !outcome.status.is_success() {
            let detail = outcome
                .last_error
                .map(|e| format!(" ({e})"))
                .unwrap_or_default();
            return Err(Error::external(
                "stream_run",
                format!("run ended with status '{}'{detail}", outcome.status),
            ));
        }

        let messages = self.api.list_messages(&handles.thread_id)?;
        let mut fragments = Vec::new();
        let mut image_count = 0usize;
        for message in messages {
            for block in message.content {
                match block {
                    ContentBlock::Text(text) => fragments.push(MessageFragment::Text(text)),
                    ContentBlock::ImageFile(file_id) => {
                        let bytes = self.api.file_content(&file_id)?;
                        self.write_image(image_count, &bytes)?;
                        image_count += 1;
                        fragments.push(MessageFragment::Image(bytes));
                    },
                    ContentBlock::Unsupported(kind) => {
                        tracing::warn!(
                            message_id = %message.id,
                            kind = %kind,
                            "Skipping unsupported content block"
                        );
                    },
                }
            }
        }

        tracing::info!(
            session = %handles,
            fragments = fragments.len(),
            images = image_count,
            "Collected reply"
        );
        Ok(fragments)
    }

    /// Deletes the stored session's assistant and thread and forgets the pair.
    ///
    /// Returns the retired pair, or `None` when nothing was stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalServiceFailure`] if deletion fails; the pair stays
    /// stored so the call can be repeated.
    #[instrument(skip(self), fields(entity = %self.settings.entity))]
    pub fn close_session(&self) -> Result<Option<SessionHandles>> {
        let _guard = self.lock_session()?;
        let Some(handles) = self.store.load(&self.settings.entity)? else {
            return Ok(None);
        };
        self.api.retire_session(&handles)?;
        self.store.clear(&self.settings.entity)?;
        tracing::info!(session = %handles, "Closed conversation session");
        Ok(Some(handles))
    }

    fn write_image(&self, index: usize, bytes: &[u8]) -> Result<()> {
        let dir = &self.settings.scratch_dir;
        std::fs::create_dir_all(dir).map_err(|e| Error::operation("create_scratch_dir", e))?;
        let path = dir.join(format!("image_{index}.png"));
        std::fs::write(&path, bytes)
            .map_err(|e| Error::operation("write_image", format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Wrote reply image");
        Ok(())
    }

    /// Takes the in-process guard, then the cross-process lock.
    fn lock_session(&self) -> Result<SessionGuard<'_>> {
        let local = self
            .session_guard
            .lock()
            .map_err(|e| Error::operation("lock_session", e))?;
        let file = self
            .settings
            .lock_path
            .as_ref()
            .map(SessionLock::acquire)
            .transpose()?;
        Ok(SessionGuard {
            _file: file,
            _local: local,
        })
    }
}

/// Both session locks; the file lock is released first.
struct SessionGuard<'a> {
    _file: Option<SessionLock>,
    _local: std::sync::MutexGuard<'a, ()>,
}
