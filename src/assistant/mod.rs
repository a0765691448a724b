//! Hosted assistant service boundary.
//!
//! [`AssistantApi`] is everything the conversation bridge needs from the service:
//! a file store, assistant and thread creation, streamed runs, message listing and
//! file content retrieval. [`OpenAiAssistantClient`] implements it over the `OpenAI`
//! Assistants v2 HTTP API.

mod openai;
mod stream;

pub use openai::OpenAiAssistantClient;
pub use stream::consume_run_stream;

use crate::Result;
use crate::models::SessionHandles;
use std::fmt;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The run finished and its messages are in the thread.
    Completed,
    /// The run failed.
    Failed,
    /// The run was cancelled.
    Cancelled,
    /// The run expired before finishing.
    Expired,
    /// The run ended early (token limits, content filter).
    Incomplete,
    /// The run waits for function outputs, which this crate never provides.
    RequiresAction,
}

impl RunStatus {
    /// Maps a `thread.run.*` event name to a terminal status.
    #[must_use]
    pub fn from_event(event: &str) -> Option<Self> {
        match event {
            "thread.run.completed" => Some(Self::Completed),
            "thread.run.failed" => Some(Self::Failed),
            "thread.run.cancelled" => Some(Self::Cancelled),
            "thread.run.expired" => Some(Self::Expired),
            "thread.run.incomplete" => Some(Self::Incomplete),
            "thread.run.requires_action" => Some(Self::RequiresAction),
            _ => None,
        }
    }

    /// Status name as the service spells it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Incomplete => "incomplete",
            Self::RequiresAction => "requires_action",
        }
    }

    /// Returns true when the run completed normally.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a streamed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Run id, when the stream reported one.
    pub run_id: Option<String>,
    /// Terminal status.
    pub status: RunStatus,
    /// Error message attached to a failed or incomplete run.
    pub last_error: Option<String>,
}

/// Live event observed while a run streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// The assistant started a new message.
    TextCreated,
    /// A chunk of message text.
    TextDelta(String),
    /// The assistant started a tool call of the given kind (e.g. `code_interpreter`).
    ToolCallCreated(String),
    /// A chunk of code-interpreter input.
    CodeInput(String),
    /// Log output of executed code.
    CodeLogs(String),
}

/// Receiver of live run events.
///
/// Purely observational: the reply is collected from the thread after the run ends.
pub trait RunEventSink: Send + Sync {
    /// Called for every event, in stream order.
    fn on_event(&self, event: &RunEvent);
}

impl<F> RunEventSink for F
where
    F: Fn(&RunEvent) + Send + Sync,
{
    fn on_event(&self, event: &RunEvent) {
        self(event);
    }
}

/// A content block of a thread message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    /// Markdown text.
    Text(String),
    /// An image stored in the service's file store.
    ImageFile(String),
    /// A block type this crate does not render, by type name.
    Unsupported(String),
}

/// A message of a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    /// Message id.
    pub id: String,
    /// `user` or `assistant`.
    pub role: String,
    /// Content blocks in service order.
    pub content: Vec<ContentBlock>,
}

/// Operations the conversation bridge needs from the assistant service.
///
/// Implementations must be usable from several threads; the bridge serializes
/// calls per session itself.
pub trait AssistantApi: Send + Sync {
    /// Uploads `content` to the file store for assistant use, returning the file id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ExternalServiceFailure`] when the upload fails.
    fn upload_file(&self, filename: &str, content: Vec<u8>) -> Result<String>;

    /// Creates an assistant with code execution enabled, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ExternalServiceFailure`] when creation fails.
    fn create_assistant(&self, model: &str, instructions: &str) -> Result<String>;

    /// Creates a thread seeded with one user message that attaches `file_id` to
    /// code execution, returning the thread id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ExternalServiceFailure`] when creation fails.
    fn create_thread(&self, seed_message: &str, file_id: &str) -> Result<String>;

    /// Starts a streamed run with `instructions` and blocks until it ends.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ExternalServiceFailure`] when the run cannot be
    /// started, the stream reports an error, or it closes before a terminal event.
    fn stream_run(
        &self,
        handles: &SessionHandles,
        instructions: &str,
        sink: Option<&dyn RunEventSink>,
    ) -> Result<RunOutcome>;

    /// Lists every message of a thread in service order, following pagination.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ExternalServiceFailure`] when a page cannot be fetched.
    fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;

    /// Downloads a stored file's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ExternalServiceFailure`] when the download fails.
    fn file_content(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Deletes the thread and the assistant of a session.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ExternalServiceFailure`] when a deletion fails.
    fn retire_session(&self, handles: &SessionHandles) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use test_case::test_case;

    #[test_case("thread.run.completed", Some(RunStatus::Completed))]
    #[test_case("thread.run.failed", Some(RunStatus::Failed))]
    #[test_case("thread.run.expired", Some(RunStatus::Expired))]
    #[test_case("thread.run.incomplete", Some(RunStatus::Incomplete))]
    #[test_case("thread.run.requires_action", Some(RunStatus::RequiresAction))]
    #[test_case("thread.run.in_progress", None)]
    #[test_case("thread.message.delta", None)]
    fn test_run_status_from_event(event: &str, expected: Option<RunStatus>) {
        assert_eq!(RunStatus::from_event(event), expected);
    }

    #[test]
    fn test_only_completed_is_success() {
        assert!(RunStatus::Completed.is_success());
        assert!(!RunStatus::Cancelled.is_success());
        assert_eq!(RunStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: &RunEvent| seen.lock().unwrap().push(event.clone());
        sink.on_event(&RunEvent::TextDelta("hi".to_string()));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![RunEvent::TextDelta("hi".to_string())]
        );
    }
}
