//! `OpenAI` Assistants v2 client.

use std::io::BufReader;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    AssistantApi, ContentBlock, RunEventSink, RunOutcome, ThreadMessage, consume_run_stream,
};
use crate::config::AssistantConfig;
use crate::models::SessionHandles;
use crate::{Error, Result};

/// Page size for message listing (the service maximum).
const MESSAGE_PAGE_LIMIT: u32 = 100;

/// `OpenAI` Assistants client over blocking HTTP.
pub struct OpenAiAssistantClient {
    /// API key.
    api_key: Option<SecretString>,
    /// API base URL, without trailing slash.
    base_url: String,
    /// HTTP client.
    client: Client,
}

impl OpenAiAssistantClient {
    /// Default API base URL.
    pub const DEFAULT_BASE_URL: &'static str = AssistantConfig::DEFAULT_BASE_URL;

    /// Creates a client reading the key from `OPENAI_API_KEY`.
    #[must_use]
    pub fn new() -> Self {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(SecretString::from);
        Self {
            api_key,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Creates a client from assistant configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when no API key is configured and
    /// [`Error::OperationFailed`] when the HTTP client cannot be built.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let timeout = (config.timeout_ms > 0).then(|| Duration::from_millis(config.timeout_ms));
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| Error::operation("build_http_client", e))?;
        let client = Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        };
        client.validate()?;
        Ok(client)
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// API base URL in use.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Validates that the client is configured.
    fn validate(&self) -> Result<()> {
        match &self.api_key {
            Some(key) if !key.expose_secret().trim().is_empty() => Ok(()),
            _ => Err(Error::InvalidInput(
                "OpenAI API key not set (assistant.api_key or OPENAI_API_KEY)".to_string(),
            )),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Adds authentication and the Assistants v2 header.
    fn authorized(&self, request: RequestBuilder, operation: &str) -> Result<RequestBuilder> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::external(operation, "API key not configured"))?;
        Ok(request
            .bearer_auth(key.expose_secret())
            .header("OpenAI-Beta", "assistants=v2"))
    }

    fn send(&self, request: RequestBuilder, operation: &str) -> Result<Response> {
        let response = self
            .authorized(request, operation)?
            .send()
            .map_err(|e| Error::external(operation, e))?;
        check_status(response, operation)
    }

    fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T> {
        self.send(request, operation)?
            .json()
            .map_err(|e| Error::external(operation, format!("invalid response body: {e}")))
    }

    fn list_page(&self, thread_id: &str, after: Option<&str>) -> Result<MessagePage> {
        let mut query = vec![("limit", MESSAGE_PAGE_LIMIT.to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        let request = self
            .client
            .get(self.url(&format!("threads/{thread_id}/messages")))
            .query(&query);
        self.send_json(request, "list_messages")
    }

    fn delete(&self, path: &str, operation: &str) -> Result<()> {
        let deleted: Deleted = self.send_json(self.client.delete(self.url(path)), operation)?;
        if deleted.deleted {
            Ok(())
        } else {
            Err(Error::external(operation, format!("{} was not deleted", deleted.id)))
        }
    }
}

impl Default for OpenAiAssistantClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AssistantApi for OpenAiAssistantClient {
    fn upload_file(&self, filename: &str, content: Vec<u8>) -> Result<String> {
        const OP: &str = "upload_file";
        let part = multipart::Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str("application/json")
            .map_err(|e| Error::external(OP, e))?;
        let form = multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);
        let request = self.client.post(self.url("files")).multipart(form);
        let created: Created = self.send_json(request, OP)?;
        tracing::debug!(file_id = %created.id, filename, "Uploaded file");
        Ok(created.id)
    }

    fn create_assistant(&self, model: &str, instructions: &str) -> Result<String> {
        let body = CreateAssistantRequest {
            model,
            instructions,
            tools: vec![Tool::code_interpreter()],
        };
        let request = self.client.post(self.url("assistants")).json(&body);
        let created: Created = self.send_json(request, "create_assistant")?;
        Ok(created.id)
    }

    fn create_thread(&self, seed_message: &str, file_id: &str) -> Result<String> {
        let body = json!({
            "messages": [{
                "role": "user",
                "content": seed_message,
                "attachments": [{
                    "file_id": file_id,
                    "tools": [Tool::code_interpreter()],
                }],
            }],
        });
        let request = self.client.post(self.url("threads")).json(&body);
        let created: Created = self.send_json(request, "create_thread")?;
        Ok(created.id)
    }

    fn stream_run(
        &self,
        handles: &SessionHandles,
        instructions: &str,
        sink: Option<&dyn RunEventSink>,
    ) -> Result<RunOutcome> {
        let body = json!({
            "assistant_id": handles.assistant_id,
            "instructions": instructions,
            "stream": true,
        });
        let request = self
            .client
            .post(self.url(&format!("threads/{}/runs", handles.thread_id)))
            .header("Accept", "text/event-stream")
            .json(&body);
        let response = self.send(request, "stream_run")?;
        consume_run_stream(BufReader::new(response), sink)
    }

    fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let mut messages = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = self.list_page(thread_id, after.as_deref())?;
            let has_more = page.has_more;
            let last_id = page.last_id.clone();
            messages.extend(page.data.into_iter().map(RawMessage::into_message));
            match (has_more, last_id) {
                (true, Some(last)) => after = Some(last),
                _ => break,
            }
        }
        tracing::debug!(thread_id, count = messages.len(), "Listed thread messages");
        Ok(messages)
    }

    fn file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        const OP: &str = "file_content";
        let url = self.url(&format!("files/{file_id}/content"));
        let response = self.send(self.client.get(url), OP)?;
        let bytes = response.bytes().map_err(|e| Error::external(OP, e))?;
        Ok(bytes.to_vec())
    }

    fn retire_session(&self, handles: &SessionHandles) -> Result<()> {
        self.delete(&format!("threads/{}", handles.thread_id), "delete_thread")?;
        self.delete(
            &format!("assistants/{}", handles.assistant_id),
            "delete_assistant",
        )
    }
}

/// Maps a non-success response to [`Error::ExternalServiceFailure`].
fn check_status(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let detail = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);
    Err(Error::external(
        operation,
        format!("API returned status: {status} - {detail}"),
    ))
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Tool {
    const fn code_interpreter() -> Self {
        Self {
            kind: "code_interpreter",
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateAssistantRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    tools: Vec<Tool>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Deleted {
    id: String,
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    data: Vec<RawMessage>,
    #[serde(default)]
    has_more: bool,
    last_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    role: String,
    #[serde(default)]
    content: Vec<RawContent>,
}

impl RawMessage {
    fn into_message(self) -> ThreadMessage {
        ThreadMessage {
            id: self.id,
            role: self.role,
            content: self.content.into_iter().map(RawContent::into_block).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<RawText>,
    image_file: Option<RawImageFile>,
}

impl RawContent {
    fn into_block(self) -> ContentBlock {
        match (self.kind.as_str(), self.text, self.image_file) {
            ("text", Some(text), _) => ContentBlock::Text(text.value),
            ("image_file", _, Some(image)) => ContentBlock::ImageFile(image.file_id),
            _ => ContentBlock::Unsupported(self.kind),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawText {
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawImageFile {
    file_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OpenAiAssistantClient::new()
            .with_api_key("sk-test")
            .with_base_url("http://localhost:1234/v1/");
        assert_eq!(client.base_url(), "http://localhost:1234/v1");
        assert_eq!(
            client.url("/threads/t/messages"),
            "http://localhost:1234/v1/threads/t/messages"
        );
        assert!(client.validate().is_ok());
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = AssistantConfig::default();
        let Err(err) = OpenAiAssistantClient::from_config(&config) else {
            panic!("expected missing key error");
        };
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_from_config_with_key() {
        let config = AssistantConfig {
            api_key: Some(SecretString::from("sk-test".to_string())),
            base_url: "https://example.test/v1/".to_string(),
            ..AssistantConfig::default()
        };
        let client = OpenAiAssistantClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "https://example.test/v1");
    }

    #[test]
    fn test_create_assistant_request_shape() {
        let body = CreateAssistantRequest {
            model: "gpt-4o-2024-05-13",
            instructions: "be brief",
            tools: vec![Tool::code_interpreter()],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "model": "gpt-4o-2024-05-13",
                "instructions": "be brief",
                "tools": [{"type": "code_interpreter"}],
            })
        );
    }

    #[test]
    fn test_message_page_parsing() {
        let page: MessagePage = serde_json::from_value(json!({
            "object": "list",
            "data": [{
                "id": "msg_2",
                "role": "assistant",
                "content": [
                    {"type": "image_file", "image_file": {"file_id": "file_img"}},
                    {"type": "text", "text": {"value": "There are 12 walls.", "annotations": []}},
                    {"type": "image_url", "image_url": {"url": "https://example.test/x.png"}}
                ]
            }],
            "first_id": "msg_2",
            "last_id": "msg_2",
            "has_more": false
        }))
        .unwrap();
        assert!(!page.has_more);
        let messages: Vec<ThreadMessage> =
            page.data.into_iter().map(RawMessage::into_message).collect();
        assert_eq!(messages[0].role, "assistant");
        assert_eq!(
            messages[0].content,
            vec![
                ContentBlock::ImageFile("file_img".to_string()),
                ContentBlock::Text("There are 12 walls.".to_string()),
                ContentBlock::Unsupported("image_url".to_string()),
            ]
        );
    }
}
