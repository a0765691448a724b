//! Integration tests for the conversation bridge and chat service.
//!
//! The assistant service is replaced by a recording fake behind [`AssistantApi`].
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ifc_chat::assistant::{ContentBlock, RunOutcome, RunStatus, ThreadMessage};
use ifc_chat::services::BridgeSettings;
use ifc_chat::{
    AssistantApi, ChatService, ConversationBridge, Error, FileHandleStore, HandleStore,
    IfcChatConfig, MemoryHandleStore, MessageFragment, RunEvent, RunEventSink, SessionHandles,
};

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A];

/// Fake service issuing sequential ids and answering every run with a chart.
#[derive(Default)]
struct FakeService {
    next_id: AtomicUsize,
    calls: Mutex<Vec<String>>,
    uploads: Mutex<Vec<Vec<u8>>>,
    fail_retire: bool,
    fail_create_thread: bool,
}

impl FakeService {
    fn failing_retire() -> Self {
        Self {
            fail_retire: true,
            ..Self::default()
        }
    }

    fn failing_create_thread() -> Self {
        Self {
            fail_create_thread: true,
            ..Self::default()
        }
    }

    fn issue(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl AssistantApi for FakeService {
    fn upload_file(&self, filename: &str, content: Vec<u8>) -> ifc_chat::Result<String> {
        self.record(format!("upload_file {filename}"));
        self.uploads.lock().unwrap().push(content);
        Ok(self.issue("file"))
    }

    fn create_assistant(&self, model: &str, _instructions: &str) -> ifc_chat::Result<String> {
        self.record(format!("create_assistant {model}"));
        Ok(self.issue("asst"))
    }

    fn create_thread(&self, _seed_message: &str, file_id: &str) -> ifc_chat::Result<String> {
        self.record(format!("create_thread {file_id}"));
        if self.fail_create_thread {
            return Err(Error::external("create_thread", "API returned status: 503"));
        }
        Ok(self.issue("thread"))
    }

    fn stream_run(
        &self,
        handles: &SessionHandles,
        _instructions: &str,
        sink: Option<&dyn RunEventSink>,
    ) -> ifc_chat::Result<RunOutcome> {
        self.record(format!("stream_run {}", handles.thread_id));
        if let Some(sink) = sink {
            sink.on_event(&RunEvent::ToolCallCreated("code_interpreter".to_string()));
            sink.on_event(&RunEvent::CodeInput("len(data)".to_string()));
            sink.on_event(&RunEvent::TextCreated);
            sink.on_event(&RunEvent::TextDelta("There are".to_string()));
        }
        Ok(RunOutcome {
            run_id: Some(self.issue("run")),
            status: RunStatus::Completed,
            last_error: None,
        })
    }

    fn list_messages(&self, thread_id: &str) -> ifc_chat::Result<Vec<ThreadMessage>> {
        self.record(format!("list_messages {thread_id}"));
        Ok(vec![
            ThreadMessage {
                id: "msg_2".to_string(),
                role: "assistant".to_string(),
                content: vec![
                    ContentBlock::Text("There are **3** walls.".to_string()),
                    ContentBlock::ImageFile("file_chart".to_string()),
                ],
            },
            ThreadMessage {
                id: "msg_1".to_string(),
                role: "user".to_string(),
                content: vec![ContentBlock::Text("How many walls?".to_string())],
            },
        ])
    }

    fn file_content(&self, file_id: &str) -> ifc_chat::Result<Vec<u8>> {
        self.record(format!("file_content {file_id}"));
        Ok(PNG.to_vec())
    }

    fn retire_session(&self, handles: &SessionHandles) -> ifc_chat::Result<()> {
        self.record(format!("retire_session {}", handles.thread_id));
        if self.fail_retire {
            return Err(Error::external("delete_thread", "API returned status: 500"));
        }
        Ok(())
    }
}

fn settings(scratch: &Path) -> BridgeSettings {
    BridgeSettings {
        entity: "default".to_string(),
        model: "gpt-4o-2024-05-13".to_string(),
        instructions: "Answer questions about the model.".to_string(),
        seed_message: "Here is the model data.".to_string(),
        scratch_dir: scratch.to_path_buf(),
        lock_path: Some(scratch.join("session.lock")),
        retire_previous_session: false,
    }
}

fn memory_bridge(api: &Arc<FakeService>, settings: BridgeSettings) -> ConversationBridge {
    ConversationBridge::new(
        Arc::clone(api) as Arc<dyn AssistantApi>,
        Arc::new(MemoryHandleStore::new()),
        settings,
    )
}

#[test]
fn test_ask_before_initialize_makes_no_calls() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeService::default());
    let bridge = memory_bridge(&api, settings(tmp.path()));

    assert!(matches!(
        bridge.ask("How many walls?"),
        Err(Error::SessionNotInitialized)
    ));
    assert!(api.calls().is_empty());
}

#[test]
fn test_initialize_uploads_records_then_creates_pair() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeService::default());
    let bridge = memory_bridge(&api, settings(tmp.path()));

    let records = vec![ifc_chat::FlattenedEntityRecord::new(
        10,
        "2O2Fr$t4X7Zf8NOew3FLOH",
        "IfcWall",
    )];
    let handles = bridge.initialize_session(&records).unwrap();

    assert_eq!(handles, SessionHandles::new("asst_2", "thread_3"));
    assert_eq!(
        api.calls(),
        vec![
            "upload_file model_data.json",
            "create_assistant gpt-4o-2024-05-13",
            "create_thread file_1",
        ]
    );
    let uploaded: serde_json::Value =
        serde_json::from_slice(&api.uploads.lock().unwrap()[0]).unwrap();
    assert_eq!(uploaded[0]["ExpressID"], 10);
    assert_eq!(bridge.current_session().unwrap(), Some(handles));
}

#[test]
fn test_second_initialize_replaces_pair() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeService::default());
    let bridge = memory_bridge(&api, settings(tmp.path()));

    let first = bridge.initialize_session(&[]).unwrap();
    let second = bridge.initialize_session(&[]).unwrap();
    assert_ne!(first, second);

    bridge.ask("How many walls?").unwrap();
    let calls = api.calls();
    assert!(calls.contains(&format!("stream_run {}", second.thread_id)));
    assert!(!calls.contains(&format!("stream_run {}", first.thread_id)));
    // Abandoned, not deleted.
    assert!(!calls.iter().any(|c| c.starts_with("retire_session")));
}

#[test]
fn test_retire_previous_session() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeService::default());
    let bridge = memory_bridge(
        &api,
        BridgeSettings {
            retire_previous_session: true,
            ..settings(tmp.path())
        },
    );

    let first = bridge.initialize_session(&[]).unwrap();
    bridge.initialize_session(&[]).unwrap();
    assert_eq!(
        api.calls().last().unwrap(),
        &format!("retire_session {}", first.thread_id)
    );
}

#[test]
fn test_failed_retire_keeps_new_session() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeService::failing_retire());
    let bridge = memory_bridge(
        &api,
        BridgeSettings {
            retire_previous_session: true,
            ..settings(tmp.path())
        },
    );

    bridge.initialize_session(&[]).unwrap();
    let second = bridge.initialize_session(&[]).unwrap();
    assert_eq!(bridge.current_session().unwrap(), Some(second));
}

#[test]
fn test_ask_collects_every_message_in_service_order() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeService::default());
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);
    let bridge = memory_bridge(&api, settings(tmp.path()))
        .with_event_sink(Arc::new(move |event: &RunEvent| {
            seen.lock().unwrap().push(event.clone());
        }));

    bridge.initialize_session(&[]).unwrap();
    let fragments = bridge.ask("How many walls?").unwrap();

    assert_eq!(
        fragments,
        vec![
            MessageFragment::text("There are **3** walls."),
            MessageFragment::image(PNG),
            MessageFragment::text("How many walls?"),
        ]
    );
    assert_eq!(std::fs::read(tmp.path().join("image_0.png")).unwrap(), PNG);
    assert_eq!(events.lock().unwrap().len(), 4);
    assert_eq!(
        events.lock().unwrap()[0],
        RunEvent::ToolCallCreated("code_interpreter".to_string())
    );
}

#[test]
fn test_close_session_retires_and_forgets() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeService::default());
    let bridge = memory_bridge(&api, settings(tmp.path()));

    assert_eq!(bridge.close_session().unwrap(), None);
    let handles = bridge.initialize_session(&[]).unwrap();
    assert_eq!(bridge.close_session().unwrap(), Some(handles));
    assert_eq!(bridge.current_session().unwrap(), None);
    assert!(matches!(bridge.ask("again?"), Err(Error::SessionNotInitialized)));
}

#[test]
fn test_file_store_survives_bridge_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let state: PathBuf = tmp.path().join("state.json");
    let api = Arc::new(FakeService::default());

    let handles = {
        let bridge = ConversationBridge::new(
            Arc::clone(&api) as Arc<dyn AssistantApi>,
            Arc::new(FileHandleStore::new(&state)),
            settings(tmp.path()),
        );
        bridge.initialize_session(&[]).unwrap()
    };

    let store = Arc::new(FileHandleStore::new(&state));
    assert!(store.exists("default").unwrap());
    let bridge = ConversationBridge::new(
        Arc::clone(&api) as Arc<dyn AssistantApi>,
        store,
        settings(tmp.path()),
    );
    bridge.ask("Still there?").unwrap();
    assert!(
        api.calls()
            .contains(&format!("stream_run {}", handles.thread_id))
    );
}

#[test]
fn test_entities_have_separate_sessions() {
    let tmp = tempfile::tempdir().unwrap();
    let state = tmp.path().join("state.json");
    let api = Arc::new(FakeService::default());
    let bridge_for = |entity: &str| {
        ConversationBridge::new(
            Arc::clone(&api) as Arc<dyn AssistantApi>,
            Arc::new(FileHandleStore::new(&state)),
            BridgeSettings {
                entity: entity.to_string(),
                ..settings(tmp.path())
            },
        )
    };

    let alice = bridge_for("alice").initialize_session(&[]).unwrap();
    assert_eq!(bridge_for("bob").current_session().unwrap(), None);
    assert_eq!(bridge_for("alice").current_session().unwrap(), Some(alice));
}

#[test]
fn test_chat_service_upload_and_ask() {
    let tmp = tempfile::tempdir().unwrap();
    let config = IfcChatConfig::default().with_data_dir(tmp.path());
    let api = Arc::new(FakeService::default());
    let bridge = ConversationBridge::new(
        Arc::clone(&api) as Arc<dyn AssistantApi>,
        Arc::new(FileHandleStore::new(config.state_path())),
        BridgeSettings::from_config(&config),
    );
    let service = ChatService::new(config, bridge);

    assert!(matches!(
        service.ask("How many walls?"),
        Err(Error::NoModelUploaded)
    ));

    let fixture = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("office_ifc4.ifc");
    let summary = service.upload(&fixture).unwrap();
    assert_eq!(summary.record_count, 8);
    assert!(summary.model_data_path.is_file());

    let transcript = service.ask("How many walls?").unwrap();
    assert!(transcript.html.contains("<h2>How many walls?</h2>"));
    assert!(transcript.html.contains("<strong>3</strong>"));
    assert!(
        transcript
            .html
            .contains(&format!("data:image/png;base64,{}", STANDARD.encode(PNG)))
    );
    assert!(service.config().scratch_dir.join("image_0.png").is_file());

    let status = service.status().unwrap();
    assert_eq!(status.record_count, Some(8));
    assert_eq!(status.session, Some(summary.session));
}

#[test]
fn test_failed_upload_keeps_previous_model_data() {
    let tmp = tempfile::tempdir().unwrap();
    let config = IfcChatConfig::default().with_data_dir(tmp.path());
    let model_data = config.model_data_path();
    let api = Arc::new(FakeService::failing_create_thread());
    let bridge = ConversationBridge::new(
        Arc::clone(&api) as Arc<dyn AssistantApi>,
        Arc::new(FileHandleStore::new(config.state_path())),
        BridgeSettings::from_config(&config),
    );
    let service = ChatService::new(config, bridge);

    let records = vec![ifc_chat::FlattenedEntityRecord::new(1, "g", "IfcWall")];
    assert!(matches!(
        service.upload_records(&records),
        Err(Error::ExternalServiceFailure { .. })
    ));
    assert!(!model_data.exists());
    assert!(matches!(
        service.ask("How many walls?"),
        Err(Error::NoModelUploaded)
    ));
}
