//! Server-sent event handling for streamed runs.

use std::io::BufRead;

use eventsource_stream::Eventsource;
use futures::executor::block_on_stream;
use futures::stream;
use serde_json::Value;

use super::{RunEvent, RunEventSink, RunOutcome, RunStatus};
use crate::{Error, Result};

const OPERATION: &str = "stream_run";

/// Reads a run's event stream to its terminal event.
///
/// Text and tool-call events go to `sink` as they arrive. The stream must end in a
/// terminal `thread.run.*` event; an `error` event or an early close is an
/// [`Error::ExternalServiceFailure`].
///
/// # Errors
///
/// Returns [`Error::ExternalServiceFailure`] on read errors, malformed event data,
/// service-reported errors, or a stream without terminal event.
pub fn consume_run_stream<R: BufRead>(
    mut reader: R,
    sink: Option<&dyn RunEventSink>,
) -> Result<RunOutcome> {
    // Whole lines keep multi-byte characters inside one chunk.
    let chunks = std::iter::from_fn(move || {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => None,
            Ok(_) => Some(Ok(line)),
            Err(e) => Some(Err(e)),
        }
    });
    let events = block_on_stream(Box::pin(stream::iter(chunks).eventsource()));
    let mut run_id: Option<String> = None;

    for event in events {
        let event =
            event.map_err(|e| Error::external(OPERATION, format!("stream read error: {e}")))?;

        tracing::trace!(event = %event.event, "Run stream event");
        if event.data == "[DONE]" || event.event == "done" {
            break;
        }
        if event.event == "error" {
            return Err(Error::external(OPERATION, service_error_message(&event.data)));
        }
        if event.data.is_empty() {
            continue;
        }

        let payload: Value = serde_json::from_str(&event.data).map_err(|e| {
            Error::external(OPERATION, format!("malformed event data for '{}': {e}", event.event))
        })?;

        if event.event.starts_with("thread.run.") && !event.event.starts_with("thread.run.step") {
            if run_id.is_none() {
                run_id = payload.get("id").and_then(Value::as_str).map(str::to_string);
            }
            if let Some(status) = RunStatus::from_event(&event.event) {
                let outcome = RunOutcome {
                    run_id,
                    status,
                    last_error: last_error(&payload),
                };
                tracing::debug!(
                    status = %outcome.status,
                    run_id = ?outcome.run_id,
                    "Run reached terminal state"
                );
                return Ok(outcome);
            }
            continue;
        }

        if let Some(sink) = sink {
            for live in live_events(&event.event, &payload) {
                sink.on_event(&live);
            }
        }
    }

    Err(Error::external(
        OPERATION,
        "stream closed before the run reached a terminal state",
    ))
}

fn service_error_message(data: &str) -> String {
    serde_json::from_str::<Value>(data)
        .ok()
        .and_then(|v| {
            let error = v.get("error").unwrap_or(&v);
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("service reported an error: {data}"))
}

fn last_error(run: &Value) -> Option<String> {
    let error = run.get("last_error").filter(|e| !e.is_null());
    let details = run.get("incomplete_details").filter(|d| !d.is_null());
    error
        .map(|e| {
            let code = e.get("code").and_then(Value::as_str).unwrap_or("error");
            let message = e.get("message").and_then(Value::as_str).unwrap_or_default();
            format!("{code}: {message}")
        })
        .or_else(|| {
            details
                .and_then(|d| d.get("reason"))
                .and_then(Value::as_str)
                .map(|reason| format!("incomplete: {reason}"))
        })
}

/// Translates message and run-step events into live events.
fn live_events(event: &str, payload: &Value) -> Vec<RunEvent> {
    let mut events = Vec::new();
    match event {
        "thread.message.created" => events.push(RunEvent::TextCreated),
        "thread.message.delta" => {
            let blocks = payload
                .pointer("/delta/content")
                .and_then(Value::as_array)
                .into_iter()
                .flatten();
            for block in blocks {
                if let Some(text) = block.pointer("/text/value").and_then(Value::as_str) {
                    events.push(RunEvent::TextDelta(text.to_string()));
                }
            }
        },
        "thread.run.step.delta" => {
            let calls = payload
                .pointer("/delta/step_details/tool_calls")
                .and_then(Value::as_array)
                .into_iter()
                .flatten();
            for call in calls {
                // The first delta of a tool call carries its id.
                if call.get("id").is_some() {
                    let kind = call.get("type").and_then(Value::as_str).unwrap_or("tool");
                    events.push(RunEvent::ToolCallCreated(kind.to_string()));
                }
                let Some(code) = call.get("code_interpreter") else {
                    continue;
                };
                if let Some(input) = code
                    .get("input")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                {
                    events.push(RunEvent::CodeInput(input.to_string()));
                }
                let outputs = code
                    .get("outputs")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten();
                for output in outputs {
                    if output.get("type").and_then(Value::as_str) == Some("logs") {
                        if let Some(logs) = output.get("logs").and_then(Value::as_str) {
                            events.push(RunEvent::CodeLogs(logs.to_string()));
                        }
                    }
                }
            }
        },
        _ => {},
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    fn frames(events: &[(&str, &str)]) -> String {
        events
            .iter()
            .map(|(event, data)| format!("event: {event}\ndata: {data}\n\n"))
            .collect()
    }

    #[test]
    fn test_multi_line_data_and_comments() {
        let body = ": keep-alive\n\
                    event: error\n\
                    data: {\"message\":\n\
                    data: \"rate limited\"}\n\n";
        let err = consume_run_stream(Cursor::new(body), None).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_crlf_frames() {
        let body = "event: thread.run.completed\r\ndata: {\"id\":\"run_4\"}\r\n\r\n";
        let outcome = consume_run_stream(Cursor::new(body), None).unwrap();
        assert_eq!(outcome.run_id.as_deref(), Some("run_4"));
    }

    #[test]
    fn test_completed_run() {
        let body = frames(&[
            ("thread.run.created", r#"{"id":"run_1","status":"queued"}"#),
            ("thread.run.in_progress", r#"{"id":"run_1","status":"in_progress"}"#),
            ("thread.run.completed", r#"{"id":"run_1","status":"completed","last_error":null}"#),
            ("done", "[DONE]"),
        ]);
        let outcome = consume_run_stream(Cursor::new(body), None).unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.run_id.as_deref(), Some("run_1"));
        assert!(outcome.last_error.is_none());
    }

    #[test]
    fn test_failed_run_reports_last_error() {
        let body = frames(&[(
            "thread.run.failed",
            r#"{"id":"run_2","last_error":{"code":"server_error","message":"boom"}}"#,
        )]);
        let outcome = consume_run_stream(Cursor::new(body), None).unwrap();
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.last_error.as_deref(), Some("server_error: boom"));
    }

    #[test]
    fn test_incomplete_run_reports_reason() {
        let body = frames(&[(
            "thread.run.incomplete",
            r#"{"id":"run_3","incomplete_details":{"reason":"max_completion_tokens"}}"#,
        )]);
        let outcome = consume_run_stream(Cursor::new(body), None).unwrap();
        assert_eq!(outcome.status, RunStatus::Incomplete);
        assert_eq!(
            outcome.last_error.as_deref(),
            Some("incomplete: max_completion_tokens")
        );
    }

    #[test]
    fn test_stream_closed_early() {
        let body = frames(&[("thread.run.created", r#"{"id":"run_1"}"#)]);
        let err = consume_run_stream(Cursor::new(body), None).unwrap_err();
        assert!(err.to_string().contains("terminal state"));
    }

    #[test]
    fn test_done_without_terminal_event() {
        let body = frames(&[("done", "[DONE]")]);
        assert!(matches!(
            consume_run_stream(Cursor::new(body), None),
            Err(Error::ExternalServiceFailure { .. })
        ));
    }

    #[test]
    fn test_error_event() {
        let body = frames(&[("error", r#"{"message":"rate limited","type":"server_error"}"#)]);
        let err = consume_run_stream(Cursor::new(body), None).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_live_events_reach_sink() {
        let body = frames(&[
            ("thread.message.created", r#"{"id":"msg_1"}"#),
            (
                "thread.message.delta",
                r#"{"delta":{"content":[{"index":0,"type":"text","text":{"value":"Hel"}}]}}"#,
            ),
            (
                "thread.run.step.delta",
                r#"{"delta":{"step_details":{"type":"tool_calls","tool_calls":[{"index":0,"id":"call_1","type":"code_interpreter","code_interpreter":{"input":"print(1)","outputs":[]}}]}}}"#,
            ),
            (
                "thread.run.step.delta",
                r#"{"delta":{"step_details":{"type":"tool_calls","tool_calls":[{"index":0,"type":"code_interpreter","code_interpreter":{"outputs":[{"index":0,"type":"logs","logs":"1"}]}}]}}}"#,
            ),
            ("thread.run.completed", r#"{"id":"run_1"}"#),
        ]);
        let seen = Mutex::new(Vec::new());
        let sink = |event: &RunEvent| seen.lock().unwrap().push(event.clone());
        consume_run_stream(Cursor::new(body), Some(&sink)).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RunEvent::TextCreated,
                RunEvent::TextDelta("Hel".to_string()),
                RunEvent::ToolCallCreated("code_interpreter".to_string()),
                RunEvent::CodeInput("print(1)".to_string()),
                RunEvent::CodeLogs("1".to_string()),
            ]
        );
    }
}
