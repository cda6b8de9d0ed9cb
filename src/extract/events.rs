//! Event-stream scanning for streaming backends.
//!
//! A single invocation can emit many intermediate events (tool calls,
//! progress, partial reasoning). Only the final completed assistant message
//! is authoritative, so the scan is a single forward pass that keeps the most
//! recent qualifying event. Taking the *last* match tolerates backends that
//! complete more than one message during a turn.
//!
//! Two event shapes qualify:
//!
//! ```json
//! {"type": "item.completed", "item": {"type": "agent_message", "text": "..."}}
//! {"type": "response.completed", "response": {"output_text": "..."}}
//! ```

use serde::Deserialize;
use tracing::trace;

use crate::error::ExtractionError;

/// One structured event from the stream. Unknown fields are ignored so new
/// event types never break the scan.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    item: Option<EventItem>,
    #[serde(default)]
    response: Option<EventResponse>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    #[serde(default)]
    output_text: Option<String>,
}

/// Scans an event stream for the text of the last completed assistant
/// message.
///
/// Malformed lines are skipped and never abort the scan. If the scan ends
/// without a qualifying event the error distinguishes "all events parsed but
/// none qualified" (`NoCompletedMessage`) from "some events were unreadable"
/// (`MalformedEvent`), since the latter is the more useful diagnostic.
pub fn scan_for_last_message(stream: &str) -> Result<String, ExtractionError> {
    let mut last_message: Option<String> = None;
    let mut skipped = 0usize;

    for line in stream.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: StreamEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(_) => {
                skipped += 1;
                trace!(line_len = line.len(), "Skipping unparseable event line");
                continue;
            }
        };

        match event.kind.as_str() {
            "item.completed" => {
                if let Some(item) = event.item {
                    if item.kind == "agent_message" {
                        if let Some(text) = item.text.filter(|t| !t.is_empty()) {
                            last_message = Some(text);
                        }
                    }
                }
            }
            "response.completed" => {
                if let Some(response) = event.response {
                    if let Some(text) = response.output_text.filter(|t| !t.is_empty()) {
                        last_message = Some(text);
                    }
                }
            }
            _ => {}
        }
    }

    last_message.ok_or(if skipped > 0 {
        ExtractionError::MalformedEvent { skipped }
    } else {
        ExtractionError::NoCompletedMessage
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(text: &str) -> String {
        format!(
            r#"{{"type":"item.completed","item":{{"type":"agent_message","text":"{}"}}}}"#,
            text
        )
    }

    #[test]
    fn test_takes_last_completed_message() {
        let stream = format!(
            "{}\n{}\n{}\n",
            completed("first"),
            r#"{"type":"item.completed","item":{"type":"tool_call","text":"ignored"}}"#,
            completed("second"),
        );
        assert_eq!(scan_for_last_message(&stream).unwrap(), "second");
    }

    #[test]
    fn test_response_completed_qualifies() {
        let stream = format!(
            "{}\n{}\n",
            completed("early"),
            r#"{"type":"response.completed","response":{"output_text":"final"}}"#,
        );
        assert_eq!(scan_for_last_message(&stream).unwrap(), "final");
    }

    #[test]
    fn test_no_completed_message() {
        let stream = concat!(
            r#"{"type":"item.started","item":{"type":"agent_message"}}"#,
            "\n",
            r#"{"type":"turn.completed"}"#,
            "\n",
        );
        assert_eq!(
            scan_for_last_message(stream).unwrap_err(),
            ExtractionError::NoCompletedMessage
        );
    }

    #[test]
    fn test_malformed_lines_are_skipped_not_fatal() {
        let stream = format!("not json at all\n{{truncated\n{}\n", completed("survived"));
        assert_eq!(scan_for_last_message(&stream).unwrap(), "survived");
    }

    #[test]
    fn test_all_malformed_reports_skipped_count() {
        let stream = "garbage\nmore garbage\n";
        assert_eq!(
            scan_for_last_message(stream).unwrap_err(),
            ExtractionError::MalformedEvent { skipped: 2 }
        );
    }

    #[test]
    fn test_empty_text_does_not_qualify() {
        let stream = format!("{}\n", completed(""));
        assert_eq!(
            scan_for_last_message(&stream).unwrap_err(),
            ExtractionError::NoCompletedMessage
        );
    }

    #[test]
    fn test_blank_lines_ignored() {
        let stream = format!("\n\n{}\n\n", completed("only"));
        assert_eq!(scan_for_last_message(&stream).unwrap(), "only");
    }
}
