//! Output extraction: raw backend output to a single candidate JSON text.
//!
//! Plain-text backends return the document directly, possibly padded with
//! whitespace, markdown fences, or surrounding prose. Streaming backends
//! return a sequence of JSON events from which the final assistant message
//! must be recovered (see [`events`]).
//!
//! Extraction is a pure function of the raw output; prompt content is never
//! inspected. The result is the *candidate* document: validation happens in
//! the schema layer, not here.

pub mod events;

use regex::Regex;

use crate::backend::{BackendKind, RawOutput};
use crate::error::ExtractionError;

/// Which extraction path produced a candidate document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPath {
    /// Whole stdout body, fence-stripped.
    PlainText,
    /// Last completed assistant message from a structured event stream.
    EventStream,
}

/// The extracted, not-yet-validated JSON text plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDocument {
    pub text: String,
    pub backend: BackendKind,
    pub path: ExtractionPath,
}

/// Extracts a candidate document from one invocation's raw output.
///
/// # Errors
///
/// - `EmptyOutput` when a plain-text body has nothing left after trimming
/// - `NoCompletedMessage` / `MalformedEvent` for event streams, see
///   [`events::scan_for_last_message`]
pub fn extract(raw: RawOutput, backend: BackendKind) -> Result<CandidateDocument, ExtractionError> {
    match raw {
        RawOutput::Text(body) => Ok(CandidateDocument {
            text: extract_plain_text(&body)?,
            backend,
            path: ExtractionPath::PlainText,
        }),
        RawOutput::EventStream(body) => {
            let message = events::scan_for_last_message(&body)?;
            // The message itself may still carry fences or prose around the
            // JSON; run it through the same plain-text cleanup.
            Ok(CandidateDocument {
                text: extract_plain_text(&message)?,
                backend,
                path: ExtractionPath::EventStream,
            })
        }
    }
}

/// Cleans a plain-text body down to the candidate JSON text.
///
/// Strategy order:
/// 1. A ```json (or generic) code fence, if present
/// 2. The body itself when it already starts with `{`
/// 3. A balanced `{...}` slice found anywhere in the body
/// 4. The trimmed body verbatim (validation decides whether it is JSON)
fn extract_plain_text(body: &str) -> Result<String, ExtractionError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::EmptyOutput);
    }

    if let Some(block) = extract_fenced_block(trimmed) {
        return Ok(block);
    }

    if !trimmed.starts_with('{') {
        if let Some(start) = trimmed.find('{') {
            if let Some(end) = find_matching_brace(&trimmed[start..]) {
                return Ok(trimmed[start..=start + end].to_string());
            }
        }
    }

    Ok(trimmed.to_string())
}

/// Extracts the content of the first markdown code fence, if any.
fn extract_fenced_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok()?;
    let caps = re.captures(content)?;
    let inner = caps.get(1)?.as_str().trim();
    if inner.is_empty() {
        return None;
    }
    Some(inner.to_string())
}

/// Finds the matching closing brace for a string starting with `{`.
///
/// Handles nesting, string literals, and escape sequences.
pub(crate) fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                depth += 1;
            }
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{"summary": "water", "memory_chain": "..."}"#;

    #[test]
    fn test_plain_json_with_whitespace() {
        let raw = RawOutput::Text(format!("\n\n  {}  \n", DOC));
        let doc = extract(raw, BackendKind::Claude).unwrap();
        assert_eq!(doc.text, DOC);
        assert_eq!(doc.path, ExtractionPath::PlainText);
    }

    #[test]
    fn test_plain_json_in_fence() {
        let raw = RawOutput::Text(format!("```json\n{}\n```", DOC));
        let doc = extract(raw, BackendKind::Claude).unwrap();
        assert_eq!(doc.text, DOC);
    }

    #[test]
    fn test_plain_json_in_generic_fence() {
        let raw = RawOutput::Text(format!("```\n{}\n```", DOC));
        let doc = extract(raw, BackendKind::Claude).unwrap();
        assert_eq!(doc.text, DOC);
    }

    #[test]
    fn test_json_surrounded_by_prose() {
        let raw = RawOutput::Text(format!("Here is the result:\n{}\nHope that helps!", DOC));
        let doc = extract(raw, BackendKind::Claude).unwrap();
        assert_eq!(doc.text, DOC);
    }

    #[test]
    fn test_empty_output() {
        let raw = RawOutput::Text("   \n\t  ".to_string());
        assert_eq!(
            extract(raw, BackendKind::Claude).unwrap_err(),
            ExtractionError::EmptyOutput
        );
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_matching() {
        let tricky = r#"{"summary": "uses { and } inside", "note": "ok"}"#;
        let raw = RawOutput::Text(format!("prefix {}", tricky));
        let doc = extract(raw, BackendKind::Claude).unwrap();
        assert_eq!(doc.text, tricky);
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let tricky = r#"{"summary": "a \"quoted\" word"}"#;
        assert_eq!(find_matching_brace(tricky), Some(tricky.len() - 1));
    }

    #[test]
    fn test_event_stream_routes_through_scanner() {
        let stream = format!(
            "{}\n{}\n",
            r#"{"type":"item.started","item":{"type":"agent_message"}}"#,
            format!(
                r#"{{"type":"item.completed","item":{{"type":"agent_message","text":"{}"}}}}"#,
                DOC.replace('"', "\\\"")
            )
        );
        let doc = extract(RawOutput::EventStream(stream), BackendKind::Codex).unwrap();
        assert_eq!(doc.text, DOC);
        assert_eq!(doc.path, ExtractionPath::EventStream);
    }
}
