//! Worker output protocol.
//!
//! Workers report progress by writing lines of the form
//! `PROGRESS:<json>` to stdout. The JSON object carries a `type` field
//! (`progress`, `item_completed`, `item_failed`) and an optional `v`
//! protocol version; a missing `v` means version 1. Every other stdout
//! line is an opaque log line.
//!
//! Parsing never fails the job: a line that carries the marker but does
//! not decode is reported as [`ParsedLine::Malformed`] and the caller
//! forwards it as a log line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marker that introduces a structured progress line.
pub const PROGRESS_PREFIX: &str = "PROGRESS:";

/// Protocol version understood by this build.
pub const PROTOCOL_VERSION: u64 = 1;

/// A decoded structured progress line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Progress {
        percent: f64,
        #[serde(default)]
        message: String,
    },
    ItemCompleted {
        item: String,
        #[serde(default)]
        detail: Option<Value>,
    },
    ItemFailed {
        item: String,
        error: String,
    },
}

/// Classification of one line of worker stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// A well-formed progress line.
    Message(WorkerMessage),
    /// An ordinary output line.
    Plain,
    /// The line carried the marker but could not be decoded.
    Malformed(String),
}

/// Classify a single line of worker stdout.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(body) = line.trim_start().strip_prefix(PROGRESS_PREFIX) else {
        return ParsedLine::Plain;
    };

    let value: Value = match serde_json::from_str(body.trim()) {
        Ok(v) => v,
        Err(e) => return ParsedLine::Malformed(format!("invalid JSON: {e}")),
    };

    if !value.is_object() {
        return ParsedLine::Malformed("payload is not a JSON object".to_string());
    }

    match value.get("v") {
        None => {}
        Some(v) if v.as_u64() == Some(PROTOCOL_VERSION) => {}
        Some(v) => return ParsedLine::Malformed(format!("unsupported protocol version {v}")),
    }

    let message: WorkerMessage = match serde_json::from_value(value) {
        Ok(m) => m,
        Err(e) => return ParsedLine::Malformed(e.to_string()),
    };

    if let WorkerMessage::Progress { percent, .. } = &message {
        if !percent.is_finite() || !(0.0..=100.0).contains(percent) {
            return ParsedLine::Malformed(format!("percent {percent} outside 0..=100"));
        }
    }

    ParsedLine::Message(message)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_not_progress() {
        assert_eq!(parse_line("loading network model"), ParsedLine::Plain);
        assert_eq!(parse_line(""), ParsedLine::Plain);
        assert_eq!(parse_line("progress: 10%"), ParsedLine::Plain);
    }

    #[test]
    fn parses_progress_line() {
        let parsed = parse_line(r#"PROGRESS:{"type":"progress","percent":42.5,"message":"fitting"}"#);
        assert_eq!(
            parsed,
            ParsedLine::Message(WorkerMessage::Progress {
                percent: 42.5,
                message: "fitting".to_string(),
            })
        );
    }

    #[test]
    fn message_defaults_to_empty() {
        let parsed = parse_line(r#"PROGRESS:{"type":"progress","percent":5}"#);
        assert!(matches!(
            parsed,
            ParsedLine::Message(WorkerMessage::Progress { message, .. }) if message.is_empty()
        ));
    }

    #[test]
    fn parses_item_events() {
        let done = parse_line(r#"PROGRESS:{"type":"item_completed","item":"feeder-7"}"#);
        assert!(matches!(
            done,
            ParsedLine::Message(WorkerMessage::ItemCompleted { ref item, detail: None }) if item == "feeder-7"
        ));

        let failed =
            parse_line(r#"PROGRESS:{"type":"item_failed","item":"feeder-8","error":"singular"}"#);
        assert_eq!(
            failed,
            ParsedLine::Message(WorkerMessage::ItemFailed {
                item: "feeder-8".to_string(),
                error: "singular".to_string(),
            })
        );
    }

    #[test]
    fn tolerates_carriage_return_and_leading_space() {
        let parsed = parse_line("  PROGRESS:{\"type\":\"progress\",\"percent\":1}\r");
        assert!(matches!(parsed, ParsedLine::Message(_)));
    }

    #[test]
    fn explicit_version_one_is_accepted() {
        let parsed = parse_line(r#"PROGRESS:{"v":1,"type":"progress","percent":100}"#);
        assert!(matches!(parsed, ParsedLine::Message(_)));
    }

    #[test]
    fn other_versions_are_malformed() {
        let parsed = parse_line(r#"PROGRESS:{"v":2,"type":"progress","percent":10}"#);
        assert!(matches!(parsed, ParsedLine::Malformed(reason) if reason.contains("version")));
    }

    #[test]
    fn bad_json_is_malformed() {
        assert!(matches!(parse_line("PROGRESS:{not json"), ParsedLine::Malformed(_)));
        assert!(matches!(parse_line("PROGRESS:[1,2]"), ParsedLine::Malformed(_)));
    }

    #[test]
    fn unknown_type_is_malformed() {
        let parsed = parse_line(r#"PROGRESS:{"type":"result","data":{}}"#);
        assert!(matches!(parsed, ParsedLine::Malformed(_)));
    }

    #[test]
    fn out_of_range_percent_is_malformed() {
        assert!(matches!(
            parse_line(r#"PROGRESS:{"type":"progress","percent":140}"#),
            ParsedLine::Malformed(_)
        ));
        assert!(matches!(
            parse_line(r#"PROGRESS:{"type":"progress","percent":-1}"#),
            ParsedLine::Malformed(_)
        ));
    }
}
