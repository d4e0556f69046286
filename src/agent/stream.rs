//! Parsing for the agent CLI's `stream-json` output.
//!
//! The CLI emits one JSON object per line: a `system` init event,
//! `assistant` messages carrying text and `tool_use` blocks, `user`
//! messages carrying `tool_result` blocks, and a final `result` event.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

use super::runtime::{AgentTranscript, RuntimeError, ToolCall};

/// Tools whose `file_path` input is an artifact.
const ARTIFACT_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    System {
        #[serde(default)]
        subtype: Option<String>,
    },
    Assistant {
        message: StreamMessage,
    },
    User {
        message: StreamMessage,
    },
    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        result: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessage {
    #[serde(default)]
    pub content: Vec<StreamBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        content: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

/// Accumulates a transcript from stream events.
#[derive(Debug, Default)]
pub struct TranscriptBuilder {
    text: Vec<String>,
    tool_calls: Vec<ToolCall>,
    artifacts: Vec<PathBuf>,
    seen_artifacts: HashSet<PathBuf>,
    result: Option<(bool, Option<String>, Option<String>)>,
    skipped: usize,
}

impl TranscriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one NDJSON line. Blank and unparseable lines are skipped.
    pub fn push_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<StreamEvent>(line) {
            Ok(event) => self.push_event(event),
            Err(e) => {
                log::debug!("Skipping unparseable stream line ({}): {}", e, line);
                self.skipped += 1;
            }
        }
    }

    pub fn push_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Assistant { message } => {
                for block in message.content {
                    match block {
                        StreamBlock::Text { text } => self.text.push(text),
                        StreamBlock::ToolUse { id, name, input } => self.record_tool_use(id, name, input),
                        _ => {}
                    }
                }
            }
            StreamEvent::User { message } => {
                for block in message.content {
                    if let StreamBlock::ToolResult { tool_use_id, is_error: true, content } = block {
                        log::debug!("Tool call {} returned an error: {}", tool_use_id, content);
                    }
                }
            }
            StreamEvent::Result { subtype, is_error, result } => {
                self.result = Some((is_error, subtype, result));
            }
            StreamEvent::System { .. } | StreamEvent::Other => {}
        }
    }

    fn record_tool_use(&mut self, id: String, name: String, input: serde_json::Value) {
        log::debug!("tool_use {} {}: {}", id, name, input);
        if ARTIFACT_TOOLS.contains(&name.as_str()) {
            if let Some(path) = input.get("file_path").and_then(|v| v.as_str()) {
                let path = PathBuf::from(path);
                if self.seen_artifacts.insert(path.clone()) {
                    self.artifacts.push(path);
                }
            }
        }
        self.tool_calls.push(ToolCall {
            id,
            name,
            input,
            refused: false,
        });
    }

    /// Finish. A stream without a `result` event is an error.
    pub fn finish(self) -> Result<AgentTranscript, RuntimeError> {
        let Some((is_error, subtype, result)) = self.result else {
            return Err(RuntimeError::Stream(format!(
                "stream ended without a result event ({} unparseable line(s))",
                self.skipped
            )));
        };

        let output = result.unwrap_or_else(|| self.text.join("\n"));
        let error = if is_error {
            Some(subtype.unwrap_or_else(|| "error".to_string()))
        } else {
            None
        };

        Ok(AgentTranscript {
            success: !is_error,
            output,
            tool_calls: self.tool_calls,
            artifacts: self.artifacts,
            error,
        })
    }
}

/// Parse a complete NDJSON stream.
pub fn parse_stream(text: &str) -> Result<AgentTranscript, RuntimeError> {
    let mut builder = TranscriptBuilder::new();
    for line in text.lines() {
        builder.push_line(line);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = r#"{"type":"system","subtype":"init","session_id":"s1"}
{"type":"assistant","message":{"content":[{"type":"text","text":"Writing the schema."},{"type":"tool_use","id":"t1","name":"Write","input":{"file_path":"db/schema.sql","content":"create table x();"}}]}}
{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"ok","is_error":false}]}}
{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t2","name":"Edit","input":{"file_path":"db/schema.sql"}},{"type":"tool_use","id":"t3","name":"Bash","input":{"command":"make test"}}]}}
not json at all
{"type":"result","subtype":"success","is_error":false,"result":"Schema created.\nGOTCHA: sqlite has no enums"}
"#;

    #[test]
    fn test_parse_stream_collects_calls_and_artifacts() {
        let t = parse_stream(STREAM).unwrap();
        assert!(t.success);
        assert_eq!(t.output, "Schema created.\nGOTCHA: sqlite has no enums");
        let names: Vec<&str> = t.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Write", "Edit", "Bash"]);
        assert_eq!(t.artifacts, vec![PathBuf::from("db/schema.sql")]);
    }

    #[test]
    fn test_error_result() {
        let t = parse_stream(r#"{"type":"result","subtype":"error_max_turns","is_error":true}"#).unwrap();
        assert!(!t.success);
        assert_eq!(t.error.as_deref(), Some("error_max_turns"));
    }

    #[test]
    fn test_missing_result_is_stream_error() {
        let err = parse_stream(r#"{"type":"assistant","message":{"content":[]}}"#).unwrap_err();
        assert!(matches!(err, RuntimeError::Stream(_)));
    }

    #[test]
    fn test_unknown_event_types_ignored() {
        let text = "{\"type\":\"rate_limit\"}\n{\"type\":\"result\",\"is_error\":false,\"result\":\"x\"}\n";
        assert_eq!(parse_stream(text).unwrap().output, "x");
    }
}
