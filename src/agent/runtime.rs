//! Agent runtime interface and the data that crosses it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::identity::SubagentIdentity;
use super::policy::CapabilityPolicy;

/// Capability-scoped task executor. Each call is independent (fresh context).
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn run(&self, request: AgentRequest) -> Result<AgentTranscript, RuntimeError>;
}

/// Everything needed for one subagent invocation
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub identity: SubagentIdentity,

    /// Role brief for the identity
    pub system_prompt: String,

    /// Natural-language task instructions
    pub instructions: String,

    pub policy: CapabilityPolicy,

    pub model: Option<String>,

    pub working_dir: PathBuf,
}

/// A tool call observed in the runtime's transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
    /// Runtime refused to execute it.
    #[serde(default)]
    pub refused: bool,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            input,
            refused: false,
        }
    }

    /// String field from the call's input object.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(|v| v.as_str())
    }
}

/// What came back from one invocation.
#[derive(Debug, Clone, Default)]
pub struct AgentTranscript {
    /// Runtime-reported success
    pub success: bool,

    /// Final free-text result
    pub output: String,

    pub tool_calls: Vec<ToolCall>,

    /// Files the agent wrote or edited
    pub artifacts: Vec<PathBuf>,

    /// Runtime-reported error text when `success` is false
    pub error: Option<String>,
}

impl AgentTranscript {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifacts.push(path.into());
        self
    }
}

/// Infrastructure failures of the runtime itself.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Agent runtime unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to spawn agent runtime: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Agent runtime timed out after {0:?}")]
    Timeout(Duration),

    #[error("Agent runtime exited with code {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("Unreadable agent output: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RuntimeError::Timeout(_))
    }
}
