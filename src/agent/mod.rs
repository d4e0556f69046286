//! Subagents: identities, capability policies and the runtime that executes them.

mod cli;
mod identity;
mod mcp;
pub mod mock;
mod policy;
mod runner;
mod runtime;
mod stream;

pub use cli::ClaudeCliRuntime;
pub use identity::{SubagentIdentity, TaskCategory};
pub use mcp::{mcp_config_for, write_mcp_config};
pub use policy::{CapabilityPolicy, PolicySet};
pub use runner::{SubagentError, SubagentResult, SubagentRunner, role_prompt};
pub use runtime::{AgentRequest, AgentRuntime, AgentTranscript, RuntimeError, ToolCall};
pub use stream::{StreamEvent, TranscriptBuilder, parse_stream};
