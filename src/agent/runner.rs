//! SubagentRunner: one delegated task under an enforced capability policy.

use std::path::PathBuf;
use std::sync::Arc;

use super::identity::SubagentIdentity;
use super::policy::CapabilityPolicy;
use super::runtime::{AgentRequest, AgentRuntime, RuntimeError, ToolCall};

/// Why an invocation did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum SubagentError {
    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    #[error("capability violation: {identity} called disallowed tool(s): {}", tools.join(", "))]
    CapabilityViolation { identity: SubagentIdentity, tools: Vec<String> },

    #[error("policy for {policy} cannot be used to run {identity}")]
    PolicyMismatch { identity: SubagentIdentity, policy: SubagentIdentity },

    #[error("subagent reported failure: {0}")]
    Reported(String),
}

impl SubagentError {
    /// Runtime could not do its job at all (as opposed to misbehaving).
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, SubagentError::Runtime(_))
    }
}

/// Outcome of one invocation.
#[derive(Debug)]
pub struct SubagentResult {
    pub identity: SubagentIdentity,
    pub success: bool,
    pub output: String,
    pub artifacts: Vec<PathBuf>,
    pub tool_calls: Vec<ToolCall>,
    pub error: Option<SubagentError>,
}

impl SubagentResult {
    fn failed(identity: SubagentIdentity, error: SubagentError) -> Self {
        Self {
            identity,
            success: false,
            output: String::new(),
            artifacts: Vec::new(),
            tool_calls: Vec::new(),
            error: Some(error),
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

/// Role brief handed to the runtime as the system prompt.
pub fn role_prompt(identity: SubagentIdentity) -> &'static str {
    match identity {
        SubagentIdentity::Coder => {
            "You are the coder subagent. Implement exactly the one task you are given and nothing else.\n\
             Before you finish, run the project's tests, linter and type checker and fix every failure; \
             do not report success while anything is red.\n\
             If you learn something future iterations must know, end your reply with lines of the form \
             `CONVENTION: ...`, `GOTCHA: ...`, `PATTERN: ...` or `DECISION: ...`."
        }
        SubagentIdentity::Reviewer => {
            "You are the reviewer subagent. You never modify files.\n\
             Independently verify every numbered acceptance criterion against the working tree; a claim \
             in the coder's summary is not evidence.\n\
             Record exactly one verdict: call `approve` with a summary and the list of criterion numbers \
             you confirmed, or call `deny` with a reason specific enough to act on without follow-up."
        }
        SubagentIdentity::Crm => {
            "You are the CRM subagent. Perform the requested CRM operations with the CRM tools only and \
             report what was created or changed."
        }
        SubagentIdentity::Marketing => {
            "You are the marketing subagent. Produce the requested marketing material with the marketing \
             tools and write any files into the project."
        }
        SubagentIdentity::ImageGenerator => {
            "You are the image-generator subagent. Generate the requested assets and save them into the \
             project, reporting each file path."
        }
        SubagentIdentity::Planner => {
            "You are the planner subagent. Read the provided material and write the requested planning \
             documents. Do not write application code."
        }
    }
}

/// Executes delegated tasks through an [`AgentRuntime`].
#[derive(Clone)]
pub struct SubagentRunner {
    runtime: Arc<dyn AgentRuntime>,
    working_dir: PathBuf,
    model: Option<String>,
}

impl SubagentRunner {
    pub fn new(runtime: Arc<dyn AgentRuntime>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            working_dir: working_dir.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Run one task. Never errors: failures come back in the result.
    ///
    /// The transcript is audited against `policy`; any call outside it makes
    /// the result unsuccessful whatever the runtime reported.
    pub async fn invoke(&self, identity: SubagentIdentity, instructions: &str, policy: &CapabilityPolicy) -> SubagentResult {
        if policy.identity() != identity {
            return SubagentResult::failed(
                identity,
                SubagentError::PolicyMismatch {
                    identity,
                    policy: policy.identity(),
                },
            );
        }

        let request = AgentRequest {
            identity,
            system_prompt: role_prompt(identity).to_string(),
            instructions: instructions.to_string(),
            policy: policy.clone(),
            model: self.model.clone(),
            working_dir: self.working_dir.clone(),
        };

        let transcript = match self.runtime.run(request).await {
            Ok(t) => t,
            Err(e) => {
                log::warn!("{} invocation failed: {}", identity, e);
                return SubagentResult::failed(identity, e.into());
            }
        };

        let violations: Vec<String> = transcript
            .tool_calls
            .iter()
            .filter(|call| call.refused || !policy.authorize(&call.name))
            .map(|call| call.name.clone())
            .collect();

        let error = if !violations.is_empty() {
            log::warn!("{} attempted disallowed tools: {:?}", identity, violations);
            Some(SubagentError::CapabilityViolation {
                identity,
                tools: violations,
            })
        } else if !transcript.success {
            Some(SubagentError::Reported(
                transcript.error.clone().unwrap_or_else(|| "no detail".to_string()),
            ))
        } else {
            None
        };

        log::debug!(
            "{} finished: {} tool call(s), {} artifact(s)",
            identity,
            transcript.tool_calls.len(),
            transcript.artifacts.len()
        );

        SubagentResult {
            identity,
            success: error.is_none(),
            output: transcript.output,
            artifacts: transcript.artifacts,
            tool_calls: transcript.tool_calls,
            error,
        }
    }
}
