//! ReviewerGate: evidence check, test suite, then the reviewer's verdict.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use super::evidence::ChangeEvidence;
use super::suite::{SuiteOutcome, TestSuite};
use crate::agent::{CapabilityPolicy, SubagentError, SubagentIdentity, SubagentResult, SubagentRunner};
use crate::domain::Verdict;
use crate::prompt::{PromptRenderer, templates};

/// `approve {summary: string, confirmed: [integer]}`, served by `telos reviewer-mcp`
pub const APPROVE_TOOL: &str = "mcp__reviewer__approve";
/// `deny {reason: string}`
pub const DENY_TOOL: &str = "mcp__reviewer__deny";

/// Reviewer output that cannot be read as exactly one verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("reviewer recorded no verdict")]
    NoVerdict,

    #[error("reviewer recorded both an approval and a denial")]
    BothVerdicts,

    #[error("reviewer recorded {0} verdicts instead of one")]
    MultipleVerdicts(usize),

    #[error("reviewer verdict has an empty {0}")]
    EmptyJustification(&'static str),

    #[error("reviewer approval has a malformed 'confirmed' list")]
    MalformedConfirmation,

    #[error("{0}")]
    Capability(String),
}

/// Read the reviewer's verdict out of its tool calls.
///
/// `criteria` are the acceptance criteria the reviewer was given, numbered
/// from 1; an approval must confirm every one of them.
pub fn interpret(result: &SubagentResult, criteria: &[String]) -> Result<Verdict, ProtocolViolation> {
    if let Some(SubagentError::CapabilityViolation { .. }) = &result.error {
        return Err(ProtocolViolation::Capability(result.error_message().unwrap_or_default()));
    }

    let approvals: Vec<_> = result.tool_calls.iter().filter(|c| c.name == APPROVE_TOOL).collect();
    let denials: Vec<_> = result.tool_calls.iter().filter(|c| c.name == DENY_TOOL).collect();

    match (approvals.len(), denials.len()) {
        (0, 0) => Err(ProtocolViolation::NoVerdict),
        (a, d) if a > 0 && d > 0 => Err(ProtocolViolation::BothVerdicts),
        (1, 0) => {
            let call = approvals[0];
            let summary = call.input_str("summary").map(str::trim).unwrap_or("");
            if summary.is_empty() {
                return Err(ProtocolViolation::EmptyJustification("summary"));
            }
            let confirmed = confirmed_numbers(&call.input)?;
            let missing: Vec<String> = criteria
                .iter()
                .enumerate()
                .filter(|(i, _)| !confirmed.contains(&(i + 1)))
                .map(|(i, text)| format!("{} ({})", i + 1, text))
                .collect();
            if missing.is_empty() {
                Ok(Verdict::approved(summary))
            } else {
                Ok(Verdict::denied(format!(
                    "reviewer did not independently confirm criteria {}; reviewer summary: {}",
                    missing.join(", "),
                    summary
                )))
            }
        }
        (0, 1) => {
            let reason = denials[0].input_str("reason").map(str::trim).unwrap_or("");
            if reason.is_empty() {
                return Err(ProtocolViolation::EmptyJustification("reason"));
            }
            Ok(Verdict::denied(reason))
        }
        (a, d) => Err(ProtocolViolation::MultipleVerdicts(a + d)),
    }
}

fn confirmed_numbers(input: &serde_json::Value) -> Result<BTreeSet<usize>, ProtocolViolation> {
    let Some(value) = input.get("confirmed") else {
        return Ok(BTreeSet::new());
    };
    let items = value.as_array().ok_or(ProtocolViolation::MalformedConfirmation)?;
    items
        .iter()
        .map(|v| {
            v.as_u64()
                .map(|n| n as usize)
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or(ProtocolViolation::MalformedConfirmation)
        })
        .collect()
}

#[derive(Serialize)]
struct NumberedCriterion<'a> {
    number: usize,
    text: &'a str,
}

#[derive(Serialize)]
struct ReviewContext<'a> {
    task: &'a str,
    item_ref: &'a str,
    criteria: Vec<NumberedCriterion<'a>>,
    evidence: String,
    tests: String,
}

/// What is being reviewed, for the reviewer's prompt.
#[derive(Debug, Clone)]
pub struct ReviewSubject {
    pub task: String,
    pub item_ref: String,
}

pub struct ReviewerGate {
    runner: SubagentRunner,
    policy: CapabilityPolicy,
    suite: TestSuite,
    renderer: Arc<PromptRenderer>,
    project_dir: PathBuf,
}

impl ReviewerGate {
    pub fn new(
        runner: SubagentRunner,
        policy: CapabilityPolicy,
        suite: TestSuite,
        renderer: Arc<PromptRenderer>,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            policy,
            suite,
            renderer,
            project_dir: project_dir.into(),
        }
    }

    /// Always produces exactly one verdict. Any failed check denies.
    pub async fn review(&self, subject: &ReviewSubject, evidence: &ChangeEvidence, criteria: &[String]) -> Verdict {
        if evidence.is_empty() {
            return Verdict::denied(
                "no change evidence: no files were written and the working tree is unchanged, so nothing can be verified",
            );
        }

        let tests = self.suite.run(&self.project_dir).await;
        if let SuiteOutcome::Failed { summary } = &tests {
            return Verdict::denied(format!("test suite failed: {}", summary));
        }

        let context = ReviewContext {
            task: &subject.task,
            item_ref: &subject.item_ref,
            criteria: criteria
                .iter()
                .enumerate()
                .map(|(i, text)| NumberedCriterion { number: i + 1, text })
                .collect(),
            evidence: evidence.describe(),
            tests: tests.describe(),
        };
        let prompt = match self.renderer.render(templates::REVIEW, &context) {
            Ok(p) => p,
            Err(e) => return Verdict::denied(format!("infrastructure failure: {}", e)),
        };

        let result = self.runner.invoke(SubagentIdentity::Reviewer, &prompt, &self.policy).await;
        if let Some(err) = result.error.as_ref().filter(|e| e.is_infrastructure()) {
            return Verdict::denied(format!("infrastructure failure: reviewer could not run: {}", err));
        }

        match interpret(&result, criteria) {
            Ok(verdict) => verdict,
            Err(violation) => {
                log::warn!("Reviewer protocol violation: {}", violation);
                Verdict::denied(format!("protocol violation: {}", violation))
            }
        }
    }
}
