//! Delegation instructions for one checklist item.

use serde::Serialize;

use super::escalation::{StrategyDecision, quote};
use crate::agent::SubagentIdentity;
use crate::domain::{ItemRef, KnowledgeBase, KnowledgeCategory, Prd};
use crate::error::Result;
use crate::id::digest;
use crate::prompt::{PromptRenderer, templates};

/// Knowledge every standard delegation carries
const STANDARD_KNOWLEDGE: &[KnowledgeCategory] = &[KnowledgeCategory::Conventions, KnowledgeCategory::Gotchas];

/// Inputs for one delegation.
pub struct DelegationInput<'a> {
    pub prd: &'a Prd,
    pub item: &'a ItemRef,
    pub task: &'a str,
    pub identity: SubagentIdentity,
    pub knowledge: &'a KnowledgeBase,
    /// Verbatim reason of the denial being addressed
    pub prior_denial: Option<&'a str>,
    pub decision: &'a StrategyDecision,
    pub denial_streak: u32,
}

/// Rendered instructions plus what the reviewer will check them against.
#[derive(Debug, Clone)]
pub struct Delegation {
    pub identity: SubagentIdentity,
    pub task: String,
    pub instructions: String,
    pub criteria: Vec<String>,
    /// sha256 of `instructions`
    pub digest: String,
}

#[derive(Serialize)]
struct Criterion<'a> {
    number: usize,
    text: &'a str,
}

#[derive(Serialize)]
struct DelegationContext<'a> {
    task: &'a str,
    item_ref: String,
    identity: &'a str,
    excerpt: String,
    criteria: Vec<Criterion<'a>>,
    knowledge: String,
    prior_denial: Option<String>,
    escalation: Option<&'a str>,
    denial_streak: u32,
    self_verify: bool,
}

pub fn build_delegation(renderer: &PromptRenderer, input: &DelegationInput<'_>) -> Result<Delegation> {
    let criteria = input.prd.acceptance_criteria(input.item.index);

    let (escalation, categories): (Option<&str>, &[KnowledgeCategory]) = match input.decision {
        StrategyDecision::Escalate { directive, full_knowledge } => (
            Some(directive.as_str()),
            if *full_knowledge { &KnowledgeCategory::ALL[..] } else { STANDARD_KNOWLEDGE },
        ),
        _ => (None, STANDARD_KNOWLEDGE),
    };

    let context = DelegationContext {
        task: input.task,
        item_ref: input.item.to_string(),
        identity: input.identity.as_str(),
        excerpt: input.prd.excerpt(input.item.index),
        criteria: criteria
            .iter()
            .enumerate()
            .map(|(i, text)| Criterion { number: i + 1, text })
            .collect(),
        knowledge: input.knowledge.render(categories),
        prior_denial: input.prior_denial.map(quote),
        escalation,
        denial_streak: input.denial_streak,
        self_verify: input.identity == SubagentIdentity::Coder,
    };

    let instructions = renderer.render(templates::DELEGATION, &context)?;
    Ok(Delegation {
        identity: input.identity,
        task: input.task.to_string(),
        digest: digest(&instructions),
        instructions,
        criteria,
    })
}
