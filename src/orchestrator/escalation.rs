//! Strategy selection after repeated denials.

use crate::domain::ItemRef;

/// What the strategy sees before a delegation is built.
#[derive(Debug, Clone)]
pub struct EscalationContext<'a> {
    pub item: &'a ItemRef,
    pub task: &'a str,
    /// Consecutive denials at the tail of the progress log
    pub denial_streak: u32,
    pub last_denial: Option<&'a str>,
}

/// How the next delegation should differ from the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyDecision {
    Standard,
    Escalate { directive: String, full_knowledge: bool },
    /// Stop retrying and ask a human
    Handoff { reason: String },
}

impl StrategyDecision {
    pub fn label(&self) -> &'static str {
        match self {
            StrategyDecision::Standard => "standard",
            StrategyDecision::Escalate { .. } => "escalate",
            StrategyDecision::Handoff { .. } => "handoff",
        }
    }
}

pub trait EscalationStrategy: Send + Sync {
    fn decide(&self, ctx: &EscalationContext<'_>) -> StrategyDecision;
}

/// Ask for a fundamentally different approach once the streak reaches
/// `threshold`; hand off once it reaches `handoff_after`.
#[derive(Debug, Clone)]
pub struct RewriteStrategy {
    threshold: u32,
    handoff_after: Option<u32>,
}

impl RewriteStrategy {
    pub fn new(threshold: u32, handoff_after: Option<u32>) -> Self {
        Self { threshold, handoff_after }
    }
}

/// Directive text for an escalated delegation.
pub fn rewrite_directive(streak: u32, last_denial: Option<&str>) -> String {
    let mut out = format!("The reviewer has denied the last {} iterations.\n", streak);
    if let Some(reason) = last_denial {
        out.push_str("\nMost recent denial reason:\n");
        out.push_str(&quote(reason));
        out.push('\n');
    }
    out.push_str(
        "\nYour previous approach is NOT working. Try a fundamentally different strategy:\n\
         - Re-read the denial reason carefully and address it literally, not approximately\n\
         - Reduce scope: fix ONLY what was denied before attempting anything else\n\
         - Simplify: if the implementation is complex, try a simpler approach\n\
         - Check the Gotchas in the project knowledge for approaches that have already failed\n",
    );
    out
}

/// Markdown blockquote.
pub fn quote(text: &str) -> String {
    text.lines()
        .map(|l| if l.is_empty() { ">".to_string() } else { format!("> {}", l) })
        .collect::<Vec<_>>()
        .join("\n")
}

impl EscalationStrategy for RewriteStrategy {
    fn decide(&self, ctx: &EscalationContext<'_>) -> StrategyDecision {
        if let Some(limit) = self.handoff_after {
            if ctx.denial_streak >= limit {
                return StrategyDecision::Handoff {
                    reason: format!(
                        "{} was denied {} times in a row; last reason: {}",
                        ctx.item,
                        ctx.denial_streak,
                        ctx.last_denial.unwrap_or("none recorded")
                    ),
                };
            }
        }
        if ctx.denial_streak >= self.threshold {
            return StrategyDecision::Escalate {
                directive: rewrite_directive(ctx.denial_streak, ctx.last_denial),
                full_knowledge: true,
            };
        }
        StrategyDecision::Standard
    }
}
