//! Orchestrator: selects one checklist item per iteration, delegates it,
//! has it reviewed, and records the outcome.
//!
//! The orchestrator never implements anything itself. Each `step` reads the
//! store afresh, so the files on disk are the only state that survives an
//! iteration (apart from the digest of the last denied delegation).

mod category;
mod delegation;
mod escalation;
mod select;

pub use category::{categorize, task_text};
pub use delegation::{Delegation, DelegationInput, build_delegation};
pub use escalation::{EscalationContext, EscalationStrategy, RewriteStrategy, StrategyDecision, rewrite_directive};
pub use select::{Selection, SelectionReason, select_next};

use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::{AgentRuntime, PolicySet, SubagentIdentity, SubagentResult, SubagentRunner};
use crate::config::Config;
use crate::domain::{
    BuildRunState, ItemRef, KnowledgeCategory, KnowledgeEntry, ProgressEntry, Verdict, extract_learnings,
};
use crate::error::{Result, TelosError};
use crate::prompt::PromptRenderer;
use crate::review::{ChangeEvidence, ReviewSubject, ReviewerGate, TestSuite, TreeSnapshot};
use crate::store::BuildStore;

/// Longest denial reason copied into a gotcha entry
const GOTCHA_REASON_MAX: usize = 240;

/// What one iteration did.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Iteration number written to the progress log
    pub iteration: u32,
    pub item: ItemRef,
    pub task: String,
    pub identity: SubagentIdentity,
    pub strategy: &'static str,
    pub verdict: Verdict,
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub all_items_done: bool,
    /// `None` only when there was nothing left to select
    pub record: Option<StepRecord>,
    /// Set when the escalation strategy asked for a human
    pub handoff: Option<String>,
    pub items_done: usize,
    pub items_total: usize,
}

/// Told which item an iteration is about to work, before any subagent runs.
pub trait StepObserver: Send + Sync {
    fn item_selected(&self, iteration: u32, item: &ItemRef, task: &str);
}

/// Knobs that do not belong to any collaborator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub project_dir: PathBuf,
    pub escalation_threshold: u32,
    /// Project-relative paths owned by the loop, excluded from change evidence
    pub evidence_ignore: Vec<PathBuf>,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config, project_dir: impl Into<PathBuf>) -> Self {
        let b = &config.build;
        Self {
            project_dir: project_dir.into(),
            escalation_threshold: b.escalation_threshold,
            evidence_ignore: vec![
                b.prds_dir.clone(),
                b.progress_file.clone(),
                b.knowledge_file.clone(),
                PathBuf::from(".telos"),
                PathBuf::from("verdict.json"),
            ],
        }
    }
}

pub struct Orchestrator<S: BuildStore> {
    store: S,
    runner: SubagentRunner,
    gate: ReviewerGate,
    policies: PolicySet,
    strategy: Box<dyn EscalationStrategy>,
    renderer: Arc<PromptRenderer>,
    settings: OrchestratorSettings,
    last_denied: Option<(ItemRef, String)>,
    observer: Option<Arc<dyn StepObserver>>,
}

impl<S: BuildStore> Orchestrator<S> {
    pub fn new(
        store: S,
        runner: SubagentRunner,
        gate: ReviewerGate,
        policies: PolicySet,
        strategy: Box<dyn EscalationStrategy>,
        renderer: Arc<PromptRenderer>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            runner,
            gate,
            policies,
            strategy,
            renderer,
            settings,
            last_denied: None,
            observer: None,
        }
    }

    /// Wire everything from configuration around one runtime.
    pub fn from_config(store: S, runtime: Arc<dyn AgentRuntime>, config: &Config, project_dir: impl Into<PathBuf>) -> Result<Self> {
        let settings = OrchestratorSettings::from_config(config, project_dir);
        let policies = config.policy_set()?;
        let renderer = Arc::new(PromptRenderer::new()?);
        let runner = SubagentRunner::new(runtime, &settings.project_dir).with_model(config.agent.model.clone());
        let gate = ReviewerGate::new(
            runner.clone(),
            policies.get(SubagentIdentity::Reviewer),
            TestSuite::from_config(&config.review),
            Arc::clone(&renderer),
            &settings.project_dir,
        );
        let strategy = Box::new(RewriteStrategy::new(
            config.build.escalation_threshold,
            config.build.handoff_after,
        ));
        Ok(Self::new(store, runner, gate, policies, strategy, renderer, settings))
    }

    pub fn with_strategy(mut self, strategy: Box<dyn EscalationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replace the observer notified on each selection.
    pub fn observe(&mut self, observer: Arc<dyn StepObserver>) {
        self.observer = Some(observer);
    }

    /// Check items the log approved but the PRD files still show open.
    pub fn reconcile(&mut self) -> Result<()> {
        let prds = self.store.prds()?;
        let log = self.store.progress()?;
        let stale: Vec<ItemRef> = log
            .approved_items()
            .filter(|item| matches!(prds.item(item), Some((_, i)) if !i.done))
            .cloned()
            .collect();
        for item in stale {
            log::warn!("{} was approved but is unchecked; checking it", item);
            self.store.mark_done(&item)?;
        }
        Ok(())
    }

    /// One iteration: select, delegate, review, record.
    pub async fn step(&mut self, state: &BuildRunState) -> Result<StepOutcome> {
        self.reconcile()?;

        let mut prds = self.store.prds()?;
        let log = self.store.progress()?;
        let knowledge = self.store.knowledge()?;

        let Some(selection) = select_next(&prds, &log) else {
            let (done, total) = prds.counts();
            return Ok(StepOutcome {
                all_items_done: true,
                record: None,
                handoff: None,
                items_done: done,
                items_total: total,
            });
        };

        let item_ref = selection.item;
        let (prd, item) = prds
            .item(&item_ref)
            .ok_or_else(|| TelosError::InvalidState(format!("selected {} does not exist", item_ref)))?;
        let prd = prd.clone();
        let task = task_text(item).to_string();
        let identity = categorize(&prd, item).subagent();

        let streak = log.denial_streak();
        let prior_denial = match selection.reason {
            SelectionReason::AddressDenial => log.pending_denial().map(|e| e.details.clone()),
            SelectionReason::NextOpen => None,
        };

        let mut decision = self.strategy.decide(&EscalationContext {
            item: &item_ref,
            task: &task,
            denial_streak: streak,
            last_denial: prior_denial.as_deref(),
        });

        log::info!(
            "Iteration {}: {} \"{}\" -> {} [{}]",
            state.iteration,
            item_ref,
            task,
            identity,
            decision.label()
        );
        if let Some(observer) = &self.observer {
            observer.item_selected(state.iteration, &item_ref, &task);
        }

        if let StrategyDecision::Handoff { reason } = &decision {
            let reason = reason.clone();
            let verdict = Verdict::denied(format!("handed off for human intervention: {}", reason));
            let entry = ProgressEntry::new(log.next_iteration(), item_ref.clone(), &task, verdict.kind(), verdict.justification())
                .with_handoff();
            let record = self.record(entry, identity, decision.label(), verdict)?;
            let (done, total) = prds.counts();
            return Ok(StepOutcome {
                all_items_done: false,
                record: Some(record),
                handoff: Some(reason),
                items_done: done,
                items_total: total,
            });
        }

        let build = |decision: &StrategyDecision| {
            build_delegation(
                &self.renderer,
                &DelegationInput {
                    prd: &prd,
                    item: &item_ref,
                    task: &task,
                    identity,
                    knowledge: &knowledge,
                    prior_denial: prior_denial.as_deref(),
                    decision,
                    denial_streak: streak,
                },
            )
        };

        let mut delegation = build(&decision)?;
        if streak >= self.settings.escalation_threshold && self.repeats_last_denied(&item_ref, &delegation.digest) {
            log::warn!("Delegation for {} would repeat a denied instruction; escalating", item_ref);
            decision = StrategyDecision::Escalate {
                directive: rewrite_directive(streak, prior_denial.as_deref()),
                full_knowledge: true,
            };
            delegation = build(&decision)?;
        }

        let policy = self.policies.get(identity);
        let baseline = TreeSnapshot::capture(&self.settings.project_dir, &self.settings.evidence_ignore).await;
        let result = self.runner.invoke(identity, &delegation.instructions, &policy).await;

        let verdict = if result.success {
            let evidence = ChangeEvidence::gather(
                &self.settings.project_dir,
                &baseline,
                &result,
                &self.settings.evidence_ignore,
            )
            .await;
            let subject = ReviewSubject {
                task: task.clone(),
                item_ref: item_ref.to_string(),
            };
            self.gate.review(&subject, &evidence, &delegation.criteria).await
        } else {
            failure_verdict(&result)
        };

        log::info!("Iteration {}: {} {}", state.iteration, item_ref, verdict.kind());

        let entry = ProgressEntry::new(log.next_iteration(), item_ref.clone(), &task, verdict.kind(), verdict.justification());
        let record = self.record(entry, identity, decision.label(), verdict.clone())?;

        match &verdict {
            Verdict::Approved { .. } => {
                self.last_denied = None;
                self.store.mark_done(&item_ref)?;
                prds.mark_done(&item_ref)?;
                for learning in extract_learnings(&result.output) {
                    if self.store.append_knowledge(&learning)? {
                        log::info!("Learned {}: {}", learning.category, learning.text);
                    }
                }
            }
            Verdict::Denied { reason } => {
                self.last_denied = Some((item_ref.clone(), delegation.digest.clone()));
                let gotcha = KnowledgeEntry::new(KnowledgeCategory::Gotchas, gotcha_text(&task, reason));
                self.store.append_knowledge(&gotcha)?;
            }
        }

        let (done, total) = prds.counts();
        Ok(StepOutcome {
            all_items_done: prds.all_done(),
            record: Some(record),
            handoff: None,
            items_done: done,
            items_total: total,
        })
    }

    fn repeats_last_denied(&self, item: &ItemRef, digest: &str) -> bool {
        matches!(&self.last_denied, Some((i, d)) if i == item && d == digest)
    }

    fn record(
        &mut self,
        entry: ProgressEntry,
        identity: SubagentIdentity,
        strategy: &'static str,
        verdict: Verdict,
    ) -> Result<StepRecord> {
        let record = StepRecord {
            iteration: entry.iteration,
            item: entry.item.clone(),
            task: entry.task.clone(),
            identity,
            strategy,
            verdict,
        };
        self.store.append_progress(entry)?;
        Ok(record)
    }
}

/// Synthetic denial for an invocation that did not succeed.
fn failure_verdict(result: &SubagentResult) -> Verdict {
    use crate::agent::SubagentError;
    let reason = match &result.error {
        Some(e @ SubagentError::Runtime(_)) => format!("infrastructure failure: {} could not run: {}", result.identity, e),
        Some(e @ SubagentError::CapabilityViolation { .. }) => format!("protocol violation: {}", e),
        Some(e @ SubagentError::PolicyMismatch { .. }) => format!("infrastructure failure: {}", e),
        Some(SubagentError::Reported(msg)) => format!("{} reported failure: {}", result.identity, msg),
        None => format!("{} reported failure without a message", result.identity),
    };
    Verdict::denied(reason)
}

/// One-line gotcha summarizing a denial.
fn gotcha_text(task: &str, reason: &str) -> String {
    let first = reason.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("denied");
    let mut text = format!("{}: {}", task, first);
    if text.len() > GOTCHA_REASON_MAX {
        let mut end = GOTCHA_REASON_MAX;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("...");
    }
    text
}
