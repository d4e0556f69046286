//! RalphLoop - drives the orchestrator one fresh iteration at a time until
//! every checklist item is approved, the budget is spent, or the run fails.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use super::status::{CurrentItem, StatusPublisher, StatusSnapshot};
use crate::domain::{BuildRunState, FailureReason, RunStatus, Verdict};
use crate::error::Result;
use crate::orchestrator::{Orchestrator, StepRecord};
use crate::store::BuildStore;

/// Printed, and carried in the report, only by a completed run
pub const COMPLETION_SIGNAL: &str = "<promise>COMPLETE</promise>";

/// Final account of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub build_id: String,
    pub status: RunStatus,
    pub iterations: u32,
    pub max_iterations: u32,
    pub items_done: usize,
    pub items_total: usize,
    pub history: Vec<StepRecord>,
    pub completion_signal: Option<&'static str>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn approvals(&self) -> usize {
        self.history.iter().filter(|r| r.verdict.is_approved()).count()
    }
}

pub struct RalphLoop<S: BuildStore> {
    orchestrator: Orchestrator<S>,
    state: BuildRunState,
    build_id: String,
    status: Arc<StatusPublisher>,
    history: Vec<StepRecord>,
    items: (usize, usize),
}

impl<S: BuildStore> RalphLoop<S> {
    pub fn new(mut orchestrator: Orchestrator<S>, max_iterations: u32, build_id: impl Into<String>) -> Self {
        let build_id = build_id.into();
        let state = BuildRunState::new(max_iterations);
        let status = Arc::new(StatusPublisher::new(StatusSnapshot::new(build_id.clone(), &state)));
        orchestrator.observe(Arc::clone(&status) as _);
        Self {
            orchestrator,
            state,
            build_id,
            status,
            history: Vec::new(),
            items: (0, 0),
        }
    }

    /// Also write every snapshot to `path`. Subscribe after this call.
    pub fn with_status_file(mut self, path: impl Into<PathBuf>) -> Self {
        let status = Arc::new(StatusPublisher::new(self.status.latest()).with_file(path));
        self.orchestrator.observe(Arc::clone(&status) as _);
        self.status = status;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn state(&self) -> &BuildRunState {
        &self.state
    }

    pub fn orchestrator(&self) -> &Orchestrator<S> {
        &self.orchestrator
    }

    /// Run to a terminal status.
    ///
    /// Only a failure to record the terminal status itself is returned as
    /// `Err`. State corruption ends the run `Failed` at once; other step
    /// errors cost the iteration and the loop carries on.
    pub async fn run(&mut self) -> Result<RunReport> {
        log::info!(
            "Build {} starting with a budget of {} iterations",
            self.build_id,
            self.state.max_iterations
        );

        if let Some(status) = self.preflight() {
            return self.finish(status);
        }
        self.publish(None);

        loop {
            if self.state.budget_spent() {
                log::warn!(
                    "Iteration budget of {} spent with {}/{} items done",
                    self.state.max_iterations,
                    self.items.0,
                    self.items.1
                );
                return self.finish(RunStatus::Failed(FailureReason::BudgetExhausted));
            }

            let iteration = self.state.begin_iteration()?;
            let outcome = match self.orchestrator.step(&self.state).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal_to_run() => {
                    log::error!("Iteration {} failed: {}", iteration, e);
                    return self.finish(RunStatus::Failed(FailureReason::FatalError(e.to_string())));
                }
                Err(e) => {
                    log::warn!("Iteration {} could not run: {}", iteration, e);
                    self.publish(None);
                    continue;
                }
            };
            self.items = (outcome.items_done, outcome.items_total);

            if let Some(record) = outcome.record {
                self.state.denial_streak = match record.verdict {
                    Verdict::Approved { .. } => 0,
                    Verdict::Denied { .. } => self.state.denial_streak + 1,
                };
                self.publish(Some(&record));
                self.history.push(record);
            }

            if let Some(reason) = outcome.handoff {
                log::warn!("Handing off to a human: {}", reason);
                return self.finish(RunStatus::Failed(FailureReason::HumanInterventionRequired(reason)));
            }
            if outcome.all_items_done {
                return self.finish(RunStatus::Completed);
            }
        }
    }

    /// Terminal status decided before any iteration runs, if any.
    fn preflight(&mut self) -> Option<RunStatus> {
        if let Err(e) = self.orchestrator.reconcile() {
            return Some(RunStatus::Failed(FailureReason::FatalError(e.to_string())));
        }
        let store = self.orchestrator.store();
        let prds = match store.prds() {
            Ok(prds) => prds,
            Err(e) => return Some(RunStatus::Failed(FailureReason::FatalError(e.to_string()))),
        };
        match store.progress() {
            Ok(log) => self.state.denial_streak = log.denial_streak(),
            Err(e) => return Some(RunStatus::Failed(FailureReason::FatalError(e.to_string()))),
        }
        self.items = prds.counts();

        if prds.is_empty() {
            log::error!("No PRDs found");
            return Some(RunStatus::Failed(FailureReason::FatalError("no PRDs found".to_string())));
        }
        if prds.all_done() {
            log::info!("All {} items are already done", self.items.1);
            return Some(RunStatus::Completed);
        }
        None
    }

    fn finish(&mut self, status: RunStatus) -> Result<RunReport> {
        self.state.finish(status)?;
        log::info!(
            "Build {} {} after {} iterations ({}/{} items done)",
            self.build_id,
            self.state.status,
            self.state.iteration,
            self.items.0,
            self.items.1
        );
        self.publish(None);

        let completed = self.state.status == RunStatus::Completed;
        Ok(RunReport {
            build_id: self.build_id.clone(),
            status: self.state.status.clone(),
            iterations: self.state.iteration,
            max_iterations: self.state.max_iterations,
            items_done: self.items.0,
            items_total: self.items.1,
            history: self.history.clone(),
            completion_signal: completed.then_some(COMPLETION_SIGNAL),
        })
    }

    fn publish(&self, record: Option<&StepRecord>) {
        let mut snapshot = self.status.latest();
        snapshot.apply(&self.state);
        snapshot.items_done = self.items.0;
        snapshot.items_total = self.items.1;
        if let Some(record) = record {
            snapshot.current = Some(CurrentItem::new(&record.item, record.task.clone()));
            snapshot.last_verdict = Some(record.verdict.kind());
        }
        self.status.publish(snapshot);
    }
}
