//! Status snapshots for pollers: a JSON file plus an in-process watch channel.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::domain::{BuildRunState, FailureReason, ItemRef, RunStatus, VerdictKind};
use crate::error::Result;
use crate::orchestrator::StepObserver;

/// Item the loop is working on, or last worked on once the run ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentItem {
    pub prd: String,
    /// 1-based, as shown in progress.txt
    pub item_index: usize,
    pub task: String,
}

impl CurrentItem {
    pub fn new(item: &ItemRef, task: impl Into<String>) -> Self {
        Self {
            prd: item.prd.to_string(),
            item_index: item.number(),
            task: task.into(),
        }
    }
}

/// State of a build: counters as of the last completed iteration plus the
/// item currently in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub build_id: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub status: String,
    pub failure: Option<FailureReason>,
    pub current: Option<CurrentItem>,
    pub last_verdict: Option<VerdictKind>,
    pub denial_streak: u32,
    pub items_done: usize,
    pub items_total: usize,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn new(build_id: impl Into<String>, state: &BuildRunState) -> Self {
        let mut snapshot = Self {
            build_id: build_id.into(),
            iteration: 0,
            max_iterations: state.max_iterations,
            status: String::new(),
            failure: None,
            current: None,
            last_verdict: None,
            denial_streak: 0,
            items_done: 0,
            items_total: 0,
            updated_at: Utc::now(),
        };
        snapshot.apply(state);
        snapshot
    }

    /// Copy counters and status from the run state.
    pub fn apply(&mut self, state: &BuildRunState) {
        self.iteration = state.iteration;
        self.max_iterations = state.max_iterations;
        self.denial_streak = state.denial_streak;
        self.status = match &state.status {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed(_) => "failed",
        }
        .to_string();
        self.failure = match &state.status {
            RunStatus::Failed(reason) => Some(reason.clone()),
            _ => None,
        };
        self.updated_at = Utc::now();
    }

    /// Read a snapshot file; `None` when no build has written one yet.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }
}

/// Publishes snapshots to watchers and, optionally, a file.
pub struct StatusPublisher {
    tx: watch::Sender<StatusSnapshot>,
    path: Option<PathBuf>,
}

impl StatusPublisher {
    pub fn new(initial: StatusSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx, path: None }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    /// Publish a snapshot. A failed file write is logged, never fatal.
    pub fn publish(&self, snapshot: StatusSnapshot) {
        if let Some(path) = &self.path {
            if let Err(e) = write_atomic(path, &snapshot) {
                log::warn!("Failed to write status file {}: {}", path.display(), e);
            }
        }
        self.tx.send_replace(snapshot);
    }
}

impl StepObserver for StatusPublisher {
    fn item_selected(&self, iteration: u32, item: &ItemRef, task: &str) {
        let mut snapshot = self.latest();
        snapshot.iteration = iteration;
        snapshot.current = Some(CurrentItem::new(item, task));
        snapshot.updated_at = Utc::now();
        self.publish(snapshot);
    }
}

fn write_atomic(path: &Path, snapshot: &StatusSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(snapshot)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
