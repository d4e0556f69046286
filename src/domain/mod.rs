//! Domain types for Telos
//!
//! - Prd / PrdSet: requirement documents and their checklist items
//! - ProgressLog: append-only record of iteration outcomes
//! - KnowledgeBase: cross-iteration memory in four sections
//! - Verdict: the reviewer's approve/deny sum type
//! - BuildRunState: iteration counter and run status

pub mod knowledge;
pub mod prd;
pub mod progress;
pub mod run_state;
pub mod verdict;

pub use knowledge::{KnowledgeBase, KnowledgeCategory, KnowledgeEntry, extract_learnings};
pub use prd::{ChecklistItem, ItemRef, Prd, PrdRef, PrdSet};
pub use progress::{ProgressEntry, ProgressLog};
pub use run_state::{BuildRunState, FailureReason, RunStatus};
pub use verdict::{Verdict, VerdictKind};
