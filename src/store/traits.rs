//! Repository trait for build state.

use crate::domain::{ItemRef, KnowledgeBase, KnowledgeEntry, PrdSet, ProgressEntry, ProgressLog};
use crate::error::Result;

/// Owner of a build's PRDs, progress log and knowledge base.
///
/// One Ralph loop holds the store exclusively for the duration of a build.
/// Implementations enforce the invariants of the text formats: checkboxes
/// only go from unchecked to checked, the progress log only grows by one
/// consecutive entry at a time, and knowledge is only appended.
pub trait BuildStore: Send {
    /// Current PRD set. Unreadable or unparseable PRDs are an error.
    fn prds(&self) -> Result<PrdSet>;

    /// Check an item's box. Returns false if it was already checked.
    fn mark_done(&mut self, item: &ItemRef) -> Result<bool>;

    /// Full progress log.
    fn progress(&self) -> Result<ProgressLog>;

    /// Append one entry; it must carry `progress()?.next_iteration()`.
    fn append_progress(&mut self, entry: ProgressEntry) -> Result<()>;

    /// Full knowledge base.
    fn knowledge(&self) -> Result<KnowledgeBase>;

    /// Append a knowledge entry. Returns false for duplicates.
    fn append_knowledge(&mut self, entry: &KnowledgeEntry) -> Result<bool>;
}
