//! The Ralph loop: fresh-context iterations over the orchestrator.

mod ralph_loop;
mod status;

pub use ralph_loop::{COMPLETION_SIGNAL, RalphLoop, RunReport};
pub use status::{CurrentItem, StatusPublisher, StatusSnapshot};
