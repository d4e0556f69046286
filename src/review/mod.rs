//! Independent verification of a delegated change.

mod evidence;
mod gate;
mod server;
mod suite;

pub use evidence::{ChangeEvidence, TreeSnapshot};
pub use gate::{APPROVE_TOOL, DENY_TOOL, ProtocolViolation, ReviewSubject, ReviewerGate, interpret};
pub use server::{ReviewerServer, tool_definitions};
pub use suite::{SuiteOutcome, TestSuite};
