//! Telos - builds a project from PRD checklists
//!
//! Telos implements the "Ralph loop" pattern: every iteration starts fresh,
//! picks one checklist item, delegates it to a capability-restricted
//! subagent, and has an independent reviewer approve or deny the result.
//! Durable state lives only in the PRD files, `progress.txt` and `AGENTS.md`.

pub mod agent;
pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod markdown;
pub mod orchestrator;
pub mod planning;
pub mod prompt;
pub mod ralph;
pub mod review;
pub mod store;

pub use error::{Result, TelosError};
