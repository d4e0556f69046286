//! Prompt templates and rendering.
//!
//! Delegation, review and planning prompts are Handlebars templates
//! registered once and rendered with serializable contexts.

mod render;
pub mod templates;

pub use render::PromptRenderer;
