//! Subagent identities and the task categories that select them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A capability-scoped specialist the runtime can be driven as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubagentIdentity {
    Coder,
    Reviewer,
    Crm,
    Marketing,
    ImageGenerator,
    Planner,
}

impl SubagentIdentity {
    pub const ALL: [SubagentIdentity; 6] = [
        SubagentIdentity::Coder,
        SubagentIdentity::Reviewer,
        SubagentIdentity::Crm,
        SubagentIdentity::Marketing,
        SubagentIdentity::ImageGenerator,
        SubagentIdentity::Planner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubagentIdentity::Coder => "coder",
            SubagentIdentity::Reviewer => "reviewer",
            SubagentIdentity::Crm => "crm",
            SubagentIdentity::Marketing => "marketing",
            SubagentIdentity::ImageGenerator => "image-generator",
            SubagentIdentity::Planner => "planner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == s.trim())
    }

    /// Default tool allowlist, as glob patterns over tool names.
    pub fn default_tools(&self) -> &'static [&'static str] {
        match self {
            SubagentIdentity::Coder => &["Read", "Write", "Edit", "Glob", "Grep", "Bash", "mcp__gemini-context__*"],
            SubagentIdentity::Reviewer => &["Read", "Glob", "Grep", "mcp__reviewer__approve", "mcp__reviewer__deny"],
            SubagentIdentity::Crm => &["Read", "mcp__twenty-crm__*"],
            SubagentIdentity::Marketing => &["Read", "Write", "mcp__marketing__*"],
            SubagentIdentity::ImageGenerator => &["Read", "Write", "mcp__image-gen__*"],
            SubagentIdentity::Planner => &["Read", "Write", "Glob", "Grep", "mcp__gemini-context__*"],
        }
    }

    /// MCP servers this identity needs launched.
    pub fn mcp_servers(&self) -> &'static [&'static str] {
        match self {
            SubagentIdentity::Coder | SubagentIdentity::Planner => &["gemini-context"],
            SubagentIdentity::Reviewer => &["reviewer"],
            SubagentIdentity::Crm => &["twenty-crm"],
            SubagentIdentity::Marketing => &["marketing"],
            SubagentIdentity::ImageGenerator => &["image-gen"],
        }
    }
}

impl fmt::Display for SubagentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What kind of work a checklist item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    #[default]
    Implementation,
    Crm,
    Marketing,
    Asset,
}

impl TaskCategory {
    /// Fixed category to subagent table.
    pub fn subagent(&self) -> SubagentIdentity {
        match self {
            TaskCategory::Implementation => SubagentIdentity::Coder,
            TaskCategory::Crm => SubagentIdentity::Crm,
            TaskCategory::Marketing => SubagentIdentity::Marketing,
            TaskCategory::Asset => SubagentIdentity::ImageGenerator,
        }
    }

    /// Parse a tag or `Category:` value. Accepts a few common spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" | "implementation" | "coder" => Some(TaskCategory::Implementation),
            "crm" => Some(TaskCategory::Crm),
            "marketing" => Some(TaskCategory::Marketing),
            "image" | "asset" | "image-generator" => Some(TaskCategory::Asset),
            _ => None,
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskCategory::Implementation => "implementation",
            TaskCategory::Crm => "crm",
            TaskCategory::Marketing => "marketing",
            TaskCategory::Asset => "asset",
        };
        write!(f, "{}", s)
    }
}
