//! Reviewer verdicts.
//!
//! A verdict is a sum type so a reviewer result can never be both approved
//! and denied, or neither.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of one review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    Approved { summary: String },
    Denied { reason: String },
}

impl Verdict {
    pub fn approved(summary: impl Into<String>) -> Self {
        Verdict::Approved {
            summary: summary.into(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Verdict::Denied { reason: reason.into() }
    }

    pub fn kind(&self) -> VerdictKind {
        match self {
            Verdict::Approved { .. } => VerdictKind::Approved,
            Verdict::Denied { .. } => VerdictKind::Denied,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Verdict::Approved { .. })
    }

    /// The mandatory justification: summary or reason.
    pub fn justification(&self) -> &str {
        match self {
            Verdict::Approved { summary } => summary,
            Verdict::Denied { reason } => reason,
        }
    }
}

/// Verdict without its text, as stored in the progress log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    Approved,
    Denied,
}

impl VerdictKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "approved" => Some(VerdictKind::Approved),
            "denied" => Some(VerdictKind::Denied),
            _ => None,
        }
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictKind::Approved => f.write_str("approved"),
            VerdictKind::Denied => f.write_str("denied"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_kind_and_justification() {
        let v = Verdict::approved("all criteria verified");
        assert_eq!(v.kind(), VerdictKind::Approved);
        assert!(v.is_approved());
        assert_eq!(v.justification(), "all criteria verified");

        let v = Verdict::denied("test_login fails");
        assert_eq!(v.kind(), VerdictKind::Denied);
        assert_eq!(v.justification(), "test_login fails");
    }

    #[test]
    fn test_verdict_kind_parse_display() {
        assert_eq!(VerdictKind::parse("approved"), Some(VerdictKind::Approved));
        assert_eq!(VerdictKind::parse(" denied "), Some(VerdictKind::Denied));
        assert_eq!(VerdictKind::parse("approved-partial"), None);
        assert_eq!(VerdictKind::Denied.to_string(), "denied");
    }

    #[test]
    fn test_verdict_serializes_tagged() {
        let json = serde_json::to_value(Verdict::denied("nope")).unwrap();
        assert_eq!(json, serde_json::json!({"verdict": "denied", "reason": "nope"}));
    }
}
