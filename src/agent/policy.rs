//! Capability policies: which tools a subagent may call.

use glob::Pattern;
use std::collections::BTreeMap;

use super::identity::SubagentIdentity;
use crate::error::{Result, TelosError};

/// Allowlist of tool-name patterns for one identity.
#[derive(Debug, Clone)]
pub struct CapabilityPolicy {
    identity: SubagentIdentity,
    patterns: Vec<Pattern>,
}

impl CapabilityPolicy {
    /// Build a policy from glob patterns. An empty list is refused.
    pub fn new<S: AsRef<str>>(identity: SubagentIdentity, tools: &[S]) -> Result<Self> {
        if tools.is_empty() {
            return Err(TelosError::Config(format!("capability policy for {} has no tools", identity)));
        }
        let patterns = tools
            .iter()
            .map(|t| {
                Pattern::new(t.as_ref().trim())
                    .map_err(|e| TelosError::Config(format!("bad tool pattern '{}' for {}: {}", t.as_ref(), identity, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { identity, patterns })
    }

    pub fn default_for(identity: SubagentIdentity) -> Self {
        let patterns = identity
            .default_tools()
            .iter()
            .filter_map(|t| Pattern::new(t).ok())
            .collect();
        Self { identity, patterns }
    }

    pub fn identity(&self) -> SubagentIdentity {
        self.identity
    }

    pub fn authorize(&self, tool: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(tool))
    }

    /// Pattern strings, in declaration order.
    pub fn tools(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.as_str().to_string()).collect()
    }
}

/// Effective policy for every identity: defaults plus overrides.
#[derive(Debug, Clone)]
pub struct PolicySet {
    policies: BTreeMap<SubagentIdentity, CapabilityPolicy>,
}

impl Default for PolicySet {
    fn default() -> Self {
        Self {
            policies: SubagentIdentity::ALL
                .into_iter()
                .map(|id| (id, CapabilityPolicy::default_for(id)))
                .collect(),
        }
    }
}

impl PolicySet {
    /// Apply `identity name -> tool patterns` overrides on top of the defaults.
    pub fn with_overrides(overrides: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut set = Self::default();
        for (name, tools) in overrides {
            let identity = SubagentIdentity::parse(name)
                .ok_or_else(|| TelosError::Config(format!("unknown subagent identity '{}' in policies", name)))?;
            set.policies.insert(identity, CapabilityPolicy::new(identity, tools)?);
        }
        Ok(set)
    }

    pub fn get(&self, identity: SubagentIdentity) -> CapabilityPolicy {
        self.policies
            .get(&identity)
            .cloned()
            .unwrap_or_else(|| CapabilityPolicy::default_for(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_coder_policy() {
        let policy = CapabilityPolicy::default_for(SubagentIdentity::Coder);
        assert!(policy.authorize("Bash"));
        assert!(policy.authorize("mcp__gemini-context__summarize"));
        assert!(!policy.authorize("mcp__reviewer__approve"));
        assert!(!policy.authorize("WebFetch"));
    }

    #[test]
    fn test_reviewer_cannot_write() {
        let policy = CapabilityPolicy::default_for(SubagentIdentity::Reviewer);
        assert!(policy.authorize("mcp__reviewer__deny"));
        assert!(!policy.authorize("Write"));
        assert!(!policy.authorize("Bash"));
    }

    #[test]
    fn test_crm_is_scoped_to_crm_server() {
        let policy = CapabilityPolicy::default_for(SubagentIdentity::Crm);
        assert!(policy.authorize("mcp__twenty-crm__create_person"));
        assert!(!policy.authorize("mcp__marketing__send"));
    }

    #[test]
    fn test_every_default_pattern_is_valid() {
        for id in SubagentIdentity::ALL {
            let policy = CapabilityPolicy::default_for(id);
            assert_eq!(policy.tools().len(), id.default_tools().len(), "{}", id);
        }
    }

    #[test]
    fn test_empty_and_invalid_overrides_rejected() {
        let empty: [&str; 0] = [];
        assert!(CapabilityPolicy::new(SubagentIdentity::Crm, &empty).is_err());
        assert!(CapabilityPolicy::new(SubagentIdentity::Crm, &["mcp__[bad"]).is_err());
        let ok = CapabilityPolicy::new(SubagentIdentity::Crm, &["Read"]).unwrap();
        assert!(!ok.authorize("mcp__twenty-crm__x"));
    }

    #[test]
    fn test_policy_set_overrides_one_identity() {
        let mut overrides = BTreeMap::new();
        overrides.insert("marketing".to_string(), vec!["Read".to_string(), "mcp__mailchimp__*".to_string()]);
        let set = PolicySet::with_overrides(&overrides).unwrap();
        assert!(set.get(SubagentIdentity::Marketing).authorize("mcp__mailchimp__send"));
        assert!(!set.get(SubagentIdentity::Marketing).authorize("mcp__marketing__send"));
        assert!(set.get(SubagentIdentity::Coder).authorize("Edit"));

        overrides.insert("ghost".to_string(), vec!["Read".to_string()]);
        assert!(PolicySet::with_overrides(&overrides).is_err());
    }
}
