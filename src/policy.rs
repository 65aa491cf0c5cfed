//! Policy engine (C4)
//!
//! Tool descriptors are static data; the policy is a pure, table-driven
//! decision procedure applied in the fixed order `spec.md` §4.4 names. This
//! follows the "Policy as data" design note: no inheritance, no dynamic
//! dispatch, just a function folding a handful of filters.

use regex::Regex;
use std::collections::HashSet;

/// The closed set of optional feature gates a tool may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Wiki,
    Milestone,
    Pipeline,
    Release,
}

impl Feature {
    pub const ALL: [Feature; 4] = [Self::Wiki, Self::Milestone, Self::Pipeline, Self::Release];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wiki => "wiki",
            Self::Milestone => "milestone",
            Self::Pipeline => "pipeline",
            Self::Release => "release",
        }
    }
}

/// A stable, immutable tool descriptor (`spec.md` §3 "Tool descriptor").
#[derive(Debug, Clone, Copy)]
pub struct ToolDescriptor {
    /// Canonical name; begins with `gitlab_`.
    pub name: &'static str,
    /// True if the tool writes upstream state.
    pub mutating: bool,
    /// Feature gate, if any.
    pub requires_feature: Option<Feature>,
    /// True for the three GraphQL-shaped tools.
    pub requires_graphql: bool,
}

impl ToolDescriptor {
    /// The canonical name with any leading `gitlab_` prefix stripped.
    pub fn bare_name(&self) -> &str {
        self.name.strip_prefix("gitlab_").unwrap_or(self.name)
    }
}

/// Policy configuration (`spec.md` §3 "Policy configuration").
#[derive(Debug, Clone, Default)]
pub struct PolicyConfig {
    pub read_only: bool,
    pub allowed_tools: Vec<String>,
    pub denied_tools_regex: Option<Regex>,
    pub enabled_features: [bool; 4],
    pub allow_graphql_with_project_scope: bool,
    pub allowed_project_ids: Vec<String>,
}

impl PolicyConfig {
    fn feature_enabled(&self, feature: Feature) -> bool {
        self.enabled_features[feature as usize]
    }

    pub fn with_feature(mut self, feature: Feature, enabled: bool) -> Self {
        self.enabled_features[feature as usize] = enabled;
        self
    }
}

/// Canonicalize an allow-list entry: trim whitespace. Empty entries are
/// represented as `None` so callers can skip them (`spec.md` §4.4 step 3).
fn canonicalize_entry(entry: &str) -> Option<String> {
    let trimmed = entry.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Does allow-list entry `entry` match tool `name`? Matches both with and
/// without the tool's leading `gitlab_` prefix (P2: `get_project` matches
/// `gitlab_get_project` and vice versa).
fn entry_matches(entry: &str, name: &str, bare_name: &str) -> bool {
    entry == name || entry == bare_name
}

/// The policy engine: a pure decision procedure over [`ToolDescriptor`]s.
pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn read_only(&self) -> bool {
        self.config.read_only
    }

    /// `spec.md` §4.4 decision procedure, short-circuiting on first deny.
    pub fn is_tool_enabled(&self, tool: &ToolDescriptor) -> bool {
        // 1. Feature gate.
        if let Some(feature) = tool.requires_feature
            && !self.config.feature_enabled(feature)
        {
            return false;
        }

        // 2. Read-only mode blocks mutating tools.
        if self.config.read_only && tool.mutating {
            return false;
        }

        // 3. Allow-list, if non-empty.
        if !self.config.allowed_tools.is_empty() {
            let bare = tool.bare_name();
            let matched = self
                .config
                .allowed_tools
                .iter()
                .filter_map(|e| canonicalize_entry(e))
                .any(|entry| entry_matches(&entry, tool.name, bare));
            if !matched {
                return false;
            }
        }

        // 4. Deny regex.
        if let Some(re) = &self.config.denied_tools_regex
            && re.is_match(tool.name)
        {
            return false;
        }

        // 5. GraphQL cannot be safely scoped to a project allow-list.
        if tool.requires_graphql
            && !self.config.allowed_project_ids.is_empty()
            && !self.config.allow_graphql_with_project_scope
        {
            return false;
        }

        true
    }

    /// Fails with a policy-denied error when the tool is not enabled.
    pub fn assert_can_execute(&self, tool: &ToolDescriptor) -> crate::error::BridgeResult<()> {
        if self.is_tool_enabled(tool) {
            Ok(())
        } else {
            Err(crate::error::BridgeError::PolicyDenied)
        }
    }

    /// Returns the subset of `tools` enabled under this policy (P1: always a
    /// subset; tightening any dimension only removes tools).
    pub fn filter_tools<'a>(&self, tools: &'a [ToolDescriptor]) -> Vec<&'a ToolDescriptor> {
        tools.iter().filter(|t| self.is_tool_enabled(t)).collect()
    }
}

/// Distinct canonical names referenced by a tool list; used by property
/// tests to reason about "tightening only removes tools" without caring
/// about descriptor identity.
pub fn names(tools: &[&ToolDescriptor]) -> HashSet<&'static str> {
    tools.iter().map(|t| t.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::TOOLS;
    use proptest::prelude::*;

    const GET_PROJECT: ToolDescriptor = ToolDescriptor {
        name: "gitlab_get_project",
        mutating: false,
        requires_feature: None,
        requires_graphql: false,
    };
    const CREATE_ISSUE: ToolDescriptor = ToolDescriptor {
        name: "gitlab_create_issue",
        mutating: true,
        requires_feature: None,
        requires_graphql: false,
    };
    const GRAPHQL_QUERY: ToolDescriptor = ToolDescriptor {
        name: "gitlab_execute_graphql_query",
        mutating: false,
        requires_feature: None,
        requires_graphql: true,
    };
    const WIKI_TOOL: ToolDescriptor = ToolDescriptor {
        name: "gitlab_get_wiki_page",
        mutating: false,
        requires_feature: Some(Feature::Wiki),
        requires_graphql: false,
    };

    #[test]
    fn scenario_1_policy_deny_in_read_only() {
        let policy = PolicyEngine::new(PolicyConfig {
            read_only: true,
            enabled_features: [true; 4],
            ..Default::default()
        });
        assert!(policy.assert_can_execute(&CREATE_ISSUE).is_err());
        assert!(policy.assert_can_execute(&GET_PROJECT).is_ok());
    }

    #[test]
    fn scenario_2_allowlist_with_bare_name() {
        let policy = PolicyEngine::new(PolicyConfig {
            allowed_tools: vec!["get_project".to_string()],
            ..Default::default()
        });
        let enabled = policy.filter_tools(&TOOLS);
        assert!(enabled.iter().any(|t| t.name == "gitlab_get_project"));
        assert!(!enabled.iter().any(|t| t.name == "gitlab_list_projects"));
    }

    #[test]
    fn p2_allowlist_normalisation() {
        for entry in [
            "get_project",
            "  get_project  ",
            "gitlab_get_project",
            "  gitlab_get_project  ",
        ] {
            let policy = PolicyEngine::new(PolicyConfig {
                allowed_tools: vec![entry.to_string()],
                ..Default::default()
            });
            assert!(
                policy.is_tool_enabled(&GET_PROJECT),
                "entry {entry:?} should match"
            );
        }
    }

    #[test]
    fn feature_gate_denies_when_disabled() {
        let policy = PolicyEngine::new(PolicyConfig::default());
        assert!(!policy.is_tool_enabled(&WIKI_TOOL));

        let policy = PolicyEngine::new(PolicyConfig::default().with_feature(Feature::Wiki, true));
        assert!(policy.is_tool_enabled(&WIKI_TOOL));
    }

    #[test]
    fn deny_regex_overrides_allow() {
        let policy = PolicyEngine::new(PolicyConfig {
            denied_tools_regex: Some(Regex::new("create_issue").unwrap()),
            ..Default::default()
        });
        assert!(!policy.is_tool_enabled(&CREATE_ISSUE));
    }

    #[test]
    fn graphql_denied_with_project_scope_unless_explicitly_allowed() {
        let policy = PolicyEngine::new(PolicyConfig {
            allowed_project_ids: vec!["42".to_string()],
            ..Default::default()
        });
        assert!(!policy.is_tool_enabled(&GRAPHQL_QUERY));

        let policy = PolicyEngine::new(PolicyConfig {
            allowed_project_ids: vec!["42".to_string()],
            allow_graphql_with_project_scope: true,
            ..Default::default()
        });
        assert!(policy.is_tool_enabled(&GRAPHQL_QUERY));
    }

    proptest! {
        // P1: filter_tools(T, P) is always a subset of T, and tightening a
        // policy dimension only removes tools.
        #[test]
        fn p1_policy_monotonicity(read_only in any::<bool>(), extra_read_only in proptest::bool::ANY) {
            let base = PolicyConfig { read_only, enabled_features: [true; 4], ..Default::default() };
            let tightened = PolicyConfig { read_only: read_only || extra_read_only, enabled_features: [true; 4], ..Default::default() };

            let base_engine = PolicyEngine::new(base);
            let tight_engine = PolicyEngine::new(tightened);

            let base_enabled = names(&base_engine.filter_tools(&TOOLS));
            let tight_enabled = names(&tight_engine.filter_tools(&TOOLS));

            prop_assert!(tight_enabled.is_subset(&base_enabled));
            prop_assert!(base_enabled.is_subset(&names(&TOOLS.iter().collect::<Vec<_>>())));
        }
    }
}
