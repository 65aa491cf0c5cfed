//! Static tool descriptor table.
//!
//! One entry per `gitlab_*` tool exposed over MCP. This table is the single
//! source of truth consumed by the policy engine (C4) and the server's tool
//! registration (C8); nothing here is derived at runtime.

use crate::policy::{Feature, ToolDescriptor};

macro_rules! tool {
    ($name:literal) => {
        ToolDescriptor {
            name: $name,
            mutating: false,
            requires_feature: None,
            requires_graphql: false,
        }
    };
    ($name:literal, mutating) => {
        ToolDescriptor {
            name: $name,
            mutating: true,
            requires_feature: None,
            requires_graphql: false,
        }
    };
    ($name:literal, feature: $feature:expr) => {
        ToolDescriptor {
            name: $name,
            mutating: false,
            requires_feature: Some($feature),
            requires_graphql: false,
        }
    };
    ($name:literal, mutating, feature: $feature:expr) => {
        ToolDescriptor {
            name: $name,
            mutating: true,
            requires_feature: Some($feature),
            requires_graphql: false,
        }
    };
    ($name:literal, graphql) => {
        ToolDescriptor {
            name: $name,
            mutating: false,
            requires_feature: None,
            requires_graphql: true,
        }
    };
}

pub static TOOLS: &[ToolDescriptor] = &[
    // Projects
    tool!("gitlab_get_project"),
    tool!("gitlab_list_projects"),
    tool!("gitlab_search_projects"),
    tool!("gitlab_list_project_members"),
    // Repository / commits
    tool!("gitlab_list_commits"),
    tool!("gitlab_get_commit"),
    tool!("gitlab_get_file_contents"),
    tool!("gitlab_create_or_update_file", mutating),
    tool!("gitlab_push_files", mutating),
    tool!("gitlab_create_branch", mutating),
    tool!("gitlab_list_branches"),
    // Issues
    tool!("gitlab_list_issues"),
    tool!("gitlab_get_issue"),
    tool!("gitlab_create_issue", mutating),
    tool!("gitlab_update_issue", mutating),
    tool!("gitlab_create_issue_note", mutating),
    tool!("gitlab_list_issue_notes"),
    // Merge requests
    tool!("gitlab_list_merge_requests"),
    tool!("gitlab_get_merge_request"),
    tool!("gitlab_create_merge_request", mutating),
    tool!("gitlab_update_merge_request", mutating),
    tool!("gitlab_merge_merge_request", mutating),
    tool!("gitlab_get_merge_request_diffs"),
    tool!("gitlab_create_merge_request_note", mutating),
    // Users
    tool!("gitlab_get_current_user"),
    tool!("gitlab_search_users"),
    // Pipelines (feature-gated)
    tool!("gitlab_list_pipelines", feature: Feature::Pipeline),
    tool!("gitlab_get_pipeline", feature: Feature::Pipeline),
    tool!("gitlab_create_pipeline", mutating, feature: Feature::Pipeline),
    tool!("gitlab_retry_pipeline", mutating, feature: Feature::Pipeline),
    tool!("gitlab_cancel_pipeline", mutating, feature: Feature::Pipeline),
    // Releases (feature-gated)
    tool!("gitlab_list_releases", feature: Feature::Release),
    tool!("gitlab_get_release", feature: Feature::Release),
    tool!("gitlab_create_release", mutating, feature: Feature::Release),
    // Milestones (feature-gated)
    tool!("gitlab_list_milestones", feature: Feature::Milestone),
    tool!("gitlab_create_milestone", mutating, feature: Feature::Milestone),
    // Wiki (feature-gated)
    tool!("gitlab_list_wiki_pages", feature: Feature::Wiki),
    tool!("gitlab_get_wiki_page", feature: Feature::Wiki),
    tool!("gitlab_create_wiki_page", mutating, feature: Feature::Wiki),
    // Uploads
    tool!("gitlab_upload_file", mutating),
    // GraphQL
    tool!("gitlab_execute_graphql_query", graphql),
    tool!("gitlab_execute_graphql_mutation", graphql),
    tool!("gitlab_execute_graphql", graphql),
];

/// Look up a descriptor by its canonical or bare name.
pub fn find(name: &str) -> Option<&'static ToolDescriptor> {
    TOOLS
        .iter()
        .find(|t| t.name == name || t.bare_name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_names_are_unique_and_prefixed() {
        let mut seen = std::collections::HashSet::new();
        for t in TOOLS {
            assert!(t.name.starts_with("gitlab_"), "{} missing prefix", t.name);
            assert!(seen.insert(t.name), "duplicate tool {}", t.name);
        }
    }

    #[test]
    fn find_resolves_bare_and_canonical_names() {
        assert!(find("gitlab_get_project").is_some());
        assert!(find("get_project").is_some());
        assert!(find("does_not_exist").is_none());
    }

    #[test]
    fn graphql_tools_are_not_mutating_flagged() {
        for t in TOOLS.iter().filter(|t| t.requires_graphql) {
            assert!(!t.mutating, "{} graphql tools classify mutation dynamically", t.name);
        }
    }
}
