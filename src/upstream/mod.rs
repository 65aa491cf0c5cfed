//! Upstream GitLab client (C5)
//!
//! One method per supported GitLab operation. Every method returns the
//! upstream JSON body and fails with [`crate::error::BridgeError::GitLabApi`],
//! `Network`, or `Timeout`, never with anything transport-specific — callers
//! in the pipeline (C7) only ever see [`crate::error::BridgeError`].

mod client;
mod graphql;

pub use client::GitLabClient;
pub use graphql::{classify, GraphqlOperation};

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::RequestContext;
use crate::error::BridgeResult;

/// Everything the tool pipeline can ask GitLab to do.
///
/// Kept as a trait (rather than calling `GitLabClient` directly) so the
/// pipeline can be exercised against a stub in tests without a live
/// GitLab instance, mirroring how `turbomcp-proxy` isolates its transport
/// behind a connector trait.
#[async_trait]
pub trait GitLabUpstream: Send + Sync {
    async fn get_project(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value>;
    async fn list_projects(&self, ctx: &RequestContext, query: &Value) -> BridgeResult<Value>;
    async fn search_projects(&self, ctx: &RequestContext, query: &Value) -> BridgeResult<Value>;
    async fn list_project_members(
        &self,
        ctx: &RequestContext,
        project_id: &str,
    ) -> BridgeResult<Value>;

    async fn list_commits(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value>;
    async fn get_commit(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        sha: &str,
    ) -> BridgeResult<Value>;
    async fn get_file_contents(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        file_path: &str,
        ref_: &str,
    ) -> BridgeResult<Value>;
    async fn create_or_update_file(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value>;
    async fn push_files(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value>;
    async fn create_branch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value>;
    async fn list_branches(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value>;

    async fn list_issues(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value>;
    async fn get_issue(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        issue_iid: &str,
    ) -> BridgeResult<Value>;
    async fn create_issue(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value>;
    async fn update_issue(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        issue_iid: &str,
        body: &Value,
    ) -> BridgeResult<Value>;
    async fn create_issue_note(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        issue_iid: &str,
        body: &Value,
    ) -> BridgeResult<Value>;
    async fn list_issue_notes(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        issue_iid: &str,
    ) -> BridgeResult<Value>;

    async fn list_merge_requests(
        &self,
        ctx: &RequestContext,
        project_id: &str,
    ) -> BridgeResult<Value>;
    async fn get_merge_request(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        mr_iid: &str,
    ) -> BridgeResult<Value>;
    async fn create_merge_request(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value>;
    async fn update_merge_request(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        mr_iid: &str,
        body: &Value,
    ) -> BridgeResult<Value>;
    async fn merge_merge_request(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        mr_iid: &str,
        body: &Value,
    ) -> BridgeResult<Value>;
    async fn get_merge_request_diffs(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        mr_iid: &str,
    ) -> BridgeResult<Value>;
    async fn create_merge_request_note(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        mr_iid: &str,
        body: &Value,
    ) -> BridgeResult<Value>;

    async fn get_current_user(&self, ctx: &RequestContext) -> BridgeResult<Value>;
    async fn search_users(&self, ctx: &RequestContext, query: &Value) -> BridgeResult<Value>;

    async fn list_pipelines(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value>;
    async fn get_pipeline(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        pipeline_id: &str,
    ) -> BridgeResult<Value>;
    async fn create_pipeline(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value>;
    async fn retry_pipeline(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        pipeline_id: &str,
    ) -> BridgeResult<Value>;
    async fn cancel_pipeline(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        pipeline_id: &str,
    ) -> BridgeResult<Value>;

    async fn list_releases(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value>;
    async fn get_release(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        tag_name: &str,
    ) -> BridgeResult<Value>;
    async fn create_release(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value>;

    async fn list_milestones(&self, ctx: &RequestContext, project_id: &str)
        -> BridgeResult<Value>;
    async fn create_milestone(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value>;

    async fn list_wiki_pages(&self, ctx: &RequestContext, project_id: &str)
        -> BridgeResult<Value>;
    async fn get_wiki_page(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        slug: &str,
    ) -> BridgeResult<Value>;
    async fn create_wiki_page(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value>;

    async fn upload_file(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value>;

    /// Single GraphQL endpoint; the caller (C7) has already classified
    /// query vs mutation and is only asking this to execute it.
    async fn execute_graphql(
        &self,
        ctx: &RequestContext,
        query: &str,
        variables: &Value,
    ) -> BridgeResult<Value>;
}
