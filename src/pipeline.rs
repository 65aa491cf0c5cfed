//! Tool invocation pipeline (C7)
//!
//! `invoke(tool, args)` is the single entry point shared by the stdio and
//! HTTP transports (`spec.md` §4.7). It validates arguments, enforces
//! policy, classifies GraphQL documents, dispatches to the upstream client,
//! shapes the result, and normalizes every error into a `ToolResult` so
//! nothing escapes to the transport.

use serde_json::Value;
use std::sync::Arc;

use crate::auth::{self, RequestContext};
use crate::error::{BridgeError, ErrorDetailMode};
use crate::format::{self, FormatOptions};
use crate::policy::PolicyEngine;
use crate::redact::redact_str;
use crate::sanitize::strip_nulls;
use crate::tools;
use crate::upstream::{classify, GraphqlOperation, GitLabUpstream};

/// MCP tool result content item (`spec.md` §6 "Wire format to MCP client").
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl ContentItem {
    fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: text.into(),
        }
    }
}

/// The shape every tool call returns, success or failure.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolResult {
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    pub content: Vec<ContentItem>,
}

impl ToolResult {
    fn ok(text: String) -> Self {
        Self {
            is_error: false,
            content: vec![ContentItem::text(text)],
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            content: vec![ContentItem::text(redact_str(&text.into()))],
        }
    }
}

/// Everything the pipeline needs, shared across every invocation
/// (`spec.md` §9 "Shared upstream client").
pub struct Pipeline {
    policy: PolicyEngine,
    upstream: Arc<dyn GitLabUpstream>,
    format_options: FormatOptions,
    error_detail: ErrorDetailMode,
}

impl Pipeline {
    pub fn new(
        policy: PolicyEngine,
        upstream: Arc<dyn GitLabUpstream>,
        format_options: FormatOptions,
        error_detail: ErrorDetailMode,
    ) -> Self {
        Self {
            policy,
            upstream,
            format_options,
            error_detail,
        }
    }

    /// `invoke(tool, args) -> ToolResult`.
    pub async fn invoke(&self, tool_name: &str, args: Value) -> ToolResult {
        match self.invoke_inner(tool_name, args).await {
            Ok(value) => {
                let stripped = strip_nulls(&value);
                let formatted = format::format(&stripped, self.format_options);
                ToolResult::ok(formatted.text)
            }
            Err(err) => ToolResult::error(err.to_tool_text(self.error_detail)),
        }
    }

    async fn invoke_inner(&self, tool_name: &str, args: Value) -> Result<Value, BridgeError> {
        let descriptor = tools::find(tool_name)
            .ok_or_else(|| BridgeError::validation("name", "unknown tool"))?;

        self.policy.assert_can_execute(descriptor)?;

        let ctx = auth::current();

        if descriptor.requires_graphql {
            return self.dispatch_graphql(descriptor.name, &ctx, &args).await;
        }

        dispatch_rest(self.upstream.as_ref(), &ctx, descriptor.name, &args).await
    }

    async fn dispatch_graphql(
        &self,
        tool_name: &str,
        ctx: &RequestContext,
        args: &Value,
    ) -> Result<Value, BridgeError> {
        let query = require_str(args, "query")?;
        let variables = args.get("variables").cloned().unwrap_or(Value::Null);
        let operation = classify(query);

        match (tool_name, operation) {
            ("gitlab_execute_graphql_query", GraphqlOperation::Mutation) => Err(
                BridgeError::validation(
                    "query",
                    "this is a mutation; use gitlab_execute_graphql_mutation instead",
                ),
            ),
            ("gitlab_execute_graphql_mutation", GraphqlOperation::Query) => Err(
                BridgeError::validation(
                    "query",
                    "this is a query; use gitlab_execute_graphql_query instead",
                ),
            ),
            _ => {
                // A tool descriptor's `mutating` flag is static, but a GraphQL
                // document's mutating-ness is only known after classification.
                // Read-only mode must still block a mutation reaching
                // `gitlab_execute_graphql`/`_mutation`, even though neither
                // descriptor declares itself mutating.
                if operation == GraphqlOperation::Mutation && self.policy.read_only() {
                    return Err(BridgeError::PolicyDenied);
                }
                self.upstream.execute_graphql(ctx, query, &variables).await
            }
        }
    }
}

fn require_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, BridgeError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::validation(field, "missing or not a string"))
}

/// Dispatches a non-GraphQL tool to its corresponding upstream method.
///
/// The exact argument shape of each tool is out of scope; this performs the
/// minimal extraction (a project id and, where relevant, a resource id) each
/// method needs, and forwards the rest of `args` as the request body.
async fn dispatch_rest(
    upstream: &dyn GitLabUpstream,
    ctx: &RequestContext,
    tool_name: &str,
    args: &Value,
) -> Result<Value, BridgeError> {
    match tool_name {
        "gitlab_get_project" => upstream.get_project(ctx, require_str(args, "project_id")?).await,
        "gitlab_list_projects" => upstream.list_projects(ctx, args).await,
        "gitlab_search_projects" => upstream.search_projects(ctx, args).await,
        "gitlab_list_project_members" => {
            upstream
                .list_project_members(ctx, require_str(args, "project_id")?)
                .await
        }

        "gitlab_list_commits" => {
            upstream.list_commits(ctx, require_str(args, "project_id")?).await
        }
        "gitlab_get_commit" => {
            upstream
                .get_commit(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "sha")?,
                )
                .await
        }
        "gitlab_get_file_contents" => {
            upstream
                .get_file_contents(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "file_path")?,
                    args.get("ref").and_then(Value::as_str).unwrap_or("main"),
                )
                .await
        }
        "gitlab_create_or_update_file" => {
            upstream
                .create_or_update_file(ctx, require_str(args, "project_id")?, args)
                .await
        }
        "gitlab_push_files" => {
            upstream.push_files(ctx, require_str(args, "project_id")?, args).await
        }
        "gitlab_create_branch" => {
            upstream
                .create_branch(ctx, require_str(args, "project_id")?, args)
                .await
        }
        "gitlab_list_branches" => {
            upstream
                .list_branches(ctx, require_str(args, "project_id")?)
                .await
        }

        "gitlab_list_issues" => {
            upstream.list_issues(ctx, require_str(args, "project_id")?).await
        }
        "gitlab_get_issue" => {
            upstream
                .get_issue(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "issue_iid")?,
                )
                .await
        }
        "gitlab_create_issue" => {
            upstream.create_issue(ctx, require_str(args, "project_id")?, args).await
        }
        "gitlab_update_issue" => {
            upstream
                .update_issue(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "issue_iid")?,
                    args,
                )
                .await
        }
        "gitlab_create_issue_note" => {
            upstream
                .create_issue_note(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "issue_iid")?,
                    args,
                )
                .await
        }
        "gitlab_list_issue_notes" => {
            upstream
                .list_issue_notes(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "issue_iid")?,
                )
                .await
        }

        "gitlab_list_merge_requests" => {
            upstream
                .list_merge_requests(ctx, require_str(args, "project_id")?)
                .await
        }
        "gitlab_get_merge_request" => {
            upstream
                .get_merge_request(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "merge_request_iid")?,
                )
                .await
        }
        "gitlab_create_merge_request" => {
            upstream
                .create_merge_request(ctx, require_str(args, "project_id")?, args)
                .await
        }
        "gitlab_update_merge_request" => {
            upstream
                .update_merge_request(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "merge_request_iid")?,
                    args,
                )
                .await
        }
        "gitlab_merge_merge_request" => {
            upstream
                .merge_merge_request(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "merge_request_iid")?,
                    args,
                )
                .await
        }
        "gitlab_get_merge_request_diffs" => {
            upstream
                .get_merge_request_diffs(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "merge_request_iid")?,
                )
                .await
        }
        "gitlab_create_merge_request_note" => {
            upstream
                .create_merge_request_note(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "merge_request_iid")?,
                    args,
                )
                .await
        }

        "gitlab_get_current_user" => upstream.get_current_user(ctx).await,
        "gitlab_search_users" => upstream.search_users(ctx, args).await,

        "gitlab_list_pipelines" => {
            upstream
                .list_pipelines(ctx, require_str(args, "project_id")?)
                .await
        }
        "gitlab_get_pipeline" => {
            upstream
                .get_pipeline(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "pipeline_id")?,
                )
                .await
        }
        "gitlab_create_pipeline" => {
            upstream
                .create_pipeline(ctx, require_str(args, "project_id")?, args)
                .await
        }
        "gitlab_retry_pipeline" => {
            upstream
                .retry_pipeline(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "pipeline_id")?,
                )
                .await
        }
        "gitlab_cancel_pipeline" => {
            upstream
                .cancel_pipeline(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "pipeline_id")?,
                )
                .await
        }

        "gitlab_list_releases" => {
            upstream.list_releases(ctx, require_str(args, "project_id")?).await
        }
        "gitlab_get_release" => {
            upstream
                .get_release(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "tag_name")?,
                )
                .await
        }
        "gitlab_create_release" => {
            upstream
                .create_release(ctx, require_str(args, "project_id")?, args)
                .await
        }

        "gitlab_list_milestones" => {
            upstream
                .list_milestones(ctx, require_str(args, "project_id")?)
                .await
        }
        "gitlab_create_milestone" => {
            upstream
                .create_milestone(ctx, require_str(args, "project_id")?, args)
                .await
        }

        "gitlab_list_wiki_pages" => {
            upstream
                .list_wiki_pages(ctx, require_str(args, "project_id")?)
                .await
        }
        "gitlab_get_wiki_page" => {
            upstream
                .get_wiki_page(
                    ctx,
                    require_str(args, "project_id")?,
                    require_str(args, "slug")?,
                )
                .await
        }
        "gitlab_create_wiki_page" => {
            upstream
                .create_wiki_page(ctx, require_str(args, "project_id")?, args)
                .await
        }

        "gitlab_upload_file" => {
            upstream.upload_file(ctx, require_str(args, "project_id")?, args).await
        }

        other => Err(BridgeError::internal(format!(
            "tool {other} has no dispatch mapping"
        ))),
    }
}
