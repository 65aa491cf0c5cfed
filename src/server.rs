//! MCP server adapter (C8)
//!
//! Registers every tool whose descriptor passes the policy at build time —
//! tools denied only by a disabled feature remain unregistered rather than
//! hidden, so `listTools` reflects the policy truthfully (`spec.md` §4.8).
//! The stdio transport below is a minimal line-delimited JSON-RPC framing;
//! the MCP wire protocol itself is treated as a black box this crate does
//! not attempt to fully reimplement.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::auth::{self, AuthContext, RequestContext};
use crate::pipeline::Pipeline;
use crate::policy::PolicyEngine;
use crate::tools::{self, ToolDescriptor};

/// The server-side view of an MCP connection: the filtered tool catalog
/// plus the pipeline every `callTool` forwards into.
pub struct McpServer {
    pipeline: Arc<Pipeline>,
    registered: Vec<&'static ToolDescriptor>,
}

impl McpServer {
    pub fn new(pipeline: Arc<Pipeline>, policy: &PolicyEngine) -> Self {
        let registered = policy.filter_tools(tools::TOOLS);
        Self {
            pipeline,
            registered,
        }
    }

    /// `listTools` result: just the registered names, MCP `listTools` shape.
    pub fn list_tools(&self) -> Value {
        json!({
            "tools": self.registered.iter().map(|t| json!({ "name": t.name })).collect::<Vec<_>>()
        })
    }

    /// Thin adapter: forwards `(name, args)` into the pipeline, never
    /// touching its output.
    pub async fn call_tool(&self, name: &str, args: Value) -> Value {
        let result = self.pipeline.invoke(name, args).await;
        serde_json::to_value(result).unwrap_or_else(|_| json!({"isError": true, "content": []}))
    }

    /// Dispatches one already-decoded JSON-RPC request to the matching MCP
    /// method and returns the JSON-RPC response value.
    async fn handle(&self, request: &Value) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(Value::as_str).unwrap_or("");

        let result = match method {
            "initialize" => json!({ "serverInfo": { "name": "gitlab-mcp-bridge" } }),
            "tools/list" => self.list_tools(),
            "tools/call" => {
                let params = request.get("params").cloned().unwrap_or(Value::Null);
                let name = params.get("name").and_then(Value::as_str).unwrap_or("");
                let args = params.get("arguments").cloned().unwrap_or(json!({}));
                self.call_tool(name, args).await
            }
            other => {
                return json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("method not found: {other}") }
                });
            }
        };

        json!({ "jsonrpc": "2.0", "id": id, "result": result })
    }
}

/// Runs the stdio transport: one client, one process, a single static
/// `AuthContext` binding for the whole lifetime (`spec.md` §5 "Stdio mode
/// installs a single static binding at startup").
pub async fn run_stdio(server: McpServer, auth: Option<AuthContext>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    let ctx = RequestContext::stdio(auth);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode JSON-RPC line");
                continue;
            }
        };

        let ctx = ctx.clone();
        let response = auth::with_request_context(ctx, || server.handle(&request)).await;

        let mut out = serde_json::to_vec(&response).unwrap_or_default();
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorDetailMode;
    use crate::format::FormatOptions;
    use crate::policy::PolicyConfig;
    use crate::upstream::GitLabUpstream;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NoopUpstream;

    macro_rules! noop {
        ($name:ident($($arg:ident: $ty:ty),*)) => {
            async fn $name(&self, _ctx: &RequestContext, $($arg: $ty),*) -> crate::error::BridgeResult<Value> {
                Ok(json!({}))
            }
        };
    }

    #[async_trait]
    impl GitLabUpstream for NoopUpstream {
        noop!(get_project(project_id: &str));
        noop!(list_projects(query: &Value));
        noop!(search_projects(query: &Value));
        noop!(list_project_members(project_id: &str));
        noop!(list_commits(project_id: &str));
        noop!(get_commit(project_id: &str, sha: &str));
        noop!(get_file_contents(project_id: &str, file_path: &str, ref_: &str));
        noop!(create_or_update_file(project_id: &str, body: &Value));
        noop!(push_files(project_id: &str, body: &Value));
        noop!(create_branch(project_id: &str, body: &Value));
        noop!(list_branches(project_id: &str));
        noop!(list_issues(project_id: &str));
        noop!(get_issue(project_id: &str, issue_iid: &str));
        noop!(create_issue(project_id: &str, body: &Value));
        noop!(update_issue(project_id: &str, issue_iid: &str, body: &Value));
        noop!(create_issue_note(project_id: &str, issue_iid: &str, body: &Value));
        noop!(list_issue_notes(project_id: &str, issue_iid: &str));
        noop!(list_merge_requests(project_id: &str));
        noop!(get_merge_request(project_id: &str, mr_iid: &str));
        noop!(create_merge_request(project_id: &str, body: &Value));
        noop!(update_merge_request(project_id: &str, mr_iid: &str, body: &Value));
        noop!(merge_merge_request(project_id: &str, mr_iid: &str, body: &Value));
        noop!(get_merge_request_diffs(project_id: &str, mr_iid: &str));
        noop!(create_merge_request_note(project_id: &str, mr_iid: &str, body: &Value));
        async fn get_current_user(&self, _ctx: &RequestContext) -> crate::error::BridgeResult<Value> {
            Ok(json!({}))
        }
        noop!(search_users(query: &Value));
        noop!(list_pipelines(project_id: &str));
        noop!(get_pipeline(project_id: &str, pipeline_id: &str));
        noop!(create_pipeline(project_id: &str, body: &Value));
        noop!(retry_pipeline(project_id: &str, pipeline_id: &str));
        noop!(cancel_pipeline(project_id: &str, pipeline_id: &str));
        noop!(list_releases(project_id: &str));
        noop!(get_release(project_id: &str, tag_name: &str));
        noop!(create_release(project_id: &str, body: &Value));
        noop!(list_milestones(project_id: &str));
        noop!(create_milestone(project_id: &str, body: &Value));
        noop!(list_wiki_pages(project_id: &str));
        noop!(get_wiki_page(project_id: &str, slug: &str));
        noop!(create_wiki_page(project_id: &str, body: &Value));
        noop!(upload_file(project_id: &str, body: &Value));
        async fn execute_graphql(&self, _ctx: &RequestContext, _query: &str, _variables: &Value) -> crate::error::BridgeResult<Value> {
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn scenario_2_feature_gated_tools_are_unregistered_not_hidden() {
        let policy = PolicyEngine::new(PolicyConfig::default());
        let pipeline = Arc::new(Pipeline::new(
            PolicyEngine::new(PolicyConfig::default()),
            Arc::new(NoopUpstream),
            FormatOptions::default(),
            ErrorDetailMode::Full,
        ));
        let server = McpServer::new(pipeline, &policy);
        let list = server.list_tools();
        let names: Vec<&str> = list["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"gitlab_get_project"));
        assert!(!names.contains(&"gitlab_get_wiki_page"));
    }
}
