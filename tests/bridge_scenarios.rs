//! End-to-end scenario tests exercised through the crate's public API,
//! covering the paths that span more than one module (`spec.md` §8).

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use gitlab_mcp_bridge::auth::{self, RequestContext};
use gitlab_mcp_bridge::config::HttpServerConfig;
use gitlab_mcp_bridge::error::{BridgeResult, ErrorDetailMode};
use gitlab_mcp_bridge::format::FormatOptions;
use gitlab_mcp_bridge::http::{router, AppState};
use gitlab_mcp_bridge::pipeline::Pipeline;
use gitlab_mcp_bridge::policy::{PolicyConfig, PolicyEngine};
use gitlab_mcp_bridge::server::McpServer;
use gitlab_mcp_bridge::session::SessionManager;
use gitlab_mcp_bridge::upstream::GitLabUpstream;

/// An upstream stub whose error body carries a credential-shaped secret, so
/// scenario 5 can assert it never reaches the client.
struct LeakyUpstream;

macro_rules! unimplemented_method {
    ($name:ident($($arg:ident: $ty:ty),*)) => {
        async fn $name(&self, _ctx: &RequestContext, $($arg: $ty),*) -> BridgeResult<Value> {
            unreachable!("not exercised by this scenario")
        }
    };
}

#[async_trait]
impl GitLabUpstream for LeakyUpstream {
    async fn get_project(&self, _ctx: &RequestContext, _project_id: &str) -> BridgeResult<Value> {
        Err(gitlab_mcp_bridge::error::BridgeError::gitlab_api(
            401,
            json!({"message": "glpat-abcdefghijklmnop rejected"}),
        ))
    }
    unimplemented_method!(list_projects(query: &Value));
    unimplemented_method!(search_projects(query: &Value));
    unimplemented_method!(list_project_members(project_id: &str));
    unimplemented_method!(list_commits(project_id: &str));
    unimplemented_method!(get_commit(project_id: &str, sha: &str));
    unimplemented_method!(get_file_contents(project_id: &str, file_path: &str, ref_: &str));
    unimplemented_method!(create_or_update_file(project_id: &str, body: &Value));
    unimplemented_method!(push_files(project_id: &str, body: &Value));
    unimplemented_method!(create_branch(project_id: &str, body: &Value));
    unimplemented_method!(list_branches(project_id: &str));
    unimplemented_method!(list_issues(project_id: &str));
    unimplemented_method!(get_issue(project_id: &str, issue_iid: &str));
    unimplemented_method!(create_issue(project_id: &str, body: &Value));
    unimplemented_method!(update_issue(project_id: &str, issue_iid: &str, body: &Value));
    unimplemented_method!(create_issue_note(project_id: &str, issue_iid: &str, body: &Value));
    unimplemented_method!(list_issue_notes(project_id: &str, issue_iid: &str));
    unimplemented_method!(list_merge_requests(project_id: &str));
    unimplemented_method!(get_merge_request(project_id: &str, mr_iid: &str));
    unimplemented_method!(create_merge_request(project_id: &str, body: &Value));
    unimplemented_method!(update_merge_request(project_id: &str, mr_iid: &str, body: &Value));
    unimplemented_method!(merge_merge_request(project_id: &str, mr_iid: &str, body: &Value));
    unimplemented_method!(get_merge_request_diffs(project_id: &str, mr_iid: &str));
    unimplemented_method!(create_merge_request_note(project_id: &str, mr_iid: &str, body: &Value));
    async fn get_current_user(&self, _ctx: &RequestContext) -> BridgeResult<Value> {
        Ok(json!({}))
    }
    unimplemented_method!(search_users(query: &Value));
    unimplemented_method!(list_pipelines(project_id: &str));
    unimplemented_method!(get_pipeline(project_id: &str, pipeline_id: &str));
    unimplemented_method!(create_pipeline(project_id: &str, body: &Value));
    unimplemented_method!(retry_pipeline(project_id: &str, pipeline_id: &str));
    unimplemented_method!(cancel_pipeline(project_id: &str, pipeline_id: &str));
    unimplemented_method!(list_releases(project_id: &str));
    unimplemented_method!(get_release(project_id: &str, tag_name: &str));
    unimplemented_method!(create_release(project_id: &str, body: &Value));
    unimplemented_method!(list_milestones(project_id: &str));
    unimplemented_method!(create_milestone(project_id: &str, body: &Value));
    unimplemented_method!(list_wiki_pages(project_id: &str));
    unimplemented_method!(get_wiki_page(project_id: &str, slug: &str));
    unimplemented_method!(create_wiki_page(project_id: &str, body: &Value));
    unimplemented_method!(upload_file(project_id: &str, body: &Value));
    async fn execute_graphql(&self, _ctx: &RequestContext, _query: &str, _variables: &Value) -> BridgeResult<Value> {
        Ok(json!({}))
    }
}

/// Scenario 5: a GitLab error body containing a personal access token must
/// never reach the MCP client, even in `ErrorDetailMode::Full`, because the
/// redactor (C3) runs over every error's rendered text before it becomes
/// tool output.
#[tokio::test]
async fn scenario_5_safe_mode_redacts_leaked_credentials_in_error_text() {
    let pipeline = Pipeline::new(
        PolicyEngine::new(PolicyConfig::default()),
        Arc::new(LeakyUpstream),
        FormatOptions::default(),
        ErrorDetailMode::Full,
    );

    let result = auth::with_request_context(RequestContext::stdio(None), || {
        pipeline.invoke("gitlab_get_project", json!({"project_id": "1"}))
    })
    .await;

    assert!(result.is_error);
    let text = &result.content[0].text;
    assert!(!text.contains("glpat-"), "leaked token survived redaction: {text}");
    assert!(text.contains("401"));
}

fn test_http_config() -> HttpServerConfig {
    HttpServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        json_only: false,
        sse_enabled: false,
        max_sessions: 10,
        session_timeout_seconds: 300,
        max_requests_per_minute: 600,
        remote_authorization: false,
        enable_dynamic_api_url: false,
    }
}

/// Scenario 6, exercised through real axum routing: `initialize` mints a
/// session id, a follow-up `tools/list` using that id succeeds, and a
/// `DELETE /mcp` for an unknown session reports not-found.
#[tokio::test]
async fn scenario_6_http_session_lifecycle_through_router() {
    let policy = PolicyEngine::new(PolicyConfig::default());
    let pipeline = Arc::new(Pipeline::new(
        PolicyEngine::new(PolicyConfig::default()),
        Arc::new(LeakyUpstream),
        FormatOptions::default(),
        ErrorDetailMode::Full,
    ));
    let server = Arc::new(McpServer::new(pipeline, &policy));
    let sessions = Arc::new(SessionManager::new(10, std::time::Duration::from_secs(300)));
    let state = Arc::new(AppState {
        server,
        sessions,
        config: test_http_config(),
    });
    let app = router(state);

    let init_request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}).to_string(),
        ))
        .unwrap();
    let init_response = app.clone().oneshot(init_request).await.unwrap();
    assert_eq!(init_response.status(), StatusCode::OK);
    let session_id = init_response
        .headers()
        .get("mcp-session-id")
        .expect("initialize must return a session id")
        .to_str()
        .unwrap()
        .to_string();

    let list_request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("mcp-session-id", &session_id)
        .body(Body::from(
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}).to_string(),
        ))
        .unwrap();
    let list_response = app.clone().oneshot(list_request).await.unwrap();
    assert_eq!(list_response.status(), StatusCode::OK);

    let delete_unknown = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header("mcp-session-id", "not-a-real-session")
        .body(Body::empty())
        .unwrap();
    let delete_response = app.oneshot(delete_unknown).await.unwrap();
    assert_eq!(delete_response.status(), StatusCode::NOT_FOUND);
}

/// `/healthz` never requires a session and always reports capacity.
#[tokio::test]
async fn healthz_reports_capacity_without_a_session() {
    let policy = PolicyEngine::new(PolicyConfig::default());
    let pipeline = Arc::new(Pipeline::new(
        PolicyEngine::new(PolicyConfig::default()),
        Arc::new(LeakyUpstream),
        FormatOptions::default(),
        ErrorDetailMode::Full,
    ));
    let server = Arc::new(McpServer::new(pipeline, &policy));
    let sessions = Arc::new(SessionManager::new(5, std::time::Duration::from_secs(300)));
    let state = Arc::new(AppState {
        server,
        sessions,
        config: test_http_config(),
    });
    let app = router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
