//! `reqwest`-backed implementation of [`GitLabUpstream`].

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::auth::RequestContext;
use crate::error::{BridgeError, BridgeResult};
use crate::runtime::SharedRuntime;
use crate::sanitize::strip_nulls;

use super::GitLabUpstream;

/// Talks to one or more GitLab API base URLs. Multiple `apiUrls` are tried
/// in order starting from a round-robin cursor, stopping at the first
/// success; the contract only requires at-most-one successful call and
/// predictable iteration order for error reporting (`spec.md` §4.5).
pub struct GitLabClient {
    runtime: SharedRuntime,
    api_urls: Vec<url::Url>,
    cursor: AtomicUsize,
}

impl GitLabClient {
    pub fn new(runtime: SharedRuntime, api_urls: Vec<url::Url>) -> Self {
        assert!(!api_urls.is_empty(), "at least one GITLAB_API_URL is required");
        Self {
            runtime,
            api_urls,
            cursor: AtomicUsize::new(0),
        }
    }

    /// The ordered list of base URLs to try this call, starting from the
    /// current round-robin cursor and wrapping around.
    fn iteration_order(&self, ctx: &RequestContext) -> Vec<url::Url> {
        if let Some(override_url) = ctx.resolved_api_url_override() {
            return vec![override_url.clone()];
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % self.api_urls.len();
        self.api_urls
            .iter()
            .cycle()
            .skip(start)
            .take(self.api_urls.len())
            .cloned()
            .collect()
    }

    async fn request(
        &self,
        ctx: &RequestContext,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> BridgeResult<Value> {
        let headers = self.runtime.before_request(ctx).await?;
        let mut last_err: Option<BridgeError> = None;

        for base in self.iteration_order(ctx) {
            let url = base
                .join(path)
                .map_err(|e| BridgeError::internal(format!("invalid path {path}: {e}")))?;

            let mut req = self
                .runtime
                .http_client()
                .request(method.clone(), url)
                .headers(headers.clone());
            if let Some(body) = body {
                req = req.json(body);
            }

            let result = req.send().await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body: Value = response.json().await.unwrap_or(Value::Null);
                        return Ok(strip_nulls(&body));
                    }
                    let body: Value = response
                        .json()
                        .await
                        .unwrap_or_else(|_| Value::String(String::new()));
                    return Err(BridgeError::GitLabApi {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(BridgeError::Timeout(self.runtime.timeout_ms()));
                }
                Err(e) => {
                    last_err = Some(BridgeError::Network(e.to_string()));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| BridgeError::internal("no api urls configured")))
    }

    async fn get(&self, ctx: &RequestContext, path: &str) -> BridgeResult<Value> {
        self.request(ctx, reqwest::Method::GET, path, None).await
    }

    async fn post(&self, ctx: &RequestContext, path: &str, body: &Value) -> BridgeResult<Value> {
        self.request(ctx, reqwest::Method::POST, path, Some(body))
            .await
    }

    async fn put(&self, ctx: &RequestContext, path: &str, body: &Value) -> BridgeResult<Value> {
        self.request(ctx, reqwest::Method::PUT, path, Some(body))
            .await
    }
}

/// Percent-encoding for path segments containing `/`, matching GitLab's
/// convention of namespaced project paths (e.g. `group/sub/project`).
fn encode_id(id: &str) -> String {
    url::form_urlencoded::byte_serialize(id.as_bytes()).collect()
}

#[async_trait]
impl GitLabUpstream for GitLabClient {
    async fn get_project(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}", encode_id(project_id)))
            .await
    }

    async fn list_projects(&self, ctx: &RequestContext, _query: &Value) -> BridgeResult<Value> {
        self.get(ctx, "projects").await
    }

    async fn search_projects(&self, ctx: &RequestContext, query: &Value) -> BridgeResult<Value> {
        let term = query.get("search").and_then(Value::as_str).unwrap_or("");
        self.get(ctx, &format!("projects?search={term}")).await
    }

    async fn list_project_members(
        &self,
        ctx: &RequestContext,
        project_id: &str,
    ) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/members", encode_id(project_id)))
            .await
    }

    async fn list_commits(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/repository/commits", encode_id(project_id)))
            .await
    }

    async fn get_commit(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        sha: &str,
    ) -> BridgeResult<Value> {
        self.get(
            ctx,
            &format!("projects/{}/repository/commits/{sha}", encode_id(project_id)),
        )
        .await
    }

    async fn get_file_contents(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        file_path: &str,
        ref_: &str,
    ) -> BridgeResult<Value> {
        self.get(
            ctx,
            &format!(
                "projects/{}/repository/files/{}?ref={ref_}",
                encode_id(project_id),
                encode_id(file_path)
            ),
        )
        .await
    }

    async fn create_or_update_file(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        let file_path = body.get("file_path").and_then(Value::as_str).unwrap_or("");
        self.put(
            ctx,
            &format!(
                "projects/{}/repository/files/{}",
                encode_id(project_id),
                encode_id(file_path)
            ),
            body,
        )
        .await
    }

    async fn push_files(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.post(
            ctx,
            &format!("projects/{}/repository/commits", encode_id(project_id)),
            body,
        )
        .await
    }

    async fn create_branch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.post(ctx, &format!("projects/{}/repository/branches", encode_id(project_id)), body)
            .await
    }

    async fn list_branches(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/repository/branches", encode_id(project_id)))
            .await
    }

    async fn list_issues(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/issues", encode_id(project_id)))
            .await
    }

    async fn get_issue(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        issue_iid: &str,
    ) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/issues/{issue_iid}", encode_id(project_id)))
            .await
    }

    async fn create_issue(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.post(ctx, &format!("projects/{}/issues", encode_id(project_id)), body)
            .await
    }

    async fn update_issue(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        issue_iid: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.put(ctx, &format!("projects/{}/issues/{issue_iid}", encode_id(project_id)), body)
            .await
    }

    async fn create_issue_note(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        issue_iid: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.post(
            ctx,
            &format!("projects/{}/issues/{issue_iid}/notes", encode_id(project_id)),
            body,
        )
        .await
    }

    async fn list_issue_notes(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        issue_iid: &str,
    ) -> BridgeResult<Value> {
        self.get(
            ctx,
            &format!("projects/{}/issues/{issue_iid}/notes", encode_id(project_id)),
        )
        .await
    }

    async fn list_merge_requests(
        &self,
        ctx: &RequestContext,
        project_id: &str,
    ) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/merge_requests", encode_id(project_id)))
            .await
    }

    async fn get_merge_request(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        mr_iid: &str,
    ) -> BridgeResult<Value> {
        self.get(
            ctx,
            &format!("projects/{}/merge_requests/{mr_iid}", encode_id(project_id)),
        )
        .await
    }

    async fn create_merge_request(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.post(ctx, &format!("projects/{}/merge_requests", encode_id(project_id)), body)
            .await
    }

    async fn update_merge_request(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        mr_iid: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.put(
            ctx,
            &format!("projects/{}/merge_requests/{mr_iid}", encode_id(project_id)),
            body,
        )
        .await
    }

    async fn merge_merge_request(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        mr_iid: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.put(
            ctx,
            &format!("projects/{}/merge_requests/{mr_iid}/merge", encode_id(project_id)),
            body,
        )
        .await
    }

    async fn get_merge_request_diffs(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        mr_iid: &str,
    ) -> BridgeResult<Value> {
        self.get(
            ctx,
            &format!("projects/{}/merge_requests/{mr_iid}/diffs", encode_id(project_id)),
        )
        .await
    }

    async fn create_merge_request_note(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        mr_iid: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.post(
            ctx,
            &format!("projects/{}/merge_requests/{mr_iid}/notes", encode_id(project_id)),
            body,
        )
        .await
    }

    async fn get_current_user(&self, ctx: &RequestContext) -> BridgeResult<Value> {
        self.get(ctx, "user").await
    }

    async fn search_users(&self, ctx: &RequestContext, query: &Value) -> BridgeResult<Value> {
        let term = query.get("search").and_then(Value::as_str).unwrap_or("");
        self.get(ctx, &format!("users?search={term}")).await
    }

    async fn list_pipelines(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/pipelines", encode_id(project_id)))
            .await
    }

    async fn get_pipeline(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        pipeline_id: &str,
    ) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/pipelines/{pipeline_id}", encode_id(project_id)))
            .await
    }

    async fn create_pipeline(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.post(ctx, &format!("projects/{}/pipeline", encode_id(project_id)), body)
            .await
    }

    async fn retry_pipeline(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        pipeline_id: &str,
    ) -> BridgeResult<Value> {
        self.post(
            ctx,
            &format!("projects/{}/pipelines/{pipeline_id}/retry", encode_id(project_id)),
            &Value::Null,
        )
        .await
    }

    async fn cancel_pipeline(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        pipeline_id: &str,
    ) -> BridgeResult<Value> {
        self.post(
            ctx,
            &format!("projects/{}/pipelines/{pipeline_id}/cancel", encode_id(project_id)),
            &Value::Null,
        )
        .await
    }

    async fn list_releases(&self, ctx: &RequestContext, project_id: &str) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/releases", encode_id(project_id)))
            .await
    }

    async fn get_release(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        tag_name: &str,
    ) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/releases/{tag_name}", encode_id(project_id)))
            .await
    }

    async fn create_release(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.post(ctx, &format!("projects/{}/releases", encode_id(project_id)), body)
            .await
    }

    async fn list_milestones(
        &self,
        ctx: &RequestContext,
        project_id: &str,
    ) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/milestones", encode_id(project_id)))
            .await
    }

    async fn create_milestone(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.post(ctx, &format!("projects/{}/milestones", encode_id(project_id)), body)
            .await
    }

    async fn list_wiki_pages(
        &self,
        ctx: &RequestContext,
        project_id: &str,
    ) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/wikis", encode_id(project_id)))
            .await
    }

    async fn get_wiki_page(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        slug: &str,
    ) -> BridgeResult<Value> {
        self.get(ctx, &format!("projects/{}/wikis/{slug}", encode_id(project_id)))
            .await
    }

    async fn create_wiki_page(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.post(ctx, &format!("projects/{}/wikis", encode_id(project_id)), body)
            .await
    }

    async fn upload_file(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        body: &Value,
    ) -> BridgeResult<Value> {
        self.post(ctx, &format!("projects/{}/uploads", encode_id(project_id)), body)
            .await
    }

    async fn execute_graphql(
        &self,
        ctx: &RequestContext,
        query: &str,
        variables: &Value,
    ) -> BridgeResult<Value> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        self.post(ctx, "graphql", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::runtime::RequestRuntime;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> GitLabClient {
        let config = NetworkConfig {
            http_timeout_ms: 5_000,
            user_agent: "test-agent".to_string(),
            accept_language: None,
            cloudflare_bypass: false,
            cookie_warmup_path: None,
            token_cache_seconds: 60,
            accept_invalid_certs: false,
            ca_cert_path: None,
            http_proxy: None,
            https_proxy: None,
            api_urls: vec![url::Url::parse(&server.uri()).unwrap()],
        };
        let runtime = Arc::new(RequestRuntime::new(config).unwrap());
        GitLabClient::new(runtime, vec![url::Url::parse(&server.uri()).unwrap()])
    }

    #[tokio::test]
    async fn scenario_4_upstream_404_is_surfaced_as_gitlab_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/missing%2Fproject"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let ctx = RequestContext::stdio(None);
        let err = client.get_project(&ctx, "missing/project").await.unwrap_err();
        match err {
            BridgeError::GitLabApi { status, .. } => assert_eq!(status, 404),
            other => panic!("expected GitLabApi, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_response_has_nulls_stripped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": 1, "description": null})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let ctx = RequestContext::stdio(None);
        let body = client.get_project(&ctx, "1").await.unwrap();
        assert_eq!(body, serde_json::json!({"id": 1}));
    }
}
