//! HTTP front (C10)
//!
//! Routes `POST/GET/DELETE /mcp`, `/healthz`, and optionally `/sse`; parses
//! auth headers; dispatches into the session manager (C9) and, through it,
//! into the MCP server adapter (C8) (`spec.md` §4.10).

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use serde_json::{json, Value};

use crate::auth::{self, AuthContext, AuthHeader, RequestContext};
use crate::config::HttpServerConfig;
use crate::error::SessionError;
use crate::server::McpServer;
use crate::session::{Admission, SessionKind, SessionManager};

pub struct AppState {
    pub server: Arc<McpServer>,
    pub sessions: Arc<SessionManager>,
    pub config: HttpServerConfig,
}

pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/mcp", post(post_mcp).get(get_mcp).delete(delete_mcp))
        .route("/healthz", get(healthz));

    if state.config.sse_enabled {
        router = router.route("/sse", get(get_sse));
    }

    router.with_state(state)
}

fn jsonrpc_error(id: Value, err: SessionError) -> (StatusCode, Json<Value>) {
    (
        err.http_status(),
        Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": err.rpc_code(), "message": err.to_string() }
        })),
    )
}

/// Reads `Authorization: Bearer`, `Private-Token`, or `Job-Token` headers,
/// in that order, and the dynamic API URL override header when permitted
/// (`spec.md` §4.10 "Auth extraction").
fn extract_auth(
    headers: &HeaderMap,
    config: &HttpServerConfig,
) -> Result<Option<AuthContext>, SessionError> {
    if !config.remote_authorization {
        return Ok(None);
    }

    let (header, token) = if let Some(v) = headers.get("Authorization").and_then(|v| v.to_str().ok())
        && let Some(token) = v.strip_prefix("Bearer ")
    {
        (AuthHeader::Authorization, token.to_string())
    } else if let Some(v) = headers.get("Private-Token").and_then(|v| v.to_str().ok()) {
        (AuthHeader::PrivateToken, v.to_string())
    } else if let Some(v) = headers.get("Job-Token").and_then(|v| v.to_str().ok()) {
        (AuthHeader::JobToken, v.to_string())
    } else {
        return Err(SessionError::MissingRemoteAuthorization);
    };

    let mut auth = AuthContext::new(token, header);

    if config.enable_dynamic_api_url {
        let url = headers
            .get("X-GitLab-API-URL")
            .and_then(|v| v.to_str().ok())
            .ok_or(SessionError::MissingApiUrl)?;
        let parsed = url::Url::parse(url).map_err(|_| SessionError::MissingApiUrl)?;
        auth = auth.with_api_url_override(Some(parsed));
    }

    Ok(Some(auth))
}

async fn post_mcp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let id = body.get("id").cloned().unwrap_or(Value::Null);
    let method = body.get("method").and_then(Value::as_str).unwrap_or("");
    let session_header = headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if method == "initialize" {
        let auth = match extract_auth(&headers, &state.config) {
            Ok(auth) => auth,
            Err(e) => return jsonrpc_error(id, e).into_response(),
        };

        if state.sessions.admit(SessionKind::Streamable).await == Admission::CapacityExceeded {
            return jsonrpc_error(id, SessionError::CapacityExceeded).into_response();
        }

        let session = state
            .sessions
            .on_initialize(SessionKind::Streamable, auth)
            .await;

        let mut response = Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "serverInfo": { "name": "gitlab-mcp-bridge" } }
        }))
        .into_response();
        response
            .headers_mut()
            .insert("mcp-session-id", session.id.parse().unwrap());
        return response;
    }

    let Some(session_id) = session_header else {
        return jsonrpc_error(id, SessionError::MissingSessionId).into_response();
    };

    let session = match state.sessions.lookup(&session_id).await {
        Ok(session) => session,
        Err(e) => return jsonrpc_error(id, e).into_response(),
    };

    let ctx = RequestContext {
        auth: session.auth.clone(),
        enable_dynamic_api_url: state.config.enable_dynamic_api_url,
    };

    let result = auth::with_request_context(ctx, || async {
        if method == "tools/list" {
            state.server.list_tools()
        } else {
            let params = body.get("params").cloned().unwrap_or(Value::Null);
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let args = params.get("arguments").cloned().unwrap_or(json!({}));
            state.server.call_tool(name, args).await
        }
    })
    .await;

    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
}

async fn get_mcp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, (StatusCode, Json<Value>)> {
    let session_id = headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| jsonrpc_error(Value::Null, SessionError::MissingSessionId))?;

    state
        .sessions
        .lookup(session_id)
        .await
        .map_err(|e| jsonrpc_error(Value::Null, e))?;

    let stream = stream::once(async { Ok(Event::default().event("ready").data("1")) });
    Ok(Sse::new(stream))
}

async fn get_sse(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, StatusCode> {
    if state.sessions.admit(SessionKind::Sse).await == Admission::CapacityExceeded {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    let session = state.sessions.on_initialize(SessionKind::Sse, None).await;
    let stream = stream::once(async move { Ok(Event::default().event("session").data(session.id.clone())) });
    Ok(Sse::new(stream))
}

async fn delete_mcp(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let Some(session_id) = headers.get("mcp-session-id").and_then(|v| v.to_str().ok()) else {
        return jsonrpc_error(Value::Null, SessionError::MissingSessionId).into_response();
    };

    match state.sessions.lookup(session_id).await {
        Ok(_) => {
            state.sessions.close(session_id, "client requested").await;
            StatusCode::OK.into_response()
        }
        Err(e) => jsonrpc_error(Value::Null, e).into_response(),
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "activeSessions": state.sessions.active_session_count().await,
        "maxSessions": state.sessions.max_sessions(),
        "remoteAuthorization": state.config.remote_authorization,
    }))
}
