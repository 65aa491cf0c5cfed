//! Per-request auth propagation (§5 "Per-request propagation").
//!
//! `AuthContext` travels from the HTTP layer (C10) or stdio startup, through
//! the session (C9), into the tool pipeline (C7), down to `beforeRequest`
//! (C6) and the upstream client (C5) — without being threaded explicitly
//! through every handler signature. We realize the task-local store the
//! design notes call for with `tokio::task_local!`: entering the pipeline
//! binds it, the binding is inherited across any `.await` within that same
//! task, and it is cleared when the handler returns.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use crate::error::{BridgeError, SessionError};

/// Which header the upstream request should carry the token in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthHeader {
    /// `Authorization: Bearer <token>`.
    Authorization,
    /// `PRIVATE-TOKEN: <token>` — the stdio-mode default.
    PrivateToken,
    /// `JOB-TOKEN: <token>`.
    JobToken,
}

impl AuthHeader {
    pub fn header_name(self) -> &'static str {
        match self {
            Self::Authorization => "Authorization",
            Self::PrivateToken => "PRIVATE-TOKEN",
            Self::JobToken => "JOB-TOKEN",
        }
    }

    pub fn header_value(self, token: &str) -> String {
        match self {
            Self::Authorization => format!("Bearer {token}"),
            Self::PrivateToken | Self::JobToken => token.to_string(),
        }
    }
}

/// Per-session credentials, created once at `initialize` and never mutated
/// (`spec.md` §3 "AuthContext").
#[derive(Clone)]
pub struct AuthContext {
    token: SecretString,
    pub header: AuthHeader,
    pub api_url_override: Option<url::Url>,
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &"[REDACTED]")
            .field("header", &self.header)
            .field("api_url_override", &self.api_url_override)
            .finish()
    }
}

impl AuthContext {
    pub fn new(token: impl Into<String>, header: AuthHeader) -> Self {
        Self {
            token: SecretString::from(token.into()),
            header,
            api_url_override: None,
        }
    }

    pub fn with_api_url_override(mut self, url: Option<url::Url>) -> Self {
        self.api_url_override = url;
        self
    }

    /// Expose the raw token — the only place in the codebase allowed to see
    /// it in plaintext, when building the outgoing request.
    pub fn expose_token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn header_value(&self) -> String {
        self.header.header_value(self.expose_token())
    }
}

/// The value carried by the task-local during a single tool invocation:
/// the session's auth plus whether a dynamic API URL override is permitted.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub auth: Option<AuthContext>,
    pub enable_dynamic_api_url: bool,
}

impl RequestContext {
    /// Context for stdio mode: a single static binding installed at startup.
    pub fn stdio(auth: Option<AuthContext>) -> Self {
        Self {
            auth,
            enable_dynamic_api_url: false,
        }
    }

    pub fn resolved_api_url_override(&self) -> Option<&url::Url> {
        if !self.enable_dynamic_api_url {
            return None;
        }
        self.auth.as_ref().and_then(|a| a.api_url_override.as_ref())
    }

    pub fn require_auth(&self) -> Result<&AuthContext, BridgeError> {
        self.auth
            .as_ref()
            .ok_or(BridgeError::Session(SessionError::MissingRemoteAuthorization))
    }
}

tokio::task_local! {
    static CURRENT_REQUEST_CONTEXT: RequestContext;
}

/// Run `f` with `ctx` bound to the task-local for the duration of the
/// invocation, including across any `.await` points inside `f`.
pub async fn with_request_context<F, Fut, T>(ctx: RequestContext, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    CURRENT_REQUEST_CONTEXT.scope(ctx, f()).await
}

/// Read the currently bound request context. Panics if called outside of
/// [`with_request_context`] — every entry point into the pipeline binds one
/// before calling into C6/C5, so this is a programming-error invariant, not
/// a recoverable condition.
pub fn current() -> RequestContext {
    CURRENT_REQUEST_CONTEXT.with(Clone::clone)
}
