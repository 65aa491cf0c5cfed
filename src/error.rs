//! Error taxonomy for the bridge
//!
//! Every error that can occur while serving a tool call is folded into
//! [`BridgeError`] before it crosses the pipeline boundary (see
//! `spec.md` §7). Handler code should prefer the `From` impls and the
//! `bridge_*` constructors below over constructing variants directly.

use thiserror::Error;

/// Result type used throughout the bridge.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Error detail mode controlling how much of an upstream error is surfaced
/// to the MCP client (`GITLAB_ERROR_DETAIL_MODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorDetailMode {
    /// Include the (redacted) upstream body in error text.
    #[default]
    Full,
    /// Omit the upstream body entirely.
    Safe,
}

impl std::str::FromStr for ErrorDetailMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> BridgeResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "safe" => Ok(Self::Safe),
            other => Err(BridgeError::configuration(format!(
                "invalid GITLAB_ERROR_DETAIL_MODE: {other}"
            ))),
        }
    }
}

/// Top-level error type for the bridge.
///
/// Mirrors the taxonomy in `spec.md` §7: `PolicyDenied`, `ValidationError`,
/// `GitLabApiError`, `NetworkError`/`TimeoutError`, `ProtocolError`, and
/// `InternalError` (the catch-all `Internal` variant below).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    /// A tool was not enabled under the current policy.
    #[error("tool disabled by policy")]
    PolicyDenied,

    /// An argument failed schema validation. Never redacted — it cannot
    /// contain upstream secrets, only client-supplied shapes.
    #[error("invalid argument `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// Upstream GitLab returned a non-2xx response.
    #[error("GitLab API error {status}")]
    GitLabApi {
        status: u16,
        body: serde_json::Value,
    },

    /// The upstream request could not be sent (DNS, connection refused, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The upstream request exceeded its deadline.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// Malformed JSON-RPC or MCP envelope at the transport boundary.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration was invalid at startup.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Session-layer failure (unknown id, capacity, missing header).
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Anything else unexpected.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn gitlab_api(status: u16, body: serde_json::Value) -> Self {
        Self::GitLabApi { status, body }
    }

    /// Render the text that goes into the tool's `isError` content,
    /// respecting `spec.md` §4.7 step 6's per-kind formatting rules.
    /// The caller is still responsible for passing the result through the
    /// secret redactor (C3) before returning it to the client.
    pub fn to_tool_text(&self, detail: ErrorDetailMode) -> String {
        match self {
            Self::PolicyDenied => "tool disabled by policy".to_string(),
            Self::Validation { field, reason } => {
                format!("invalid argument `{field}`: {reason}")
            }
            Self::GitLabApi { status, body } => match detail {
                ErrorDetailMode::Full => {
                    format!("GitLab API error {status}: {body}")
                }
                ErrorDetailMode::Safe => format!("GitLab API error {status}"),
            },
            Self::Network(_) | Self::Timeout(_) => match detail {
                ErrorDetailMode::Full => self.to_string(),
                ErrorDetailMode::Safe => "Request failed".to_string(),
            },
            Self::Protocol(msg) => msg.clone(),
            Self::Configuration { message } => message.clone(),
            Self::Session(e) => e.to_string(),
            Self::Internal(_) => "Unknown error".to_string(),
        }
    }
}

/// Errors from the session layer (C9), each bound to a JSON-RPC error code
/// per `spec.md` §6.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("missing mcp-session-id header")]
    MissingSessionId,
    #[error("unknown session")]
    UnknownSession,
    #[error("session capacity exceeded")]
    CapacityExceeded,
    #[error("missing remote authorization token")]
    MissingRemoteAuthorization,
    #[error("missing X-GitLab-API-URL header")]
    MissingApiUrl,
}

impl SessionError {
    /// JSON-RPC error code assigned in `spec.md` §6.
    pub fn rpc_code(self) -> i64 {
        match self {
            Self::MissingSessionId => -32000,
            Self::UnknownSession => -32001,
            Self::CapacityExceeded => -32002,
            Self::MissingRemoteAuthorization => -32010,
            Self::MissingApiUrl => -32011,
        }
    }

    /// HTTP status paired with the JSON-RPC code.
    pub fn http_status(self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::MissingSessionId => StatusCode::BAD_REQUEST,
            Self::UnknownSession => StatusCode::NOT_FOUND,
            Self::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingRemoteAuthorization => StatusCode::UNAUTHORIZED,
            Self::MissingApiUrl => StatusCode::BAD_REQUEST,
        }
    }
}
