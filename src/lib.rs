//! gitlab-mcp-bridge: a protocol-bridge server
//!
//! Exposes a catalog of tool calls over the Model Context Protocol and
//! translates each call into REST or GraphQL requests against an upstream
//! GitLab instance, streaming the shaped response back to the client. Runs
//! either as a stdio server (one client, one process) or as a long-lived
//! HTTP server multiplexing many concurrent sessions, each potentially
//! carrying its own upstream credential and API base URL.
//!
//! # Architecture
//!
//! ```text
//! HTTP front (http) ──▶ Session manager (session) ──▶ MCP server adapter (server)
//!                                                              │
//!                                                              ▼
//!                                                     Tool pipeline (pipeline)
//!                                                       │      │       │
//!                                              policy ◀─┘      │       └─▶ upstream client
//!                                                      format/sanitize/redact
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod config;
pub mod error;
pub mod format;
pub mod http;
pub mod pipeline;
pub mod policy;
pub mod redact;
pub mod runtime;
pub mod sanitize;
pub mod server;
pub mod session;
pub mod tools;
pub mod upstream;

pub use error::{BridgeError, BridgeResult};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP protocol version this bridge speaks at the `initialize` handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Commonly imported items.
pub mod prelude {
    pub use crate::auth::{AuthContext, AuthHeader, RequestContext};
    pub use crate::config::AppConfig;
    pub use crate::error::{BridgeError, BridgeResult, ErrorDetailMode};
    pub use crate::pipeline::Pipeline;
    pub use crate::policy::PolicyEngine;
    pub use crate::server::McpServer;
    pub use crate::session::SessionManager;
    pub use crate::upstream::{GitLabClient, GitLabUpstream};
}
