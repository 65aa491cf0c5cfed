//! gitlab-mcp-bridge CLI entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use gitlab_mcp_bridge::auth::{AuthContext, AuthHeader};
use gitlab_mcp_bridge::config::AppConfig;
use gitlab_mcp_bridge::http::{self, AppState};
use gitlab_mcp_bridge::pipeline::Pipeline;
use gitlab_mcp_bridge::policy::PolicyEngine;
use gitlab_mcp_bridge::runtime::RequestRuntime;
use gitlab_mcp_bridge::server::{self, McpServer};
use gitlab_mcp_bridge::session::SessionManager;
use gitlab_mcp_bridge::upstream::GitLabClient;

/// GitLab MCP bridge server: exposes GitLab as Model Context Protocol tools.
#[derive(Debug, Parser)]
#[command(name = "gitlab-mcp-bridge", version)]
struct Cli {
    /// Path to a dotenv file to load before reading configuration.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Run the long-lived HTTP server instead of the stdio transport.
    #[arg(long)]
    http: bool,
}

fn load_env_file(path: Option<&PathBuf>) -> Result<(), String> {
    match path {
        Some(path) => dotenvy::from_path(path).map_err(|e| e.to_string()),
        None => {
            // No explicit --env-file: load the default dotenv if present,
            // but a missing default file is not an error.
            let _ = dotenvy::dotenv();
            Ok(())
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    if let Err(e) = load_env_file(cli.env_file.as_ref()) {
        eprintln!("failed to load env file: {e}");
        return std::process::ExitCode::FAILURE;
    }

    init_logging();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    if let Err(e) = run(config, cli.http).await {
        tracing::error!(error = %e, "fatal error");
        return std::process::ExitCode::FAILURE;
    }

    std::process::ExitCode::SUCCESS
}

async fn run(config: AppConfig, http_mode: bool) -> anyhow::Result<()> {
    let token = config.upstream.token.clone();
    let http_config = config.http.clone();

    let runtime = Arc::new(RequestRuntime::new(config.network)?);
    let upstream = Arc::new(GitLabClient::new(runtime, config.upstream.api_urls));

    let registration_policy = PolicyEngine::new(config.policy.clone());
    let pipeline = Arc::new(Pipeline::new(
        PolicyEngine::new(config.policy),
        upstream,
        config.format_options,
        config.error_detail,
    ));
    let mcp_server = McpServer::new(Arc::clone(&pipeline), &registration_policy);

    if http_mode {
        run_http_mode(mcp_server, http_config).await
    } else {
        run_stdio_mode(mcp_server, token).await
    }
}

async fn run_stdio_mode(server: McpServer, token: Option<String>) -> anyhow::Result<()> {
    let auth = token.map(|t| AuthContext::new(t, AuthHeader::PrivateToken));
    server::run_stdio(server, auth).await?;
    Ok(())
}

async fn run_http_mode(
    mcp_server: McpServer,
    http_config: gitlab_mcp_bridge::config::HttpServerConfig,
) -> anyhow::Result<()> {
    let sessions = Arc::new(SessionManager::new(
        http_config.max_sessions,
        http_config.session_timeout(),
    ));
    let _gc_handle = sessions.spawn_gc_loop();

    let state = Arc::new(AppState {
        server: Arc::new(mcp_server),
        sessions: Arc::clone(&sessions),
        config: http_config.clone(),
    });

    let app = http::router(state);
    let addr = format!("{}:{}", http_config.host, http_config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "gitlab-mcp-bridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sessions))
        .await?;

    Ok(())
}

async fn shutdown_signal(sessions: Arc<SessionManager>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutting down, closing all sessions");
    sessions.close_all().await;
}
