//! Configuration types and environment loading.
//!
//! Every name here is a contract (`spec.md` §6 "External interfaces"); the
//! env var names must not change. Parsing itself is intentionally simple —
//! this crate does not own a generic config framework, only the small
//! `GITLAB_*`/`HTTP_*` surface the rest of the bridge reads once at startup.

use std::time::Duration;

use crate::error::{BridgeError, BridgeResult, ErrorDetailMode};
use crate::format::{FormatOptions, ResponseMode};
use crate::policy::{Feature, PolicyConfig};

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_bool(name: &str, default: bool) -> bool {
    env_var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> BridgeResult<usize> {
    match env_var(name) {
        Some(v) => v
            .parse()
            .map_err(|_| BridgeError::configuration(format!("invalid {name}: {v}"))),
        None => Ok(default),
    }
}

fn env_u64(name: &str, default: u64) -> BridgeResult<u64> {
    match env_var(name) {
        Some(v) => v
            .parse()
            .map_err(|_| BridgeError::configuration(format!("invalid {name}: {v}"))),
        None => Ok(default),
    }
}

fn env_list(name: &str) -> Vec<String> {
    env_var(name)
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Resolves the personal access token from whichever of
/// `GITLAB_PERSONAL_ACCESS_TOKEN`, `GITLAB_TOKEN_FILE`, or
/// `GITLAB_TOKEN_SCRIPT` is set, in that priority order.
fn resolve_token() -> BridgeResult<Option<String>> {
    if let Some(token) = env_var("GITLAB_PERSONAL_ACCESS_TOKEN") {
        return Ok(Some(token));
    }
    if let Some(path) = env_var("GITLAB_TOKEN_FILE") {
        let token = std::fs::read_to_string(&path)
            .map_err(|e| BridgeError::configuration(format!("failed to read GITLAB_TOKEN_FILE: {e}")))?;
        return Ok(Some(token.trim().to_string()));
    }
    if let Some(script) = env_var("GITLAB_TOKEN_SCRIPT") {
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(&script)
            .output()
            .map_err(|e| BridgeError::configuration(format!("failed to run GITLAB_TOKEN_SCRIPT: {e}")))?;
        if !output.status.success() {
            return Err(BridgeError::configuration("GITLAB_TOKEN_SCRIPT exited non-zero"));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        return Ok(Some(token));
    }
    Ok(None)
}

/// Transport/auth configuration (`spec.md` §6, first bullet).
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_urls: Vec<url::Url>,
    pub token: Option<String>,
    pub use_oauth: bool,
    pub enable_dynamic_api_url: bool,
}

impl UpstreamConfig {
    pub fn from_env() -> BridgeResult<Self> {
        let mut urls = env_list("GITLAB_API_URLS");
        if urls.is_empty()
            && let Some(single) = env_var("GITLAB_API_URL")
        {
            urls.push(single);
        }
        if urls.is_empty() {
            return Err(BridgeError::configuration(
                "GITLAB_API_URL or GITLAB_API_URLS is required",
            ));
        }

        let api_urls = urls
            .iter()
            .map(|u| url::Url::parse(u).map_err(|e| BridgeError::configuration(format!("invalid GitLab API URL {u}: {e}"))))
            .collect::<BridgeResult<Vec<_>>>()?;

        Ok(Self {
            api_urls,
            token: resolve_token()?,
            use_oauth: env_bool("GITLAB_USE_OAUTH", false),
            enable_dynamic_api_url: env_bool("ENABLE_DYNAMIC_API_URL", false),
        })
    }
}

fn feature_env(name: &str) -> bool {
    env_bool(name, false)
}

/// Builds [`PolicyConfig`] from `spec.md` §6's policy env vars.
pub fn policy_config_from_env() -> BridgeResult<PolicyConfig> {
    let denied_tools_regex = match env_var("GITLAB_DENIED_TOOLS_REGEX") {
        Some(pattern) => Some(
            regex::Regex::new(&pattern)
                .map_err(|e| BridgeError::configuration(format!("invalid GITLAB_DENIED_TOOLS_REGEX: {e}")))?,
        ),
        None => None,
    };

    let mut enabled_features = [false; 4];
    for feature in Feature::ALL {
        let var = match feature {
            Feature::Wiki => "USE_GITLAB_WIKI",
            Feature::Milestone => "USE_MILESTONE",
            Feature::Pipeline => "USE_PIPELINE",
            Feature::Release => "USE_RELEASE",
        };
        enabled_features[feature as usize] = feature_env(var);
    }

    Ok(PolicyConfig {
        read_only: env_bool("GITLAB_READ_ONLY_MODE", false),
        allowed_tools: env_list("GITLAB_ALLOWED_TOOLS"),
        denied_tools_regex,
        enabled_features,
        allow_graphql_with_project_scope: env_bool("GITLAB_ALLOW_GRAPHQL_WITH_PROJECT_SCOPE", false),
        allowed_project_ids: env_list("GITLAB_ALLOWED_PROJECT_IDS"),
    })
}

/// Builds [`FormatOptions`] and the paired [`ErrorDetailMode`] from
/// `spec.md` §6's output env vars.
pub fn format_options_from_env() -> BridgeResult<(FormatOptions, ErrorDetailMode)> {
    let response_mode = match env_var("GITLAB_RESPONSE_MODE") {
        Some(v) => v.parse::<ResponseMode>()?,
        None => ResponseMode::default(),
    };
    let max_bytes = env_usize("GITLAB_MAX_RESPONSE_BYTES", 1_000_000)?;
    let error_detail = match env_var("GITLAB_ERROR_DETAIL_MODE") {
        Some(v) => v.parse::<ErrorDetailMode>()?,
        None => ErrorDetailMode::default(),
    };
    Ok((
        FormatOptions {
            response_mode,
            max_bytes,
        },
        error_detail,
    ))
}

/// Network configuration (`spec.md` §6, "Network" bullet; consumed by C6).
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub http_timeout_ms: u64,
    pub user_agent: String,
    pub accept_language: Option<String>,
    pub cloudflare_bypass: bool,
    pub cookie_warmup_path: Option<String>,
    pub token_cache_seconds: u64,
    pub accept_invalid_certs: bool,
    pub ca_cert_path: Option<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub api_urls: Vec<url::Url>,
}

impl NetworkConfig {
    pub fn from_env(api_urls: Vec<url::Url>) -> BridgeResult<Self> {
        Ok(Self {
            http_timeout_ms: env_u64("GITLAB_HTTP_TIMEOUT_MS", 30_000)?,
            user_agent: env_var("GITLAB_USER_AGENT").unwrap_or_else(|| {
                format!("gitlab-mcp-bridge/{}", env!("CARGO_PKG_VERSION"))
            }),
            accept_language: env_var("GITLAB_ACCEPT_LANGUAGE"),
            cloudflare_bypass: env_bool("GITLAB_CLOUDFLARE_BYPASS", false),
            cookie_warmup_path: env_var("GITLAB_COOKIE_WARMUP_PATH"),
            token_cache_seconds: env_u64("GITLAB_TOKEN_CACHE_SECONDS", 300)?,
            accept_invalid_certs: env_var("NODE_TLS_REJECT_UNAUTHORIZED").as_deref() == Some("0"),
            ca_cert_path: env_var("GITLAB_CA_CERT_PATH"),
            http_proxy: env_var("HTTP_PROXY"),
            https_proxy: env_var("HTTPS_PROXY"),
            api_urls,
        })
    }
}

/// HTTP server configuration (`spec.md` §6, "HTTP server" bullet; C9/C10).
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    pub json_only: bool,
    pub sse_enabled: bool,
    pub max_sessions: usize,
    pub session_timeout_seconds: u64,
    pub max_requests_per_minute: u32,
    pub remote_authorization: bool,
    pub enable_dynamic_api_url: bool,
}

impl HttpServerConfig {
    pub fn from_env(enable_dynamic_api_url: bool) -> BridgeResult<Self> {
        Ok(Self {
            host: env_var("HTTP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: env_usize("HTTP_PORT", 3000)? as u16,
            json_only: env_bool("HTTP_JSON_ONLY", false),
            sse_enabled: env_bool("SSE", false),
            max_sessions: env_usize("MAX_SESSIONS", 1_000)?,
            session_timeout_seconds: env_u64("SESSION_TIMEOUT_SECONDS", 300)?,
            max_requests_per_minute: env_u64("MAX_REQUESTS_PER_MINUTE", 600)? as u32,
            remote_authorization: env_bool("REMOTE_AUTHORIZATION", false),
            enable_dynamic_api_url,
        })
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_seconds)
    }
}

/// The fully resolved process configuration, read once at startup.
pub struct AppConfig {
    pub upstream: UpstreamConfig,
    pub policy: PolicyConfig,
    pub format_options: FormatOptions,
    pub error_detail: ErrorDetailMode,
    pub network: NetworkConfig,
    pub http: HttpServerConfig,
}

impl AppConfig {
    pub fn from_env() -> BridgeResult<Self> {
        let upstream = UpstreamConfig::from_env()?;
        let policy = policy_config_from_env()?;
        let (format_options, error_detail) = format_options_from_env()?;
        let network = NetworkConfig::from_env(upstream.api_urls.clone())?;
        let http = HttpServerConfig::from_env(upstream.enable_dynamic_api_url)?;

        Ok(Self {
            upstream,
            policy,
            format_options,
            error_detail,
            network,
            http,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn upstream_config_requires_an_api_url() {
        std::env::remove_var("GITLAB_API_URL");
        std::env::remove_var("GITLAB_API_URLS");
        assert!(UpstreamConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn upstream_config_parses_comma_list() {
        std::env::set_var("GITLAB_API_URLS", "https://a.example.com/api/v4,https://b.example.com/api/v4");
        let config = UpstreamConfig::from_env().unwrap();
        assert_eq!(config.api_urls.len(), 2);
        std::env::remove_var("GITLAB_API_URLS");
    }

    #[test]
    #[serial]
    fn policy_config_reads_feature_flags() {
        std::env::set_var("USE_GITLAB_WIKI", "true");
        let policy = policy_config_from_env().unwrap();
        assert!(policy.enabled_features[Feature::Wiki as usize]);
        std::env::remove_var("USE_GITLAB_WIKI");
    }
}
