//! Request runtime (C6)
//!
//! Supplies per-call headers, cookies, and token material to the upstream
//! client, and configures the process-wide HTTP dispatcher once at startup
//! (`spec.md` §4.6).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::auth::RequestContext;
use crate::config::NetworkConfig;
use crate::error::{BridgeError, BridgeResult};

/// A cached cookie string plus the instant it expires.
struct CachedCookie {
    value: String,
    expires_at: Instant,
}

/// Everything `beforeRequest` needs that outlives a single call: the cookie
/// cache and the network configuration it was built from. One instance is
/// shared across sessions (`spec.md` §9 "Shared upstream client").
pub struct RequestRuntime {
    config: NetworkConfig,
    cookie_cache: RwLock<Option<CachedCookie>>,
    http: reqwest::Client,
}

impl RequestRuntime {
    /// `configureNetworkRuntime`: builds the process-wide HTTP dispatcher
    /// once. TLS verification is disabled only when explicitly requested,
    /// matching `NODE_TLS_REJECT_UNAUTHORIZED=0` in the original env scheme.
    pub fn new(config: NetworkConfig) -> BridgeResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .user_agent(config.user_agent.clone());

        if config.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ca_path) = &config.ca_cert_path {
            let pem = std::fs::read(ca_path).map_err(|e| {
                BridgeError::configuration(format!("failed to read GITLAB_CA_CERT_PATH: {e}"))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                BridgeError::configuration(format!("invalid GITLAB_CA_CERT_PATH cert: {e}"))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(proxy_url) = config.https_proxy.as_ref().or(config.http_proxy.as_ref()) {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| BridgeError::configuration(format!("invalid proxy url: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| BridgeError::configuration(format!("failed to build http client: {e}")))?;

        Ok(Self {
            config,
            cookie_cache: RwLock::new(None),
            http,
        })
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn timeout_ms(&self) -> u64 {
        self.config.http_timeout_ms
    }

    /// `beforeRequest(ctx)`: assembles the headers and cookie every
    /// outbound request carries, drawing auth material from the bound
    /// task-local [`RequestContext`].
    pub async fn before_request(&self, ctx: &RequestContext) -> BridgeResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(auth) = &ctx.auth {
            let name = HeaderName::from_bytes(auth.header.header_name().as_bytes())
                .map_err(|e| BridgeError::internal(format!("bad auth header name: {e}")))?;
            let value = HeaderValue::from_str(&auth.header_value())
                .map_err(|e| BridgeError::internal(format!("bad auth header value: {e}")))?;
            headers.insert(name, value);
        }

        if let Some(lang) = &self.config.accept_language {
            headers.insert(
                reqwest::header::ACCEPT_LANGUAGE,
                HeaderValue::from_str(lang)
                    .map_err(|e| BridgeError::internal(format!("bad accept-language: {e}")))?,
            );
        }

        if self.config.cloudflare_bypass {
            headers.insert(
                HeaderName::from_static("cf-bypass"),
                HeaderValue::from_static("1"),
            );
            headers.insert(
                reqwest::header::ACCEPT,
                HeaderValue::from_static("text/html,application/xhtml+xml"),
            );
        }

        if let Some(cookie) = self.cookie(ctx).await? {
            headers.insert(
                reqwest::header::COOKIE,
                HeaderValue::from_str(&cookie)
                    .map_err(|e| BridgeError::internal(format!("bad cookie value: {e}")))?,
            );
        }

        Ok(headers)
    }

    /// Returns the cached cookie, warming it up via a one-shot GET if it has
    /// expired or was never fetched. Cached for `GITLAB_TOKEN_CACHE_SECONDS`.
    async fn cookie(&self, ctx: &RequestContext) -> BridgeResult<Option<String>> {
        let Some(path) = &self.config.cookie_warmup_path else {
            return Ok(None);
        };

        if let Some(cached) = self.cookie_cache.read().as_ref()
            && cached.expires_at > Instant::now()
        {
            return Ok(Some(cached.value.clone()));
        }

        let base = ctx
            .resolved_api_url_override()
            .cloned()
            .unwrap_or_else(|| self.config.api_urls[0].clone());
        let url = base
            .join(path)
            .map_err(|e| BridgeError::internal(format!("invalid cookie warmup path: {e}")))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| BridgeError::Network(e.to_string()))?;

        let cookie = response
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(cookie) = &cookie {
            *self.cookie_cache.write() = Some(CachedCookie {
                value: cookie.clone(),
                expires_at: Instant::now() + Duration::from_secs(self.config.token_cache_seconds),
            });
        }

        Ok(cookie)
    }
}

pub type SharedRuntime = Arc<RequestRuntime>;
