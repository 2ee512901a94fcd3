//! HTTP client for the upstream platform API.
//!
//! # Responsibilities
//! - Build request URLs against the configured API base
//! - Issue single GET / JSON POST calls (no retries)
//! - Fetch and cache per-application access tokens

use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::accounts::AccountInfo;
use crate::config::UpstreamConfig;
use crate::upstream::cache::TokenCache;

/// Errors from outbound calls.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a status other than 200.
    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("access token unavailable: {0}")]
    Token(String),
}

/// Token endpoint answer; errors carry `errcode`/`errmsg` instead.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    errcode: i64,
}

pub struct UpstreamClient {
    http: reqwest::Client,
    base: Url,
    tokens: TokenCache,
    token_ttl: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Self::with_http(http, config, TokenCache::new())
    }

    /// Build on an existing HTTP client and token cache.
    pub fn with_http(
        http: reqwest::Client,
        config: &UpstreamConfig,
        tokens: TokenCache,
    ) -> Result<Self, UpstreamError> {
        let mut base = Url::parse(&config.api_base)?;
        // Relative joins keep the base path only when it ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        tracing::info!(api_base = %base, "Upstream client initialized");
        Ok(Self {
            http,
            base,
            tokens,
            token_ttl: Duration::from_secs(config.token_ttl_secs),
        })
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Resolve an API path below the configured base, keeping its path prefix.
    pub fn endpoint(&self, path: &str) -> Result<Url, UpstreamError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    /// GET `path` with query parameters and return the raw body.
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Bytes, UpstreamError> {
        let url = self.endpoint(path)?;
        tracing::debug!(url = %url, "Upstream GET");
        let response = self.http.get(url).query(query).send().await?;
        Self::read_body(response).await
    }

    /// POST a JSON body to `path` and return the raw response body.
    pub async fn post_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<Bytes, UpstreamError> {
        let url = self.endpoint(path)?;
        tracing::debug!(url = %url, "Upstream POST");
        let response = self.http.post(url).query(query).json(body).send().await?;
        Self::read_body(response).await
    }

    async fn read_body(response: reqwest::Response) -> Result<Bytes, UpstreamError> {
        let status = response.status();
        if status != StatusCode::OK {
            return Err(UpstreamError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?)
    }

    /// Request a fresh access token and cache it on success.
    ///
    /// Returns the upstream body unchanged, including error answers.
    pub async fn fetch_access_token(&self, account: &AccountInfo) -> Result<Bytes, UpstreamError> {
        let body = self
            .get(
                "/cgi-bin/token",
                &[
                    ("grant_type", "client_credential"),
                    ("appid", account.app_id.as_str()),
                    ("secret", account.app_secret.as_str()),
                ],
            )
            .await?;

        match serde_json::from_slice::<TokenResponse>(&body) {
            Ok(TokenResponse {
                access_token: Some(token),
                errcode: 0,
            }) => {
                self.tokens.set(token_key(account), token, self.token_ttl);
                tracing::debug!(app_id = %account.app_id, "Access token cached");
            }
            Ok(TokenResponse { errcode, .. }) => {
                tracing::warn!(app_id = %account.app_id, errcode, "Token request rejected");
            }
            Err(e) => {
                tracing::warn!(app_id = %account.app_id, error = %e, "Unreadable token response");
            }
        }

        Ok(body)
    }

    /// Cached access token, fetching a new one when absent.
    pub async fn access_token(&self, account: &AccountInfo) -> Result<String, UpstreamError> {
        let key = token_key(account);
        if let Some(token) = self.tokens.get(&key) {
            return Ok(token);
        }
        let body = self.fetch_access_token(account).await?;
        self.tokens
            .get(&key)
            .ok_or_else(|| UpstreamError::Token(String::from_utf8_lossy(&body).into_owned()))
    }
}

/// Cache key of an application's access token.
pub fn token_key(account: &AccountInfo) -> String {
    format!("access_token:{}", account.app_id)
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("base", &self.base.as_str())
            .field("cached_tokens", &self.tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_base: &str) -> UpstreamClient {
        let config = UpstreamConfig {
            api_base: api_base.to_string(),
            ..UpstreamConfig::default()
        };
        UpstreamClient::with_http(reqwest::Client::new(), &config, TokenCache::new()).unwrap()
    }

    #[test]
    fn endpoint_on_root_base() {
        let client = client("https://api.weixin.qq.com");
        assert_eq!(
            client.endpoint("/cgi-bin/token").unwrap().as_str(),
            "https://api.weixin.qq.com/cgi-bin/token"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        for base in ["http://proxy.local/wechat", "http://proxy.local/wechat/"] {
            let client = client(base);
            assert_eq!(
                client.endpoint("/sns/userinfo").unwrap().as_str(),
                "http://proxy.local/wechat/sns/userinfo"
            );
        }
    }

    #[test]
    fn token_key_is_per_application() {
        assert_eq!(
            token_key(&AccountInfo::new("wx1", "s1")),
            "access_token:wx1"
        );
    }
}
