//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the dispatch gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener and drain settings.
    pub server: ServerConfig,

    /// Console and file logging.
    pub logging: LoggingConfig,

    /// Upstream platform API settings.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Fault classification policy.
    pub recovery: RecoveryConfig,

    /// Account table loaded into the account store at startup.
    pub accounts: Vec<AccountRecord>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum time to wait for in-flight connections during shutdown.
    pub shutdown_timeout_secs: u64,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            shutdown_timeout_secs: 30,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit a trace line for every finished request.
    pub debug: bool,

    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,

    /// Append access and error lines to the files below.
    pub log_in_file: bool,

    pub access_log_path: String,

    pub error_log_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            filter: "dispatch_gateway=info,tower_http=info".to_string(),
            log_in_file: false,
            access_log_path: "logs/access.log".to_string(),
            error_log_path: "logs/error.log".to_string(),
        }
    }
}

/// Upstream platform API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the platform API.
    pub api_base: String,

    /// Connect timeout for outbound calls in seconds.
    pub connect_timeout_secs: u64,

    /// How long a fetched access token stays cached.
    pub token_ttl_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.weixin.qq.com".to_string(),
            connect_timeout_secs: 5,
            // Tokens are valid for 7200s upstream; refresh well before that.
            token_ttl_secs: 110 * 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Address the exporter listens on.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Fault classification policy for the recovery boundary.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Pass store driver error text through to clients.
    pub expose_store_errors: bool,
}

/// One row of the account table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountRecord {
    pub id: i64,

    pub app_id: String,

    pub app_secret: String,

    /// Only records in state 1 are served.
    #[serde(default = "default_account_state")]
    pub state: u8,
}

fn default_account_state() -> u8 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.server.shutdown_timeout(), Duration::from_secs(30));
        assert!(!config.logging.log_in_file);
        assert!(config.accounts.is_empty());
    }

    #[test]
    fn accounts_default_to_active() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[accounts]]
            id = 7
            app_id = "wx7"
            app_secret = "s7"
            "#,
        )
        .unwrap();
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].state, 1);
    }
}
