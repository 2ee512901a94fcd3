//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Start background tasks (token cache purge)
//! - Bind the listener last
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::GatewayConfig;
use crate::dispatch::MethodRegistry;
use crate::http::{install_panic_hook, HttpServer, ServeError};
use crate::net::{GracefulListener, ListenerError};
use crate::upstream::{register_all, TokenCache, UpstreamClient, UpstreamError};

const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build upstream client: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("{0}")]
    Listener(#[from] ListenerError),
}

/// A bound, ready-to-serve gateway.
pub struct Gateway {
    pub server: HttpServer,
    pub listener: GracefulListener,
}

impl Gateway {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` fires, then drain.
    pub async fn serve(self, shutdown: broadcast::Receiver<()>) -> Result<(), ServeError> {
        self.server.run(self.listener, shutdown).await
    }
}

/// Build every subsystem from `config` and bind the listener.
pub async fn start(config: &GatewayConfig) -> Result<Gateway, StartupError> {
    install_panic_hook();

    tracing::info!(accounts = config.accounts.len(), "Loading accounts");

    let client = UpstreamClient::new(&config.upstream)?;
    spawn_token_purge(client.tokens().clone());

    let registry = register_all(MethodRegistry::new(), Arc::new(client));
    tracing::info!(methods = ?registry.names(), "Method registry built");

    let server = HttpServer::new(config, registry);

    let listener = GracefulListener::bind(
        &config.server.bind_address,
        config.server.shutdown_timeout(),
    )
    .await?;

    Ok(Gateway { server, listener })
}

fn spawn_token_purge(tokens: TokenCache) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TOKEN_PURGE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = tokens.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = tokens.len(), "Purged expired tokens");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_binds_ephemeral_port() {
        let mut config = GatewayConfig::default();
        config.server.bind_address = "127.0.0.1:0".into();

        let gateway = start(&config).await.unwrap();
        assert_ne!(gateway.local_addr().unwrap().port(), 0);
        assert_eq!(gateway.server.state().registry.len(), 11);
    }

    #[tokio::test]
    async fn bad_bind_address_fails() {
        let mut config = GatewayConfig::default();
        config.server.bind_address = "not-an-address".into();

        assert!(matches!(
            start(&config).await,
            Err(StartupError::Listener(ListenerError::Bind(_)))
        ));
    }
}
