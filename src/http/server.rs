//! HTTP server setup and the connection loop.
//!
//! # Responsibilities
//! - Create the Axum router (`/call` plus fallback)
//! - Wire up middleware (request ID, tracing, body limit)
//! - Serve each accepted connection with hyper's HTTP/1.1 engine
//! - Stop accepting on shutdown and drain through the listener

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, routing::any, Router};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::accounts::AccountStore;
use crate::config::GatewayConfig;
use crate::dispatch::{ContextPool, MethodRegistry};
use crate::http::handlers::{call_method, path_not_found, ROUTE_CALL};
use crate::net::{GracefulConn, GracefulListener, ListenerError, ListenerState};
use crate::observability::logging::RequestLog;

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Request-path switches taken from configuration.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub debug: bool,
    pub expose_store_errors: bool,
    pub max_body_bytes: usize,
}

impl DispatchSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            debug: config.logging.debug,
            expose_store_errors: config.recovery.expose_store_errors,
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MethodRegistry>,
    pub accounts: Arc<AccountStore>,
    pub pool: ContextPool,
    pub logs: Arc<RequestLog>,
    pub settings: Arc<DispatchSettings>,
}

/// Error returned by [`HttpServer::run`].
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("{0}")]
    Listener(#[from] ListenerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server for the dispatch gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a server with accounts and log files taken from `config`.
    pub fn new(config: &GatewayConfig, registry: MethodRegistry) -> Self {
        Self::with_parts(
            config,
            registry,
            AccountStore::from_records(&config.accounts),
            RequestLog::from_config(&config.logging),
        )
    }

    /// Create a server from prebuilt collaborators.
    pub fn with_parts(
        config: &GatewayConfig,
        registry: MethodRegistry,
        accounts: AccountStore,
        logs: RequestLog,
    ) -> Self {
        let state = AppState {
            registry: Arc::new(registry),
            accounts: Arc::new(accounts),
            pool: ContextPool::new(),
            logs: Arc::new(logs),
            settings: Arc::new(DispatchSettings::from_config(config)),
        };

        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        let max_body_bytes = state.settings.max_body_bytes;
        Router::new()
            .route(ROUTE_CALL, any(call_method))
            .fallback(path_not_found)
            .layer(DefaultBodyLimit::max(max_body_bytes))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve connections from `listener` until `shutdown` fires, then drain.
    ///
    /// Returns [`ListenerError::DrainTimeout`] (wrapped) when open
    /// connections outlive the listener's drain deadline.
    pub async fn run(
        self,
        listener: GracefulListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServeError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            methods = self.state.registry.len(),
            "HTTP server starting"
        );

        let service = TowerToHyperService::new(self.router);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((conn, peer)) => {
                        serve_connection(conn, peer, listener.state_receiver(), service.clone());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!(
                        open_connections = listener.open_connections(),
                        "Shutdown requested, closing listener"
                    );
                    break;
                }
            }
        }

        listener.close().await?;

        let stats = self.state.pool.stats();
        tracing::info!(
            contexts_created = stats.created,
            requests = stats.acquired,
            "HTTP server stopped"
        );
        Ok(())
    }
}

/// Drive one connection on its own task.
///
/// Once the listener starts draining, hyper finishes the in-flight response
/// and closes instead of waiting for the next keep-alive request.
fn serve_connection(
    conn: GracefulConn,
    peer: SocketAddr,
    mut drain: watch::Receiver<ListenerState>,
    service: TowerToHyperService<Router>,
) {
    tokio::spawn(async move {
        let connection_id = conn.id();
        let connection = http1::Builder::new().serve_connection(TokioIo::new(conn), service);
        tokio::pin!(connection);

        let mut draining = *drain.borrow_and_update() != ListenerState::Running;
        if draining {
            connection.as_mut().graceful_shutdown();
        }

        loop {
            tokio::select! {
                result = connection.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!(
                            connection_id = %connection_id,
                            peer_addr = %peer,
                            error = %e,
                            "Connection error"
                        );
                    }
                    break;
                }
                changed = drain.changed(), if !draining => {
                    draining = changed.is_err() || *drain.borrow_and_update() != ListenerState::Running;
                    if draining {
                        connection.as_mut().graceful_shutdown();
                    }
                }
            }
        }

        tracing::debug!(connection_id = %connection_id, "Connection closed");
    });
}
