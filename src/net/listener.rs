//! TCP listener with graceful drain.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections and count them
//! - Stop accepting on close and wait for open connections, bounded by a deadline

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::net::connection::{DrainTracker, GracefulConn, ListenerState};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// Open connections did not finish before the deadline.
    DrainTimeout(Duration),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::DrainTimeout(d) => {
                write!(f, "cannot complete graceful shutdown in {:?}", d)
            }
        }
    }
}

impl std::error::Error for ListenerError {}

/// A TCP listener that counts open connections and drains them on close.
///
/// Every accepted stream is wrapped in a [`GracefulConn`]; dropping it closes
/// the socket and decrements the count.
pub struct GracefulListener {
    /// The underlying TCP listener.
    inner: TcpListener,
    tracker: Arc<DrainTracker>,
    /// Upper bound for [`GracefulListener::close`].
    max_wait: Duration,
}

impl GracefulListener {
    /// Wrap an already bound listener.
    pub fn new(inner: TcpListener, max_wait: Duration) -> Self {
        Self {
            inner,
            tracker: DrainTracker::new(),
            max_wait,
        }
    }

    /// Bind to the given address.
    pub async fn bind(addr: &str, max_wait: Duration) -> Result<Self, ListenerError> {
        let addr: SocketAddr = addr.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;

        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_wait = ?max_wait,
            "Listener bound"
        );

        Ok(Self::new(listener, max_wait))
    }

    /// Accept a new connection and count it as open.
    pub async fn accept(&self) -> Result<(GracefulConn, SocketAddr), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        let guard = self.tracker.track();

        tracing::debug!(
            peer_addr = %addr,
            connection_id = %guard.id(),
            open_connections = self.tracker.open_connections(),
            "Connection accepted"
        );

        Ok((GracefulConn::new(stream, guard), addr))
    }

    /// Close the listener and wait until every open connection has closed.
    ///
    /// Returns immediately when nothing is open. Fails with
    /// [`ListenerError::DrainTimeout`] once `max_wait` elapses.
    pub async fn close(self) -> Result<(), ListenerError> {
        let Self {
            inner,
            tracker,
            max_wait,
        } = self;

        // No further accepts once the socket is gone.
        drop(inner);

        let mut state = tracker.subscribe();
        if tracker.begin_drain() {
            tracing::info!("No open connections, drain complete");
            return Ok(());
        }

        tracing::info!(
            open_connections = tracker.open_connections(),
            max_wait = ?max_wait,
            "Draining open connections"
        );

        let drained = tokio::time::timeout(max_wait, async {
            // The sender lives in `tracker`, so this only returns on `Done`.
            let _ = state.wait_for(|s| *s == ListenerState::Done).await;
        })
        .await;

        match drained {
            Ok(_) => {
                tracing::info!("Drain complete");
                Ok(())
            }
            Err(_) => {
                tracker.finish();
                tracing::warn!(
                    open_connections = tracker.open_connections(),
                    "Drain deadline elapsed"
                );
                Err(ListenerError::DrainTimeout(max_wait))
            }
        }
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn open_connections(&self) -> u64 {
        self.tracker.open_connections()
    }

    pub fn state(&self) -> ListenerState {
        self.tracker.state()
    }

    /// Receiver that observes the transition into `Draining`.
    pub fn state_receiver(&self) -> watch::Receiver<ListenerState> {
        self.tracker.subscribe()
    }

    pub fn tracker(&self) -> Arc<DrainTracker> {
        Arc::clone(&self.tracker)
    }
}
