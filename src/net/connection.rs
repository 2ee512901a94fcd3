//! Connection accounting and drain state.
//!
//! # Responsibilities
//! - Count open connections (accepted minus closed)
//! - Track listener state (Running → Draining → Done)
//! - Signal drain completion when the last connection closes
//! - Wrap accepted streams so closing them updates the count

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a graceful listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Accepting new connections.
    Running,
    /// Inner listener closed; waiting for open connections to finish.
    Draining,
    /// Drain finished or timed out.
    Done,
}

/// Shared drain bookkeeping for a listener and all connections it accepted.
///
/// The accept/close path only touches the atomics. The watch channel is
/// written at most twice per process (entering `Draining` and `Done`).
#[derive(Debug)]
pub struct DrainTracker {
    /// Current count of open connections.
    open: AtomicU64,
    /// Set once shutdown starts.
    draining: AtomicBool,
    state_tx: watch::Sender<ListenerState>,
}

impl DrainTracker {
    pub fn new() -> Arc<Self> {
        let (state_tx, _) = watch::channel(ListenerState::Running);
        Arc::new(Self {
            open: AtomicU64::new(0),
            draining: AtomicBool::new(false),
            state_tx,
        })
    }

    /// Record a new open connection. Returns a guard that decrements on drop.
    pub fn track(self: &Arc<Self>) -> ConnectionGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        metrics::connection_opened();
        ConnectionGuard {
            tracker: Arc::clone(self),
            id: ConnectionId::new(),
        }
    }

    /// Get current open connection count.
    pub fn open_connections(&self) -> u64 {
        self.open.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ListenerState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state changes; connection tasks use this to stop keep-alive.
    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state_tx.subscribe()
    }

    /// Enter `Draining`. Returns `true` when no connection is open, in which
    /// case the state is already `Done`.
    pub(crate) fn begin_drain(&self) -> bool {
        self.state_tx.send_replace(ListenerState::Draining);
        self.draining.store(true, Ordering::SeqCst);
        if self.open.load(Ordering::SeqCst) == 0 {
            self.finish();
            return true;
        }
        false
    }

    pub(crate) fn finish(&self) {
        self.state_tx.send_replace(ListenerState::Done);
    }

    fn release(&self) {
        let remaining = self.open.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::connection_closed();
        if remaining == 0 && self.draining.load(Ordering::SeqCst) {
            self.finish();
        }
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements the open count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: Arc<DrainTracker>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.release();
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// An accepted TCP stream whose close is reported to the listener.
///
/// Field order matters: the socket is closed before the guard releases the
/// count.
#[derive(Debug)]
pub struct GracefulConn {
    stream: TcpStream,
    guard: ConnectionGuard,
}

impl GracefulConn {
    pub(crate) fn new(stream: TcpStream, guard: ConnectionGuard) -> Self {
        Self { stream, guard }
    }

    pub fn id(&self) -> ConnectionId {
        self.guard.id()
    }
}

impl AsyncRead for GracefulConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for GracefulConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.stream.is_write_vectored()
    }
}
