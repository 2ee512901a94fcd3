//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, open-connection count)
//!     → connection.rs (GracefulConn wrapper, drain state)
//!     → Hand off to HTTP layer
//!
//! Listener States:
//!     Running → Draining → Done
//! ```
//!
//! # Design Decisions
//! - Accept and close only touch atomics
//! - Closing the listener is the single blocking wait, bounded by a deadline
//! - Connections observe the drain state so idle keep-alives close promptly

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, DrainTracker, GracefulConn, ListenerState};
pub use listener::{GracefulListener, ListenerError};
