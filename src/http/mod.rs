//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! GracefulConn (net layer)
//!     → server.rs (hyper HTTP/1.1 per connection, Axum router, middleware)
//!     → handlers.rs (/call dispatch or path-not-found)
//!     → request.rs (request ID, form fields)
//!     → recovery.rs (envelope, logs, pool release)
//!     → Send to client
//! ```

pub mod handlers;
pub mod recovery;
pub mod request;
pub mod server;

pub use recovery::install_panic_hook;
pub use request::X_REQUEST_ID;
pub use server::{AppState, DispatchSettings, HttpServer, ServeError};
