//! Dispatch gateway library.
//!
//! An internal HTTP server that answers `/call` requests by invoking a
//! registered method for the caller's account and wrapping the result in a
//! uniform JSON envelope.

pub mod accounts;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod upstream;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
