//! Upstream platform API layer.
//!
//! # Data Flow
//! ```text
//! registry method (methods.rs)
//!     → client.rs (URL building, single outbound call)
//!     → cache.rs (access tokens, TTL)
//!     → raw upstream body returned as the call payload
//! ```
//!
//! # Design Decisions
//! - Upstream bodies are passed through untouched; callers interpret `errcode`
//! - No retries; a failed call surfaces as a masked `system error`
//! - Tokens are cached per application id

pub mod cache;
pub mod client;
pub mod methods;

pub use cache::TokenCache;
pub use client::{UpstreamClient, UpstreamError};
pub use methods::{register_all, Api, ApiMethod};
