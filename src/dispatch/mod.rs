//! Call dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! /call request
//!     → pool.rs (check out a RequestContext)
//!     → accounts (resolve credentials onto the context)
//!     → registry.rs (find handler by method name)
//!     → handler(&RequestContext) → Bytes | HandlerError
//!     → envelope.rs (uniform JSON response)
//!     → context released back to the pool on drop
//! ```
//!
//! # Design Decisions
//! - Contexts are exclusively owned between acquire and release
//! - Expected failures are typed (`DispatchError`); panics become a `Fault`
//! - The registry is immutable after startup, so lookups take no locks

pub mod context;
pub mod envelope;
pub mod error;
pub mod pool;
pub mod registry;

pub use context::RequestContext;
pub use envelope::Envelope;
pub use error::{DispatchError, Fault, StoreError};
pub use pool::{ContextPool, PoolStats, PooledContext};
pub use registry::{HandlerError, HandlerResult, MethodHandler, MethodRegistry};
