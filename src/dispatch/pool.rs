//! Reuse pool for request contexts.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dispatch::context::RequestContext;
use crate::observability::metrics;

/// Counters describing pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Contexts constructed because the pool was empty.
    pub created: u64,
    pub acquired: u64,
    pub released: u64,
    /// Contexts currently waiting for reuse.
    pub idle: usize,
}

impl PoolStats {
    /// Contexts currently checked out.
    pub fn outstanding(&self) -> u64 {
        self.acquired - self.released
    }
}

#[derive(Default)]
struct PoolInner {
    idle: Mutex<Vec<RequestContext>>,
    created: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Unbounded pool of [`RequestContext`] values.
///
/// `acquire` never waits: an empty pool constructs a new context. The pool
/// saves allocations, it does not limit concurrency.
#[derive(Clone, Default)]
pub struct ContextPool {
    inner: Arc<PoolInner>,
}

impl ContextPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a context with an empty account.
    pub fn acquire(&self) -> PooledContext {
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);

        let recycled = self.inner.idle.lock().pop();
        let ctx = match recycled {
            Some(mut ctx) => {
                ctx.reset();
                ctx
            }
            None => {
                self.inner.created.fetch_add(1, Ordering::Relaxed);
                metrics::record_context_created();
                RequestContext::new()
            }
        };

        PooledContext {
            ctx,
            pool: Arc::clone(&self.inner),
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.inner.created.load(Ordering::Relaxed),
            acquired: self.inner.acquired.load(Ordering::Relaxed),
            released: self.inner.released.load(Ordering::Relaxed),
            idle: self.inner.idle.lock().len(),
        }
    }
}

/// Guard that owns a checked-out context and returns it to the pool when
/// dropped, including during unwinding.
pub struct PooledContext {
    ctx: RequestContext,
    pool: Arc<PoolInner>,
}

impl Deref for PooledContext {
    type Target = RequestContext;

    fn deref(&self) -> &RequestContext {
        &self.ctx
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut RequestContext {
        &mut self.ctx
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        let mut ctx = std::mem::take(&mut self.ctx);
        ctx.reset();
        self.pool.idle.lock().push(ctx);
        self.pool.released.fetch_add(1, Ordering::Relaxed);
    }
}
