//! Registry of `ResourcePool`s keyed by routing key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::{PoolError, PoolResult};
use crate::pool::context::Context;
use crate::pool::object::PoolObject;
use crate::pool::resource::{Borrowed, PoolStats, ResourcePool};
use crate::pool::spec::PoolSpec;

/// Lazily creates one pool per routing key, all sharing one spec.
///
/// Lookups are lock-free; creation takes a lock and re-checks so two
/// callers racing on a new key never build two pools.
pub struct MultiKeyPool<T: PoolObject> {
    pools: DashMap<String, Arc<ResourcePool<T>>>,
    create_lock: Mutex<()>,
    spec: Arc<PoolSpec<T>>,
    closed: AtomicBool,
}

impl<T: PoolObject> MultiKeyPool<T> {
    pub fn new(spec: Arc<PoolSpec<T>>) -> Self {
        Self {
            pools: DashMap::new(),
            create_lock: Mutex::new(()),
            spec,
            closed: AtomicBool::new(false),
        }
    }

    /// The shared spec; bounds changed through it apply to every key.
    pub fn spec(&self) -> &Arc<PoolSpec<T>> {
        &self.spec
    }

    /// Borrow an object from the pool for `ctx.key()`, creating the pool first if needed.
    pub async fn get(&self, ctx: &Context) -> PoolResult<T> {
        let pool = self.pool_for(ctx).await?;
        pool.get(ctx).await
    }

    /// Like `get`, but the object comes back in a guard that destroys it
    /// and frees its slot if it is dropped without `put` or `discard`.
    pub async fn borrow(&self, ctx: &Context) -> PoolResult<Borrowed<T>> {
        let pool = self.pool_for(ctx).await?;
        pool.borrow(ctx).await
    }

    async fn pool_for(&self, ctx: &Context) -> PoolResult<Arc<ResourcePool<T>>> {
        let key = ctx.key();
        if let Some(pool) = self.lookup(key) {
            return Ok(pool);
        }

        let _guard = self.create_lock.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        if let Some(pool) = self.lookup(key) {
            return Ok(pool);
        }

        let pool = Arc::new(ResourcePool::new(key, self.spec.clone(), ctx).await);
        self.pools.insert(key.to_string(), pool.clone());
        tracing::info!(key, max_size = self.spec.max_size(), "Created pool for new key");
        Ok(pool)
    }

    fn lookup(&self, key: &str) -> Option<Arc<ResourcePool<T>>> {
        self.pools.get(key).map(|entry| entry.value().clone())
    }

    /// Return an object to the pool for `ctx.key()`.
    ///
    /// An object whose key has no pool is destroyed and reported; it can
    /// only come from a caller that changed the key between get and put.
    pub fn put(&self, ctx: &Context, obj: T) -> PoolResult<()> {
        match self.lookup(ctx.key()) {
            Some(pool) => pool.put(obj),
            None => Err(self.reject_unknown(ctx.key(), obj)),
        }
    }

    /// Destroy a borrowed object instead of returning it.
    pub fn discard(&self, ctx: &Context, obj: T) -> PoolResult<()> {
        match self.lookup(ctx.key()) {
            Some(pool) => {
                pool.discard(obj);
                Ok(())
            }
            None => Err(self.reject_unknown(ctx.key(), obj)),
        }
    }

    fn reject_unknown(&self, key: &str, mut obj: T) -> PoolError {
        tracing::warn!(key, "Object returned for a key that has no pool, destroying it");
        obj.destroy();
        PoolError::UnknownKey(key.to_string())
    }

    /// Close every pool. Keys requested afterwards are refused.
    pub async fn close(&self) {
        let _guard = self.create_lock.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for entry in self.pools.iter() {
            entry.value().close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<_> = self.pools.iter().map(|entry| entry.value().stats()).collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        stats
    }
}
