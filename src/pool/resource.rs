//! Bounded, lazily-growing pool of health-checked objects for one key.
//!
//! # Object States
//! ```text
//! absent → idle (in store) → borrowed → idle | destroyed
//! ```
//!
//! # Design Decisions
//! - The idle store is a lock-free queue: `put` and the fast path of
//!   `get` never touch the live-count lock
//! - The live count is reserved *before* the factory runs, so the lock is
//!   never held across an await and `live <= max_size` always holds
//! - Waiters sleep on a `Notify` and re-validate in a loop; every wakeup
//!   may be spurious
//! - A waiter that gives up hands its wakeup to the next waiter
//! - Slots are released by guards: a borrow cancelled mid-create or an
//!   object dropped without `put` never leaks capacity

use std::future;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use crate::error::{PoolError, PoolResult};
use crate::observability::metrics;
use crate::pool::context::Context;
use crate::pool::object::PoolObject;
use crate::pool::spec::PoolSpec;
use crate::resilience::backoff::Backoff;

const CREATE_RETRY_BASE: Duration = Duration::from_millis(10);
const CREATE_RETRY_MAX: Duration = Duration::from_secs(1);

/// Point-in-time view of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub key: String,
    pub live: usize,
    pub idle: usize,
    pub max_size: usize,
}

/// Pool of reusable objects addressed by a single key.
pub struct ResourcePool<T: PoolObject> {
    key: String,
    spec: Arc<PoolSpec<T>>,
    idle: SegQueue<T>,
    /// Objects created and not yet destroyed (idle + borrowed + reserved).
    live: Mutex<usize>,
    notify: Notify,
    closed: AtomicBool,
}

impl<T: PoolObject> ResourcePool<T> {
    /// Create a pool and pre-warm it with `init_size` objects.
    ///
    /// Creation failures while pre-warming are logged and skipped.
    pub async fn new(key: impl Into<String>, spec: Arc<PoolSpec<T>>, ctx: &Context) -> Self {
        let pool = Self {
            key: key.into(),
            spec,
            idle: SegQueue::new(),
            live: Mutex::new(0),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        };

        let init_size = pool.spec.init_size();
        for _ in 0..init_size {
            if ctx.err().is_some() {
                break;
            }
            match pool.spec.create(ctx.clone()).await {
                Ok(obj) => {
                    *pool.live.lock() += 1;
                    pool.idle.push(obj);
                    metrics::record_object_created(&pool.key);
                }
                Err(e) => {
                    tracing::error!(key = %pool.key, error = %e, "create pool object failed");
                }
            }
        }

        tracing::debug!(key = %pool.key, warmed = pool.idle.len(), init_size, "Pool created");
        pool
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Borrow an object.
    ///
    /// Returns an idle object if one exists, creates one while the pool is
    /// below its max size, and otherwise waits until an object is returned,
    /// capacity is freed, or the context ends.
    pub async fn get(&self, ctx: &Context) -> PoolResult<T> {
        loop {
            if self.is_closed() {
                return Err(PoolError::Closed);
            }
            if let Some(err) = ctx.err() {
                return Err(err);
            }

            let obj = match self.idle.pop() {
                Some(obj) => obj,
                None => self.slow_get(ctx).await?,
            };

            if !self.spec.check_when_get || obj.health_check() {
                return Ok(obj);
            }

            tracing::debug!(key = %self.key, "Destroying unhealthy object on get");
            self.destroy_object(obj);
            tokio::task::yield_now().await;
        }
    }

    async fn slow_get(&self, ctx: &Context) -> PoolResult<T> {
        let mut backoff = Backoff::new(CREATE_RETRY_BASE, CREATE_RETRY_MAX);

        loop {
            if self.is_closed() {
                return Err(self.give_up(PoolError::Closed));
            }
            if let Some(err) = ctx.err() {
                return Err(self.give_up(err));
            }
            if let Some(obj) = self.idle.pop() {
                return Ok(obj);
            }

            let mut retry_after = None;
            if let Some(reservation) = self.try_reserve() {
                match self.spec.create(ctx.clone()).await {
                    Ok(obj) => {
                        reservation.keep();
                        metrics::record_object_created(&self.key);
                        return Ok(obj);
                    }
                    Err(e) => {
                        reservation.release_quietly();
                        let delay = backoff.next_delay();
                        tracing::warn!(
                            key = %self.key,
                            error = %e,
                            attempt = backoff.attempts(),
                            retry_in = ?delay,
                            "create pool object failed"
                        );
                        retry_after = Some(delay);
                    }
                }
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // Re-check after registering so a put or destroy that raced
            // with the checks above is not missed.
            if let Some(obj) = self.idle.pop() {
                return Ok(obj);
            }
            if retry_after.is_none() && self.has_capacity() {
                continue;
            }

            let retry = async {
                match retry_after {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = retry => {}
                err = ctx.done() => return Err(self.give_up(err)),
            }
        }
    }

    /// Borrow an object wrapped in a guard that frees its slot if the
    /// caller goes away without returning it.
    pub async fn borrow(self: &Arc<Self>, ctx: &Context) -> PoolResult<Borrowed<T>> {
        let obj = self.get(ctx).await?;
        Ok(Borrowed { pool: self.clone(), obj: Some(obj) })
    }

    /// Return a borrowed object.
    ///
    /// Unhealthy objects (when `check_when_put` is set) and objects above a
    /// lowered max size are destroyed instead of stored. Returning to a
    /// closed pool destroys the object and reports `Closed`.
    pub fn put(&self, obj: T) -> PoolResult<()> {
        if self.is_closed() {
            self.destroy_object(obj);
            return Err(PoolError::Closed);
        }

        if self.spec.check_when_put && !obj.health_check() {
            tracing::debug!(key = %self.key, "Destroying unhealthy object on put");
            self.destroy_object(obj);
            return Ok(());
        }

        let live = *self.live.lock();
        if self.idle.len() >= live {
            let mut obj = obj;
            obj.destroy();
            tracing::warn!(key = %self.key, live, "Object returned that was never borrowed from this pool");
            return Err(PoolError::Misuse("more objects returned than borrowed"));
        }
        if live > self.spec.max_size() {
            self.destroy_object(obj);
            return Ok(());
        }

        self.idle.push(obj);
        self.notify.notify_one();

        // close() may have drained the store between the check above and the push.
        if self.is_closed() {
            self.drain();
        }
        Ok(())
    }

    /// Destroy a borrowed object instead of returning it, freeing its slot.
    pub fn discard(&self, obj: T) {
        self.destroy_object(obj);
    }

    /// Stop accepting returns and destroy every idle object.
    ///
    /// Borrowed objects are not touched; they are destroyed when returned.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.drain();
        self.notify.notify_waiters();
        tracing::debug!(key = %self.key, "Pool closed");
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            key: self.key.clone(),
            live: *self.live.lock(),
            idle: self.idle.len(),
            max_size: self.spec.max_size(),
        }
    }

    fn drain(&self) {
        while let Some(obj) = self.idle.pop() {
            self.destroy_object(obj);
        }
    }

    fn try_reserve(&self) -> Option<Reservation<'_, T>> {
        let mut live = self.live.lock();
        if *live < self.spec.max_size() {
            *live += 1;
            Some(Reservation { pool: self, kept: false })
        } else {
            None
        }
    }

    fn has_capacity(&self) -> bool {
        *self.live.lock() < self.spec.max_size()
    }

    fn release_reservation(&self) {
        let mut live = self.live.lock();
        *live = live.saturating_sub(1);
    }

    fn destroy_object(&self, mut obj: T) {
        {
            let mut live = self.live.lock();
            *live = live.saturating_sub(1);
        }
        self.notify.notify_one();
        obj.destroy();
        metrics::record_object_destroyed(&self.key);
    }

    /// Pass a possibly consumed wakeup on before leaving the wait loop.
    fn give_up(&self, err: PoolError) -> PoolError {
        self.notify.notify_one();
        metrics::record_borrow_failure(&err);
        err
    }
}

/// A slot counted in `live` while the factory runs.
///
/// Dropped without `keep` (the borrow was abandoned mid-create) it frees
/// the slot and wakes a waiter that may create in its place.
struct Reservation<'a, T: PoolObject> {
    pool: &'a ResourcePool<T>,
    kept: bool,
}

impl<T: PoolObject> Reservation<'_, T> {
    /// The slot now belongs to a created object.
    fn keep(mut self) {
        self.kept = true;
    }

    /// Free the slot without a wakeup; the failed creator retries after backoff.
    fn release_quietly(mut self) {
        self.kept = true;
        self.pool.release_reservation();
    }
}

impl<T: PoolObject> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if !self.kept {
            tracing::debug!(key = %self.pool.key, "Borrow abandoned while creating, releasing slot");
            self.pool.release_reservation();
            self.pool.notify.notify_one();
        }
    }
}

/// An object on loan from a `ResourcePool`.
///
/// Give it back with `put` or `discard`. Dropping it without either, as
/// happens when the borrowing future is cancelled, destroys the object and
/// frees its slot.
pub struct Borrowed<T: PoolObject> {
    pool: Arc<ResourcePool<T>>,
    obj: Option<T>,
}

impl<T: PoolObject> Borrowed<T> {
    pub fn key(&self) -> &str {
        &self.pool.key
    }

    /// Return the object to its pool.
    pub fn put(mut self) -> PoolResult<()> {
        match self.obj.take() {
            Some(obj) => self.pool.put(obj),
            None => Ok(()),
        }
    }

    /// Destroy the object instead of returning it.
    pub fn discard(mut self) {
        if let Some(obj) = self.obj.take() {
            self.pool.discard(obj);
        }
    }
}

impl<T: PoolObject> Deref for Borrowed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.obj.as_ref().expect("object is only taken by put or discard")
    }
}

impl<T: PoolObject> DerefMut for Borrowed<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.obj.as_mut().expect("object is only taken by put or discard")
    }
}

impl<T: PoolObject> Drop for Borrowed<T> {
    fn drop(&mut self) {
        if let Some(obj) = self.obj.take() {
            tracing::debug!(key = %self.pool.key, "Borrowed object dropped without return, destroying it");
            self.pool.discard(obj);
        }
    }
}

impl<T: PoolObject> Drop for ResourcePool<T> {
    fn drop(&mut self) {
        while let Some(mut obj) = self.idle.pop() {
            obj.destroy();
        }
    }
}
