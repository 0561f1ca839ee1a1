//! Pool sizing, health-check flags and the object factory.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::{BoxError, SpecError};
use crate::pool::context::Context;

/// Creates a new object for the key carried by the context.
/// Must return a healthy object or an error, and be safe to call concurrently.
pub type Factory<T> = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// Shared specification of every pool created from it.
///
/// Sizes are atomics so a configuration reload can change the bounds of
/// pools that already exist without rebuilding them.
pub struct PoolSpec<T> {
    init_size: AtomicUsize,
    max_size: AtomicUsize,
    pub check_when_get: bool,
    pub check_when_put: bool,
    factory: Factory<T>,
}

impl<T> fmt::Debug for PoolSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSpec")
            .field("init_size", &self.init_size())
            .field("max_size", &self.max_size())
            .field("check_when_get", &self.check_when_get)
            .field("check_when_put", &self.check_when_put)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> PoolSpec<T> {
    /// Build a spec with health checks enabled on both borrow and return.
    ///
    /// When `init_size` exceeds `max_size` the max is raised to match.
    pub fn new<F, Fut>(init_size: usize, max_size: usize, factory: F) -> Result<Self, SpecError>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let factory: Factory<T> =
            Arc::new(move |ctx| -> BoxFuture<'static, Result<T, BoxError>> { Box::pin(factory(ctx)) });
        Self::with_factory(init_size, max_size, factory)
    }

    pub fn with_factory(init_size: usize, max_size: usize, factory: Factory<T>) -> Result<Self, SpecError> {
        let max_size = max_size.max(init_size);
        if max_size == 0 {
            return Err(SpecError::MaxSizeNotPositive);
        }
        Ok(Self {
            init_size: AtomicUsize::new(init_size),
            max_size: AtomicUsize::new(max_size),
            check_when_get: true,
            check_when_put: true,
            factory,
        })
    }

    pub fn with_checks(mut self, check_when_get: bool, check_when_put: bool) -> Self {
        self.check_when_get = check_when_get;
        self.check_when_put = check_when_put;
        self
    }
}

impl<T> PoolSpec<T> {
    pub fn init_size(&self) -> usize {
        self.init_size.load(Ordering::Relaxed)
    }

    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::Relaxed)
    }

    /// Change the bounds in place. Existing idle and borrowed objects are kept.
    pub fn set_bounds(&self, init_size: usize, max_size: usize) -> Result<(), SpecError> {
        let max_size = max_size.max(init_size);
        if max_size == 0 {
            return Err(SpecError::MaxSizeNotPositive);
        }
        self.init_size.store(init_size, Ordering::Relaxed);
        self.max_size.store(max_size, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn create(&self, ctx: Context) -> BoxFuture<'static, Result<T, BoxError>> {
        (self.factory)(ctx)
    }
}
