//! Capability set every pooled object provides.

/// An object managed by `ResourcePool`.
///
/// `destroy` releases the underlying handle and must be idempotent.
/// `health_check` is a cheap liveness check without side effects.
pub trait PoolObject: Send + 'static {
    fn destroy(&mut self);

    fn health_check(&self) -> bool;
}
