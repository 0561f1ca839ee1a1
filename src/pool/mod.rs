//! Object pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Context (routing key, deadline, cancel)
//!     → multi.rs (key → ResourcePool, created on first use)
//!     → resource.rs
//!         fast path: pop an idle object
//!         slow path: create below max size, else wait for put/destroy/cancel
//!         health check before handing out
//!     → caller uses the object
//!     → put (health check, back to idle) or discard (destroy, free slot)
//! ```
//!
//! # Design Decisions
//! - Pools are generic over `PoolObject`; internals never inspect objects
//! - One shared `PoolSpec` per registry so a reload resizes every key in place
//! - Borrowed objects are never force-destroyed on close

pub mod context;
pub mod multi;
pub mod object;
pub mod resource;
pub mod spec;

pub use context::{CancelHandle, Context, DEFAULT_KEY};
pub use multi::MultiKeyPool;
pub use object::PoolObject;
pub use resource::{Borrowed, PoolStats, ResourcePool};
pub use spec::{Factory, PoolSpec};
