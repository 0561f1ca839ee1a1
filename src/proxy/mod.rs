//! Proxy subsystem: routing requests to pooled upstream connections.
//!
//! # Data Flow
//! ```text
//! Request
//!     → router.rs (candidate pool-sets in order, first filter match wins, else main)
//!     → server_pool.rs
//!         load balancer picks a server
//!         circuit breaker open? → shortCircuited
//!         MultiKeyPool.get(key = server host:port, borrow deadline)
//!     → connection.rs (send over HTTP/1.1, buffer response)
//!     → put connection back, or discard it on failure
//!     → outcome.rs (success / internalError / clientError / serverError / shortCircuited)
//! ```
//!
//! # Design Decisions
//! - One `MultiKeyPool` per proxy, shared by all pool-sets and all generations
//! - A reload rebuilds pool-sets but only resizes the pools in place
//! - Per-request failures become outcomes; they never fail the handler task

pub mod connection;
pub mod outcome;
pub mod router;
pub mod server_pool;

pub use connection::{ConnectTimeout, Connection, Connector, Http1Connector, PooledConnection};
pub use outcome::Outcome;
pub use router::{Handled, Proxy, ProxySpec, ProxyStatus};
pub use server_pool::{ServerPool, ServerPoolSpec, ServerPoolStatus, Timeouts};
