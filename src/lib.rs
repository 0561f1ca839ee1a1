//! Reverse proxy with multiplexed, health-checked upstream connection pools.

pub mod admin;
pub mod config;
pub mod error;
pub mod filters;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod pool;
pub mod proxy;
pub mod resilience;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use error::{PoolError, SpecError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pool::{Context, MultiKeyPool, PoolObject, PoolSpec, ResourcePool};
pub use proxy::{Outcome, Proxy, ProxySpec};
