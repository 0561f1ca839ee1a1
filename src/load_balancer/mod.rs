//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Pool-set chosen by the proxy
//!     → Apply load balancing algorithm over its servers:
//!         - round_robin.rs (rotate through servers)
//!         - least_conn.rs (pick server with fewest in-flight requests)
//!         - random.rs (uniform or weighted)
//!         - hash.rs (sticky by client IP or header value)
//!     → server.rs (host:port becomes the pool routing key)
//!     → Return server or None
//! ```
//!
//! # Design Decisions
//! - Load balancer holds no server list; the pool-set owns it
//! - Algorithm selection per pool-set
//! - Hash policies share FNV-1 with the request matchers

pub mod hash;
pub mod least_conn;
pub mod random;
pub mod round_robin;
pub mod server;

use std::fmt::Debug;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use serde::{Deserialize, Serialize};

use crate::error::SpecError;
pub use server::{Server, ServerGuard, ServerSpec};

/// Trait for selecting an upstream server.
pub trait LoadBalancer: Send + Sync + Debug {
    /// Pick a server for this request, or None if there is none.
    fn next_server(&self, servers: &[Arc<Server>], req: &Request<Body>) -> Option<Arc<Server>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalanceSpec {
    /// roundRobin (default), leastConn, random, weightedRandom, ipHash, headerHash
    pub policy: String,
    pub header_hash_key: String,
}

impl LoadBalanceSpec {
    pub fn validate(&self) -> Result<(), SpecError> {
        match self.policy.as_str() {
            "" | "roundRobin" | "leastConn" | "random" | "weightedRandom" | "ipHash" => Ok(()),
            "headerHash" if self.header_hash_key.is_empty() => Err(SpecError::NoHeaderHashKey),
            "headerHash" => Ok(()),
            other => Err(SpecError::UnsupportedPolicy(other.to_string())),
        }
    }
}

/// Build the load balancer for a validated spec.
pub fn new_load_balancer(spec: &LoadBalanceSpec) -> Result<Box<dyn LoadBalancer>, SpecError> {
    spec.validate()?;
    let lb: Box<dyn LoadBalancer> = match spec.policy.as_str() {
        "leastConn" => Box::new(least_conn::LeastConnections::new()),
        "random" => Box::new(random::Random),
        "weightedRandom" => Box::new(random::WeightedRandom),
        "ipHash" => Box::new(hash::IpHash),
        "headerHash" => Box::new(hash::HeaderHash::new(spec.header_hash_key.clone())),
        _ => Box::new(round_robin::RoundRobin::new()),
    };
    Ok(lb)
}
