//! Upstream server abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server parsed from configuration
//! - Derive the routing key (`host:port`) its connections are pooled under
//! - Track in-flight requests (for Least Connections LB)

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SpecError;

pub const DEFAULT_WEIGHT: u32 = 1;

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

/// Configuration of one upstream server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl ServerSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), weight: DEFAULT_WEIGHT }
    }
}

/// A single upstream server.
#[derive(Debug)]
pub struct Server {
    /// Parsed base URL.
    pub url: Url,
    /// `host:port`, the key its pooled connections live under.
    pub key: String,
    /// Relative weight for weighted selection.
    pub weight: u32,
    /// Number of requests currently being served.
    pub in_flight: AtomicUsize,
}

impl Server {
    pub fn new(spec: &ServerSpec) -> Result<Self, SpecError> {
        let invalid = |reason: &str| SpecError::ServerUrl {
            url: spec.url.clone(),
            reason: reason.to_string(),
        };

        let url = Url::parse(&spec.url).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid("only http upstreams are supported"));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = url.port_or_known_default().ok_or_else(|| invalid("missing port"))?;
        let key = format!("{host}:{port}");

        Ok(Self {
            key,
            url,
            weight: spec.weight,
            in_flight: AtomicUsize::new(0),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Count a request against this server until the guard drops.
    pub fn track(self: &Arc<Self>) -> ServerGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        ServerGuard { server: self.clone() }
    }
}

/// A RAII guard that manages the in-flight count.
#[derive(Debug)]
pub struct ServerGuard {
    pub server: Arc<Server>,
}

impl Deref for ServerGuard {
    type Target = Server;
    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.server.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
