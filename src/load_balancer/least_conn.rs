//! Least Connections load balancing strategy.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;

use crate::load_balancer::{server::Server, LoadBalancer};

/// Least connections selector.
/// Selects the server with the fewest in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_server(&self, servers: &[Arc<Server>], _req: &Request<Body>) -> Option<Arc<Server>> {
        // In case of tie, the first one is selected (stability)
        servers.iter().min_by_key(|s| s.in_flight()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::tests::{request, servers};

    #[test]
    fn test_least_conn() {
        let lb = LeastConnections::new();
        let servers = servers(&["http://127.0.0.1:8080", "http://127.0.0.1:8081"]);
        let req = request(&[]);

        let _busy = servers[0].track();
        assert_eq!(lb.next_server(&servers, &req).unwrap().key, "127.0.0.1:8081");

        let _b1 = servers[1].track();
        let _b2 = servers[1].track();
        assert_eq!(lb.next_server(&servers, &req).unwrap().key, "127.0.0.1:8080");
    }
}
