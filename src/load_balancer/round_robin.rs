//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;

use crate::load_balancer::{server::Server, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter to rotate through servers.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, servers: &[Arc<Server>], _req: &Request<Body>) -> Option<Arc<Server>> {
        if servers.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % servers.len();
        Some(servers[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::tests::{request, servers};

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let servers = servers(&["http://127.0.0.1:8080", "http://127.0.0.1:8081"]);
        let req = request(&[]);

        let keys: Vec<_> = (0..3).map(|_| lb.next_server(&servers, &req).unwrap().key.clone()).collect();
        assert_eq!(keys, ["127.0.0.1:8080", "127.0.0.1:8081", "127.0.0.1:8080"]);
        assert!(lb.next_server(&[], &req).is_none());
    }
}
