//! Sticky load balancing by client IP or header value.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;

use crate::http::request::{first_header, real_ip};
use crate::load_balancer::{server::Server, LoadBalancer};
use crate::routing::fnv1_32;

fn pick(servers: &[Arc<Server>], value: &str) -> Option<Arc<Server>> {
    if servers.is_empty() {
        return None;
    }
    let index = fnv1_32(value.as_bytes()) as usize % servers.len();
    Some(servers[index].clone())
}

/// Same client IP, same server.
#[derive(Debug, Default)]
pub struct IpHash;

impl LoadBalancer for IpHash {
    fn next_server(&self, servers: &[Arc<Server>], req: &Request<Body>) -> Option<Arc<Server>> {
        pick(servers, &real_ip(req))
    }
}

/// Same value of the configured header, same server.
#[derive(Debug)]
pub struct HeaderHash {
    key: String,
}

impl HeaderHash {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl LoadBalancer for HeaderHash {
    fn next_server(&self, servers: &[Arc<Server>], req: &Request<Body>) -> Option<Arc<Server>> {
        pick(servers, first_header(req, &self.key).unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::tests::{request, servers};

    #[test]
    fn test_ip_hash_is_sticky() {
        let servers = servers(&["http://127.0.0.1:1", "http://127.0.0.1:2", "http://127.0.0.1:3"]);
        let req = request(&[("X-Forwarded-For", "10.0.0.1")]);
        let first = IpHash.next_server(&servers, &req).unwrap();
        for _ in 0..20 {
            assert!(Arc::ptr_eq(&first, &IpHash.next_server(&servers, &req).unwrap()));
        }
    }

    #[test]
    fn test_header_hash_index() {
        // fnv1("user-1") = 0xebcc6442, fnv1("user-2") = 0xebcc6441
        let servers = servers(&["http://127.0.0.1:1", "http://127.0.0.1:2"]);
        let lb = HeaderHash::new("X-User");
        assert_eq!(lb.next_server(&servers, &request(&[("X-User", "user-1")])).unwrap().key, "127.0.0.1:1");
        assert_eq!(lb.next_server(&servers, &request(&[("X-User", "user-2")])).unwrap().key, "127.0.0.1:2");
    }
}
