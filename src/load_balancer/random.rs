//! Random and weighted-random load balancing strategies.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use rand::Rng;

use crate::load_balancer::{server::Server, LoadBalancer};

/// Uniform random selector.
#[derive(Debug, Default)]
pub struct Random;

impl LoadBalancer for Random {
    fn next_server(&self, servers: &[Arc<Server>], _req: &Request<Body>) -> Option<Arc<Server>> {
        if servers.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..servers.len());
        Some(servers[index].clone())
    }
}

/// Picks a server with probability proportional to its weight.
/// Servers of weight zero are never chosen unless every weight is zero.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl LoadBalancer for WeightedRandom {
    fn next_server(&self, servers: &[Arc<Server>], req: &Request<Body>) -> Option<Arc<Server>> {
        let total: u64 = servers.iter().map(|s| u64::from(s.weight)).sum();
        if total == 0 {
            return Random.next_server(servers, req);
        }

        let mut pick = rand::thread_rng().gen_range(0..total);
        for server in servers {
            let weight = u64::from(server.weight);
            if pick < weight {
                return Some(server.clone());
            }
            pick -= weight;
        }
        None
    }
}
