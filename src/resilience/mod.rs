//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Config [[resilience]] entries
//!     → circuit_breaker.rs (one named breaker per policy)
//!     → Proxy::inject_resilience_policy (pool-sets look up their policy by name)
//!
//! Request through a pool-set:
//!     → breaker open? → shortCircuited, upstream untouched
//!     → otherwise send, then record success or failure
//!
//! Pool object creation:
//!     → factory fails → backoff.rs (jittered exponential delay before retry)
//! ```
//!
//! # Design Decisions
//! - Breakers are per pool-set, shared by name across config reloads
//! - Fail fast in Open state (no waiting for timeout)
//! - Jittered backoff prevents thundering herd on a failing upstream

pub mod backoff;
pub mod circuit_breaker;

use std::collections::HashMap;
use std::sync::Arc;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerSpec, CircuitState};

/// Named policies injected into the proxy.
pub type ResiliencePolicies = HashMap<String, Arc<CircuitBreaker>>;

/// Build breakers from configuration, keeping the state of breakers that
/// already exist under an unchanged spec.
pub fn build_policies(specs: &[CircuitBreakerSpec], previous: Option<&ResiliencePolicies>) -> ResiliencePolicies {
    specs
        .iter()
        .map(|spec| {
            let breaker = previous
                .and_then(|prev| prev.get(&spec.name))
                .filter(|existing| existing.spec() == spec)
                .cloned()
                .unwrap_or_else(|| Arc::new(CircuitBreaker::new(spec.clone())));
            (spec.name.clone(), breaker)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, failures: u32) -> CircuitBreakerSpec {
        CircuitBreakerSpec { name: name.into(), failure_threshold: failures, ..Default::default() }
    }

    #[test]
    fn test_unchanged_policies_survive_rebuild() {
        let first = build_policies(&[spec("a", 3), spec("b", 3)], None);
        let second = build_policies(&[spec("a", 3), spec("b", 5)], Some(&first));
        assert!(Arc::ptr_eq(&first["a"], &second["a"]));
        assert!(!Arc::ptr_eq(&first["b"], &second["b"]));
    }
}
