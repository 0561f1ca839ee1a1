//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::proxy::ProxySpec;
use crate::resilience::CircuitBreakerSpec;

/// Root configuration for the pooled proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Front listener.
    pub listener: ListenerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Pool-sets, timeouts and connection pool bounds.
    pub proxy: ProxySpec,

    /// Named circuit breaker policies referenced by pool-sets.
    pub resilience: Vec<CircuitBreakerSpec>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request or upstream response body buffered, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Policy;

    #[test]
    fn test_full_document() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:8080"

            [proxy]
            name = "edge"
            borrow_timeout_ms = 250
            max_idle_conns_per_host = 8

            [[proxy.pools]]
            servers = [{ url = "http://127.0.0.1:9001", weight = 3 }]
            load_balance = { policy = "headerHash", header_hash_key = "X-User" }
            circuit_breaker_policy = "canary-cb"

            [proxy.pools.filter]
            policy = "general"
            matchAllHeaders = true
            headers = { "X-Canary" = { exact = "true" } }
            urls = [{ url = { prefix = "/api" } }]

            [[proxy.pools]]
            servers = [{ url = "http://127.0.0.1:9000" }]

            [[resilience]]
            name = "canary-cb"
            failure_threshold = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.proxy.name, "edge");
        assert_eq!(config.proxy.borrow_timeout_ms, 250);
        assert_eq!(config.proxy.timeout_ms, ProxySpec::default().timeout_ms);
        assert_eq!(config.proxy.pools.len(), 2);

        let canary = &config.proxy.pools[0];
        assert_eq!(canary.servers[0].weight, 3);
        assert_eq!(canary.load_balance.header_hash_key, "X-User");
        let filter = canary.filter.as_ref().unwrap();
        assert_eq!(Policy::parse(&filter.policy), Some(Policy::General));
        assert!(filter.match_all_headers);
        assert_eq!(filter.urls[0].url.prefix, "/api");

        assert!(config.proxy.pools[1].filter.is_none());
        assert_eq!(config.resilience[0].failure_threshold, 3);
        assert_eq!(config.resilience[0].open_ms, 30_000);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config, ProxyConfig::default());
    }
}
