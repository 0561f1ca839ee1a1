//! Semantic configuration validation.
//!
//! # Design Decisions
//! - Every error is collected; the operator sees all problems at once
//! - Runs on startup and on every reload; a failing reload keeps the
//!   current configuration

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::filters::Registry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl ToString) -> Self {
        Self { field: field.into(), message: message.to_string() }
    }
}

pub fn validate_config(config: &ProxyConfig, registry: &Registry) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be positive"));
    }

    if config.observability.metrics_enabled && config.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
        }
    }

    if registry.get(&config.proxy.kind).is_none() {
        errors.push(ValidationError::new("proxy.kind", format!("unknown filter kind {:?}", config.proxy.kind)));
    }
    errors.extend(config.proxy.errors().into_iter().map(|e| ValidationError::new("proxy", e)));

    let mut policies = HashSet::new();
    for (i, policy) in config.resilience.iter().enumerate() {
        if policy.name.is_empty() {
            errors.push(ValidationError::new(format!("resilience[{i}].name"), "must not be empty"));
        } else if !policies.insert(policy.name.as_str()) {
            errors.push(ValidationError::new(format!("resilience[{i}].name"), format!("duplicate policy {:?}", policy.name)));
        }
        if policy.failure_threshold == 0 {
            errors.push(ValidationError::new(format!("resilience[{i}].failure_threshold"), "must be positive"));
        }
    }

    for (i, pool) in config.proxy.pools.iter().enumerate() {
        let policy = &pool.circuit_breaker_policy;
        if !policy.is_empty() && !policies.contains(policy.as_str()) {
            errors.push(ValidationError::new(
                format!("proxy.pools[{i}].circuit_breaker_policy"),
                format!("unknown policy {policy:?}"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
