//! Proxy: picks a pool-set for every request and owns the connection pools.
//!
//! # Responsibilities
//! - Validate the proxy spec (one main pool-set, sane pool bounds)
//! - Evaluate candidate filters in order, fall back to the main pool-set
//! - Build the next generation on reload without dropping live connections
//! - Close pool-sets and connection pools on shutdown

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response};
use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::filters::PROXY_KIND;
use crate::observability::metrics;
use crate::pool::{MultiKeyPool, PoolSpec, PoolStats};
use crate::proxy::connection::{ConnectTimeout, Connector, Http1Connector, PooledConnection};
use crate::proxy::outcome::Outcome;
use crate::proxy::server_pool::{ServerPool, ServerPoolSpec, ServerPoolStatus, Timeouts};
use crate::resilience::ResiliencePolicies;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySpec {
    pub name: String,
    /// Filter kind; must be registered in `filters::Registry`.
    pub kind: String,
    /// Exactly one entry without a filter: the main pool-set.
    pub pools: Vec<ServerPoolSpec>,
    /// Whole upstream exchange, in milliseconds. 0 means no limit.
    pub timeout_ms: u64,
    /// Waiting for a pooled connection, in milliseconds. 0 means no limit.
    pub borrow_timeout_ms: u64,
    /// Opening a new upstream connection, in milliseconds. 0 means no limit.
    pub connect_timeout_ms: u64,
    pub init_conns_per_host: usize,
    pub max_idle_conns_per_host: usize,
    pub check_when_get: bool,
    pub check_when_put: bool,
}

impl Default for ProxySpec {
    fn default() -> Self {
        Self {
            name: "proxy".to_string(),
            kind: PROXY_KIND.to_string(),
            pools: Vec::new(),
            timeout_ms: 30_000,
            borrow_timeout_ms: 1_000,
            connect_timeout_ms: 1_000,
            init_conns_per_host: 1,
            max_idle_conns_per_host: 16,
            check_when_get: true,
            check_when_put: true,
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl ProxySpec {
    /// Every problem with this spec, in pool order.
    pub fn errors(&self) -> Vec<SpecError> {
        let mut errors = Vec::new();

        for (index, pool) in self.pools.iter().enumerate() {
            if let Err(e) = pool.validate() {
                errors.push(SpecError::Pool { index, reason: e.to_string() });
            }
        }

        let main_pools = self.pools.iter().filter(|p| p.filter.is_none()).count();
        if main_pools != 1 {
            errors.push(SpecError::MainPoolCount(main_pools));
        }

        if self.max_idle_conns_per_host == 0 {
            errors.push(SpecError::MaxSizeNotPositive);
        } else if self.max_idle_conns_per_host < self.init_conns_per_host {
            errors.push(SpecError::InitExceedsMax {
                init: self.init_conns_per_host,
                max: self.max_idle_conns_per_host,
            });
        }

        errors
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        match self.errors().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts {
            request: millis(self.timeout_ms),
            borrow: millis(self.borrow_timeout_ms),
        }
    }
}

/// Result of one proxied request.
pub struct Handled {
    /// Name of the pool-set that served the request.
    pub pool: String,
    pub outcome: Outcome,
    pub response: Response<Body>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    pub name: String,
    pub main_pool: ServerPoolStatus,
    pub candidate_pools: Vec<ServerPoolStatus>,
    pub connection_pools: Vec<PoolStats>,
}

pub struct Proxy {
    name: String,
    main_pool: ServerPool,
    candidate_pools: Vec<ServerPool>,
    pool: Arc<MultiKeyPool<PooledConnection>>,
    connect_timeout: Arc<ConnectTimeout>,
    timeouts: Timeouts,
}

impl Proxy {
    /// Build a proxy that opens plain HTTP/1.1 upstream connections.
    pub fn new(spec: &ProxySpec, max_body_bytes: usize) -> Result<Self, SpecError> {
        let connect_timeout = Arc::new(ConnectTimeout::new(millis(spec.connect_timeout_ms)));
        let connector = Arc::new(Http1Connector::new(connect_timeout.clone(), max_body_bytes));
        Self::with_connector(spec, connector, connect_timeout)
    }

    /// Build a proxy whose pools get connections from `connector`.
    pub fn with_connector(
        spec: &ProxySpec,
        connector: Arc<dyn Connector>,
        connect_timeout: Arc<ConnectTimeout>,
    ) -> Result<Self, SpecError> {
        spec.validate()?;
        let pool_spec = PoolSpec::new(spec.init_conns_per_host, spec.max_idle_conns_per_host, move |ctx| {
            let connector = connector.clone();
            async move { connector.connect(ctx).await }
        })?
        .with_checks(spec.check_when_get, spec.check_when_put);

        let pool = Arc::new(MultiKeyPool::new(Arc::new(pool_spec)));
        Self::build(spec, pool, connect_timeout)
    }

    /// Build the next generation from `previous`.
    ///
    /// Pool-sets are rebuilt from the new spec. The connection pools are
    /// kept and only their bounds change, so idle and borrowed connections
    /// survive the reload.
    pub fn inherit(spec: &ProxySpec, previous: &Proxy) -> Result<Self, SpecError> {
        spec.validate()?;
        previous
            .pool
            .spec()
            .set_bounds(spec.init_conns_per_host, spec.max_idle_conns_per_host)?;
        previous.connect_timeout.set(millis(spec.connect_timeout_ms));

        tracing::info!(
            proxy = %spec.name,
            init = spec.init_conns_per_host,
            max = spec.max_idle_conns_per_host,
            "Inherited connection pools from previous generation"
        );
        Self::build(spec, previous.pool.clone(), previous.connect_timeout.clone())
    }

    fn build(
        spec: &ProxySpec,
        pool: Arc<MultiKeyPool<PooledConnection>>,
        connect_timeout: Arc<ConnectTimeout>,
    ) -> Result<Self, SpecError> {
        let mut main_pool = None;
        let mut candidate_pools = Vec::new();

        for pool_spec in &spec.pools {
            if pool_spec.filter.is_none() {
                let name = format!("proxy#{}#main", spec.name);
                main_pool = Some(ServerPool::new(name, pool_spec)?);
            } else {
                let name = format!("proxy#{}#candidate#{}", spec.name, candidate_pools.len());
                candidate_pools.push(ServerPool::new(name, pool_spec)?);
            }
        }

        let main_pool = main_pool.ok_or(SpecError::MainPoolCount(0))?;
        Ok(Self {
            name: spec.name.clone(),
            main_pool,
            candidate_pools,
            pool,
            connect_timeout,
            timeouts: spec.timeouts(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Outer bound on one `handle` call: borrow, connect and request
    /// limits plus a second of slack. `None` when requests are unbounded.
    pub fn handle_timeout(&self) -> Option<Duration> {
        let request = self.timeouts.request?;
        let borrow = self.timeouts.borrow.unwrap_or_default();
        let connect = self.connect_timeout.get().unwrap_or_default();
        Some(request + borrow + connect + Duration::from_secs(1))
    }

    /// Route the request: first matching candidate, otherwise main.
    pub fn select(&self, req: &Request<Body>) -> &ServerPool {
        self.candidate_pools
            .iter()
            .find(|pool| pool.matches(req))
            .unwrap_or(&self.main_pool)
    }

    pub async fn handle(&self, req: Request<Body>) -> Handled {
        let start = Instant::now();
        let server_pool = self.select(&req);
        let (outcome, response) = server_pool.handle(&self.pool, self.timeouts, req).await;

        metrics::record_request(server_pool.name(), outcome.as_str(), start);
        tracing::debug!(
            pool = %server_pool.name(),
            outcome = %outcome,
            status = response.status().as_u16(),
            "Request handled"
        );

        Handled {
            pool: server_pool.name().to_string(),
            outcome,
            response,
        }
    }

    /// Attach named resilience policies to every pool-set that refers to one.
    pub fn inject_resilience_policy(&mut self, policies: &ResiliencePolicies) {
        self.main_pool.inject_resilience_policy(policies);
        for pool in &mut self.candidate_pools {
            pool.inject_resilience_policy(policies);
        }
    }

    /// Close the main pool-set, then every candidate, then the connection pools.
    ///
    /// In-flight requests keep their connections; those are destroyed when
    /// returned. Drain traffic before calling this.
    pub async fn close(&self) {
        self.main_pool.close();
        for pool in &self.candidate_pools {
            pool.close();
        }
        self.pool.close().await;
        tracing::info!(proxy = %self.name, "Proxy closed");
    }

    pub fn status(&self) -> ProxyStatus {
        ProxyStatus {
            name: self.name.clone(),
            main_pool: self.main_pool.status(),
            candidate_pools: self.candidate_pools.iter().map(ServerPool::status).collect(),
            connection_pools: self.pool.stats(),
        }
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.pool.stats()
    }
}
