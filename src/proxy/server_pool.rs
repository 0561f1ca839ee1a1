//! Pool-set: a group of upstream servers the proxy can route to.
//!
//! # Responsibilities
//! - Own the servers, their load balancer and the optional request filter
//! - Borrow a connection for the chosen server and forward the request
//! - Return or destroy the connection depending on how the exchange went
//! - Translate every failure into an `Outcome`
//!
//! # Design Decisions
//! - The chosen server's `host:port` is the routing key on the borrow
//!   context, so each server gets its own bounded pool
//! - A connection whose exchange failed or timed out is discarded, never reused
//! - The connection is held in a pool guard, so a caller that stops polling
//!   mid-exchange destroys it and frees the server's slot
//! - An open circuit breaker answers before any connection is borrowed

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode, Uri};
use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::http::request::{peer_ip, X_FORWARDED_FOR};
use crate::load_balancer::{new_load_balancer, LoadBalanceSpec, LoadBalancer, Server, ServerSpec};
use crate::pool::{Context, MultiKeyPool};
use crate::proxy::connection::PooledConnection;
use crate::proxy::outcome::{error_response, Outcome};
use crate::resilience::{CircuitBreaker, CircuitState, ResiliencePolicies};
use crate::routing::{new_request_matcher, Matcher, RequestMatcherSpec};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerPoolSpec {
    pub servers: Vec<ServerSpec>,
    pub load_balance: LoadBalanceSpec,
    /// Absent on the main pool-set.
    pub filter: Option<RequestMatcherSpec>,
    /// Name of a `[[resilience]]` policy.
    pub circuit_breaker_policy: String,
}

impl ServerPoolSpec {
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.servers.is_empty() {
            return Err(SpecError::NoServers);
        }
        for server in &self.servers {
            Server::new(server)?;
        }
        self.load_balance.validate()?;
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        Ok(())
    }
}

/// Per-request limits shared by every pool-set of a proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    /// Whole upstream exchange.
    pub request: Option<Duration>,
    /// Waiting for a pooled connection.
    pub borrow: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub url: String,
    pub key: String,
    pub weight: u32,
    pub in_flight: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerPoolStatus {
    pub name: String,
    pub servers: Vec<ServerStatus>,
    pub circuit_breaker: Option<CircuitState>,
}

#[derive(Debug)]
pub struct ServerPool {
    name: String,
    servers: Vec<Arc<Server>>,
    load_balancer: Box<dyn LoadBalancer>,
    filter: Option<Box<dyn Matcher>>,
    breaker_policy: String,
    breaker: Option<Arc<CircuitBreaker>>,
    closed: AtomicBool,
}

impl ServerPool {
    pub fn new(name: impl Into<String>, spec: &ServerPoolSpec) -> Result<Self, SpecError> {
        spec.validate()?;
        let servers = spec
            .servers
            .iter()
            .map(|s| Server::new(s).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        let filter = spec.filter.as_ref().map(new_request_matcher).transpose()?;

        Ok(Self {
            name: name.into(),
            servers,
            load_balancer: new_load_balancer(&spec.load_balance)?,
            filter,
            breaker_policy: spec.circuit_breaker_policy.clone(),
            breaker: None,
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if this pool-set has a filter and the request passes it.
    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.filter.as_ref().is_some_and(|f| f.matches(req))
    }

    /// Attach the named circuit breaker, if this pool-set refers to one.
    pub fn inject_resilience_policy(&mut self, policies: &ResiliencePolicies) {
        if self.breaker_policy.is_empty() {
            return;
        }
        self.breaker = policies.get(&self.breaker_policy).cloned();
        if self.breaker.is_none() {
            tracing::warn!(pool = %self.name, policy = %self.breaker_policy, "Circuit breaker policy not found");
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn status(&self) -> ServerPoolStatus {
        ServerPoolStatus {
            name: self.name.clone(),
            servers: self
                .servers
                .iter()
                .map(|s| ServerStatus {
                    url: s.url.to_string(),
                    key: s.key.clone(),
                    weight: s.weight,
                    in_flight: s.in_flight(),
                })
                .collect(),
            circuit_breaker: self.breaker.as_ref().map(|b| b.state()),
        }
    }

    pub async fn handle(
        &self,
        pool: &MultiKeyPool<PooledConnection>,
        timeouts: Timeouts,
        req: Request<Body>,
    ) -> (Outcome, Response<Body>) {
        if self.closed.load(Ordering::Acquire) {
            return (Outcome::InternalError, error_response(StatusCode::SERVICE_UNAVAILABLE, "proxy is closing"));
        }

        let Some(server) = self.load_balancer.next_server(&self.servers, &req) else {
            tracing::warn!(pool = %self.name, "No server available");
            return (Outcome::InternalError, error_response(StatusCode::SERVICE_UNAVAILABLE, "no server available"));
        };

        if let Some(breaker) = &self.breaker {
            if !breaker.allow_request() {
                tracing::debug!(pool = %self.name, server = %server.key, "Short-circuited by circuit breaker");
                return (Outcome::ShortCircuited, error_response(StatusCode::SERVICE_UNAVAILABLE, "circuit open"));
            }
        }

        let req = match rewrite_request(req, &server) {
            Ok(req) => req,
            Err(reason) => {
                tracing::debug!(pool = %self.name, reason, "Rejected malformed request");
                return (Outcome::ClientError, error_response(StatusCode::BAD_REQUEST, reason));
            }
        };

        let _in_flight = server.track();
        let mut ctx = Context::background().with_key(server.key.as_str());
        if let Some(limit) = timeouts.borrow {
            ctx = ctx.with_timeout(limit);
        }

        let mut conn = match pool.borrow(&ctx).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(pool = %self.name, server = %server.key, error = %e, "Borrow connection failed");
                self.record_failure();
                return if e.is_timeout() {
                    (Outcome::ServerError, error_response(StatusCode::GATEWAY_TIMEOUT, "upstream connection unavailable"))
                } else {
                    (Outcome::InternalError, error_response(StatusCode::SERVICE_UNAVAILABLE, "upstream connection unavailable"))
                };
            }
        };

        let sent = match timeouts.request {
            Some(limit) => match tokio::time::timeout(limit, conn.send(req)).await {
                Ok(result) => result.map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string())),
                Err(_) => Err((StatusCode::GATEWAY_TIMEOUT, format!("no response within {limit:?}"))),
            },
            None => conn.send(req).await.map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string())),
        };

        match sent {
            Ok(response) => {
                if let Err(e) = conn.put() {
                    tracing::debug!(pool = %self.name, server = %server.key, error = %e, "Connection not returned to pool");
                }
                let outcome = Outcome::from_status(response.status());
                if outcome == Outcome::ServerError {
                    self.record_failure();
                } else {
                    self.record_success();
                }
                (outcome, response)
            }
            Err((status, reason)) => {
                tracing::warn!(pool = %self.name, server = %server.key, error = %reason, "Upstream request failed");
                conn.discard();
                self.record_failure();
                (Outcome::ServerError, error_response(status, "upstream request failed"))
            }
        }
    }

    fn record_success(&self) {
        if let Some(breaker) = &self.breaker {
            breaker.record_success();
        }
    }

    fn record_failure(&self) {
        if let Some(breaker) = &self.breaker {
            breaker.record_failure();
        }
    }
}

/// Point the request at `server`: origin-form URI under the server's base
/// path, `Host` set to the server, peer IP appended to `X-Forwarded-For`.
fn rewrite_request(req: Request<Body>, server: &Server) -> Result<Request<Body>, &'static str> {
    let peer = peer_ip(&req);
    let (mut parts, body) = req.into_parts();

    let base = server.url.path().trim_end_matches('/');
    let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    parts.uri = format!("{base}{path_and_query}").parse::<Uri>().map_err(|_| "invalid request uri")?;

    let host = HeaderValue::from_str(&server.key).map_err(|_| "invalid upstream host")?;
    parts.headers.insert(header::HOST, host);

    if let Some(peer) = peer {
        let forwarded = match parts.headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.is_empty() => format!("{existing}, {peer}"),
            _ => peer,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            parts.headers.insert(X_FORWARDED_FOR, value);
        }
    }

    Ok(Request::from_parts(parts, body))
}
