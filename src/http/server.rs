//! HTTP front server.
//!
//! # Responsibilities
//! - Create the Axum Router with a single catch-all handler
//! - Wire up middleware (request ID, tracing)
//! - Hand every request to the current `Proxy` generation
//! - Apply configuration updates by building the next generation
//! - Close the proxy once the listener has drained
//!
//! # Design Decisions
//! - The live `Proxy` sits behind `ArcSwap`; a request keeps the generation
//!   it started with even if a reload lands meanwhile
//! - Request bodies are buffered up to `listener.max_body_bytes`
//! - A rejected reload logs and keeps the current generation
//! - The outer request limit comes from the generation serving the request,
//!   so a reload that changes timeouts takes effect on the next request

use std::net::SocketAddr;
use std::sync::Arc;
use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::SpecError;
use crate::lifecycle::{shutdown, Shutdown};
use crate::proxy::outcome::error_response;
use crate::proxy::Proxy;
use crate::resilience::{build_policies, ResiliencePolicies};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    proxy: Arc<ArcSwap<Proxy>>,
    policies: Arc<ArcSwap<ResiliencePolicies>>,
    max_body_bytes: usize,
}

impl AppState {
    /// Build the first proxy generation from `config`.
    pub fn new(config: &ProxyConfig) -> Result<Self, SpecError> {
        let proxy = Proxy::new(&config.proxy, config.listener.max_body_bytes)?;
        Ok(Self::from_proxy(proxy, config))
    }

    /// Wrap an already built proxy, attaching the configured resilience policies.
    pub fn from_proxy(mut proxy: Proxy, config: &ProxyConfig) -> Self {
        let policies = build_policies(&config.resilience, None);
        proxy.inject_resilience_policy(&policies);
        Self {
            proxy: Arc::new(ArcSwap::from_pointee(proxy)),
            policies: Arc::new(ArcSwap::from_pointee(policies)),
            max_body_bytes: config.listener.max_body_bytes,
        }
    }

    /// The proxy generation currently serving traffic.
    pub fn proxy(&self) -> Arc<Proxy> {
        self.proxy.load_full()
    }

    /// Build the next generation from `config` and swap it in.
    pub fn apply(&self, config: &ProxyConfig) -> Result<(), SpecError> {
        let current = self.proxy.load_full();
        let mut next = Proxy::inherit(&config.proxy, &current)?;

        let previous = self.policies.load_full();
        let policies = build_policies(&config.resilience, Some(previous.as_ref()));
        next.inject_resilience_policy(&policies);

        self.policies.store(Arc::new(policies));
        self.proxy.store(Arc::new(next));
        tracing::info!(proxy = %config.proxy.name, pools = config.proxy.pools.len(), "Configuration applied");
        Ok(())
    }
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server serving `state`.
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires, applying config updates meanwhile.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reloader = tokio::spawn({
            let state = self.state.clone();
            let mut stop = shutdown.subscribe();
            async move {
                loop {
                    tokio::select! {
                        update = config_updates.recv() => {
                            let Some(config) = update else { break };
                            if let Err(e) = state.apply(&config) {
                                tracing::error!(error = %e, "Rejected configuration update, keeping current proxy");
                            }
                        }
                        _ = shutdown::recv(&mut stop) => break,
                    }
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown::recv(&mut stop).await })
            .await?;

        reloader.abort();
        self.state.proxy().close().await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, path = %parts.uri.path(), "Request body rejected");
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body rejected");
        }
    };

    let proxy = state.proxy();
    let request = Request::from_parts(parts, Body::from(body));
    let Some(limit) = proxy.handle_timeout() else {
        return proxy.handle(request).await.response;
    };
    match tokio::time::timeout(limit, proxy.handle(request)).await {
        Ok(handled) => handled.response,
        Err(_) => {
            tracing::warn!(proxy = %proxy.name(), limit = ?limit, "Request exceeded proxy time limit");
            error_response(StatusCode::GATEWAY_TIMEOUT, "request timed out")
        }
    }
}
