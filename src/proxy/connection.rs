//! Upstream connections held in the pool.
//!
//! # Responsibilities
//! - Define what the proxy needs from a pooled connection (`Connection`)
//! - Define how connections are opened for a `host:port` key (`Connector`)
//! - Provide the HTTP/1.1 implementation over hyper
//!
//! # Design Decisions
//! - Response bodies are buffered before the connection goes back to the
//!   pool; an HTTP/1.1 connection cannot carry the next request until the
//!   previous body is consumed
//! - Connect timeout is shared with the proxy so a reload can change it
//!   without rebuilding the pool factory

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::error::BoxError;
use crate::pool::{Context, PoolObject};

/// A reusable connection to one upstream server.
pub trait Connection: Send + 'static {
    /// Send a request and return the fully buffered response.
    fn send(&mut self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, BoxError>>;

    /// Release the underlying socket. Idempotent.
    fn close(&mut self);

    /// Cheap liveness check.
    fn is_open(&self) -> bool;
}

pub type PooledConnection = Box<dyn Connection>;

impl PoolObject for PooledConnection {
    fn destroy(&mut self) {
        self.close();
    }

    fn health_check(&self) -> bool {
        self.is_open()
    }
}

/// Opens connections for the pool factory.
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `ctx.key()` (a `host:port`).
    fn connect(&self, ctx: Context) -> BoxFuture<'_, Result<PooledConnection, BoxError>>;
}

/// Connect timeout in milliseconds, 0 meaning no limit.
#[derive(Debug, Default)]
pub struct ConnectTimeout(AtomicU64);

impl ConnectTimeout {
    pub fn new(limit: Option<Duration>) -> Self {
        let timeout = Self::default();
        timeout.set(limit);
        timeout
    }

    pub fn set(&self, limit: Option<Duration>) {
        let ms = limit.map_or(0, |d| d.as_millis().min(u128::from(u64::MAX)) as u64);
        self.0.store(ms, Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<Duration> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Opens plain HTTP/1.1 connections.
#[derive(Debug)]
pub struct Http1Connector {
    connect_timeout: Arc<ConnectTimeout>,
    max_body_bytes: usize,
}

impl Http1Connector {
    pub fn new(connect_timeout: Arc<ConnectTimeout>, max_body_bytes: usize) -> Self {
        Self { connect_timeout, max_body_bytes }
    }

    async fn dial(&self, target: &str) -> Result<TcpStream, BoxError> {
        let stream = match self.connect_timeout.get() {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(target))
                .await
                .map_err(|_| BoxError::from(format!("connect to {target} timed out after {limit:?}")))??,
            None => TcpStream::connect(target).await?,
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl Connector for Http1Connector {
    fn connect(&self, ctx: Context) -> BoxFuture<'_, Result<PooledConnection, BoxError>> {
        Box::pin(async move {
            let target = ctx.key().to_string();
            let stream = tokio::select! {
                stream = self.dial(&target) => stream?,
                err = ctx.done() => return Err(err.into()),
            };

            let (sender, conn) = http1::handshake::<_, Body>(TokioIo::new(stream)).await?;
            let driver = tokio::spawn({
                let target = target.clone();
                async move {
                    if let Err(e) = conn.await {
                        tracing::debug!(upstream = %target, error = %e, "Upstream connection ended");
                    }
                }
            });

            tracing::debug!(upstream = %target, "Opened upstream connection");
            let conn: PooledConnection = Box::new(Http1Connection {
                sender,
                driver,
                max_body_bytes: self.max_body_bytes,
            });
            Ok(conn)
        })
    }
}

/// One HTTP/1.1 client connection and the task driving it.
pub struct Http1Connection {
    sender: SendRequest<Body>,
    driver: JoinHandle<()>,
    max_body_bytes: usize,
}

impl Connection for Http1Connection {
    fn send(&mut self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, BoxError>> {
        Box::pin(async move {
            self.sender.ready().await?;
            let response = self.sender.send_request(req).await?;
            let (parts, body) = response.into_parts();
            let bytes = axum::body::to_bytes(Body::new(body), self.max_body_bytes).await?;
            Ok(Response::from_parts(parts, Body::from(bytes)))
        })
    }

    fn close(&mut self) {
        self.driver.abort();
    }

    fn is_open(&self) -> bool {
        !self.sender.is_closed() && !self.driver.is_finished()
    }
}

impl Drop for Http1Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
