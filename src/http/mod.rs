//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout, body buffering)
//!     → Proxy::handle (pool-set selection, pooled upstream exchange)
//!         request.rs helpers (client IP, first header value) used by matchers
//!     → Send upstream response (or outcome error response) to client
//! ```

pub mod request;
pub mod server;

pub use request::{first_header, peer_ip, real_ip, X_FORWARDED_FOR, X_REAL_IP};
pub use server::{AppState, HttpServer};
