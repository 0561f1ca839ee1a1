//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every subscriber wakes
//!         front server: stop accepting, drain in-flight requests
//!         admin server: stop accepting
//!         reload task: stop applying config updates
//!     → Proxy::close (pool-sets, then every keyed pool)
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close pools
//! - A config reload never closes pools; only shutdown does

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
