//! Error types shared across the pool, routing and proxy subsystems.

use thiserror::Error;

/// Boxed error returned by object factories and upstream connections.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by `ResourcePool` and `MultiKeyPool`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("pool is closed")]
    Closed,

    #[error("pool misuse: {0}")]
    Misuse(&'static str),

    #[error("no pool exists for key {0:?}")]
    UnknownKey(String),

    #[error("create pool object failed: {0}")]
    Creation(String),
}

impl PoolError {
    /// True for errors caused by the caller's context ending.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::Canceled | PoolError::DeadlineExceeded)
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

/// Validation failures raised while building pools, matchers and proxies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("empty is conflict with other patterns")]
    EmptyConflict,

    #[error("all patterns are empty")]
    NoPattern,

    #[error("invalid regex {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("headers is not specified")]
    NoHeaders,

    #[error("permil is not specified")]
    NoPermil,

    #[error("permil {0} is out of range 0..=1000")]
    PermilOutOfRange(u32),

    #[error("headerHash needs to specify headerHashKey")]
    NoHeaderHashKey,

    #[error("unsupported policy {0:?}")]
    UnsupportedPolicy(String),

    #[error("pool max size must be positive")]
    MaxSizeNotPositive,

    #[error("max connections {max} per host is less than init connections {init}")]
    InitExceedsMax { init: usize, max: usize },

    #[error("one and only one main pool is required, found {0}")]
    MainPoolCount(usize),

    #[error("no servers configured")]
    NoServers,

    #[error("pool {index}: {reason}")]
    Pool { index: usize, reason: String },

    #[error("invalid server url {url:?}: {reason}")]
    ServerUrl { url: String, reason: String },
}
