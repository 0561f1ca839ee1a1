//! Filter kinds known to this process.
//!
//! # Design Decisions
//! - The registry is an explicit value built in `main` and handed to the
//!   config layer; nothing registers itself at load time
//! - A kind advertises the non-success results it can report so callers
//!   can wire resilience and metrics by name

use std::collections::BTreeMap;

use thiserror::Error;

use crate::proxy::Outcome;

/// Kind name of the pooled proxy filter.
pub const PROXY_KIND: &str = "Proxy";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kind {
    pub name: &'static str,
    pub description: &'static str,
    pub results: &'static [&'static str],
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("filter kind {0} is already registered")]
    Duplicate(String),
}

#[derive(Debug, Default)]
pub struct Registry {
    kinds: BTreeMap<&'static str, Kind>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every kind this crate implements.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        // A fresh registry cannot hold a duplicate.
        let _ = registry.register(Kind {
            name: PROXY_KIND,
            description: "Proxy routes requests to pooled upstream connections",
            results: &Outcome::RESULTS,
        });
        registry
    }

    pub fn register(&mut self, kind: Kind) -> Result<(), RegistryError> {
        if self.kinds.contains_key(kind.name) {
            return Err(RegistryError::Duplicate(kind.name.to_string()));
        }
        self.kinds.insert(kind.name, kind);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Kind> {
        self.kinds.get(name)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.kinds.values()
    }
}
