//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (headers, path, client IP)
//!     → request_matcher.rs (policy: general / ipHash / headerHash / random)
//!         general → matcher.rs (StringMatcher per header, UrlMatcher per path rule)
//!     → Return: request belongs to the segment or not
//!
//! Matcher Compilation (at config load):
//!     RequestMatcherSpec
//!     → validate (all rules, regex syntax, permil range)
//!     → compile regexes once
//!     → Freeze as immutable Box<dyn Matcher>
//! ```
//!
//! # Design Decisions
//! - Matchers compiled at load time, immutable at runtime
//! - Deterministic for hash policies: same input always gives the same answer
//! - First matching candidate wins (evaluated in configured order by the proxy)

pub mod matcher;
pub mod request_matcher;

pub use matcher::{Matcher, StringMatcher, StringMatcherSpec, UrlMatcher, UrlMatcherSpec};
pub use request_matcher::{fnv1_32, new_request_matcher, Policy, RequestMatcherSpec};
