//! String and URL matching rules.
//!
//! # Responsibilities
//! - Match a single string by exact value, prefix, regex or emptiness
//! - Match the request path against a list of URL rules
//!
//! # Design Decisions
//! - Regexes compiled once when the matcher is built, shared read-only after
//! - Rules checked in a fixed order: empty, exact, prefix, regex
//! - An invalid regex is a configuration error, never a runtime one

use std::fmt::Debug;

use axum::body::Body;
use axum::http::Request;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// Configuration of a `StringMatcher`. Exactly one mode should be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StringMatcherSpec {
    pub exact: String,
    pub prefix: String,
    pub regex: String,
    pub empty: bool,
}

impl StringMatcherSpec {
    pub fn exact(value: impl Into<String>) -> Self {
        Self { exact: value.into(), ..Self::default() }
    }

    pub fn prefix(value: impl Into<String>) -> Self {
        Self { prefix: value.into(), ..Self::default() }
    }

    pub fn regex(value: impl Into<String>) -> Self {
        Self { regex: value.into(), ..Self::default() }
    }

    pub fn empty() -> Self {
        Self { empty: true, ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if self.empty {
            if !self.exact.is_empty() || !self.prefix.is_empty() || !self.regex.is_empty() {
                return Err(SpecError::EmptyConflict);
            }
            return Ok(());
        }

        if self.exact.is_empty() && self.prefix.is_empty() && self.regex.is_empty() {
            return Err(SpecError::NoPattern);
        }

        if !self.regex.is_empty() {
            compile(&self.regex)?;
        }
        Ok(())
    }
}

fn compile(pattern: &str) -> Result<Regex, SpecError> {
    Regex::new(pattern).map_err(|e| SpecError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Compiled, immutable string rule.
#[derive(Debug, Clone)]
pub struct StringMatcher {
    exact: Option<String>,
    prefix: Option<String>,
    pattern: Option<Regex>,
    match_empty: bool,
}

impl StringMatcher {
    pub fn new(spec: &StringMatcherSpec) -> Result<Self, SpecError> {
        spec.validate()?;
        let non_empty = |s: &String| (!s.is_empty()).then(|| s.clone());
        let pattern = if spec.regex.is_empty() { None } else { Some(compile(&spec.regex)?) };

        Ok(Self {
            exact: non_empty(&spec.exact),
            prefix: non_empty(&spec.prefix),
            pattern,
            match_empty: spec.empty,
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        if self.match_empty && value.is_empty() {
            return true;
        }

        if self.exact.as_deref() == Some(value) {
            return true;
        }

        if let Some(prefix) = &self.prefix {
            if value.starts_with(prefix.as_str()) {
                return true;
            }
        }

        self.pattern.as_ref().is_some_and(|re| re.is_match(value))
    }

    /// True if any value matches; stops at the first hit.
    pub fn matches_any<'a, I>(&self, values: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        values.into_iter().any(|v| self.matches(v))
    }
}

/// Configuration of a `UrlMatcher`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMatcherSpec {
    pub url: StringMatcherSpec,
}

/// Matches the request path.
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    url: StringMatcher,
}

impl UrlMatcher {
    pub fn new(spec: &UrlMatcherSpec) -> Result<Self, SpecError> {
        Ok(Self { url: StringMatcher::new(&spec.url)? })
    }
}

impl Matcher for UrlMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.url.matches(req.uri().path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(spec: StringMatcherSpec) -> StringMatcher {
        StringMatcher::new(&spec).unwrap()
    }

    #[test]
    fn test_exact() {
        let m = matcher(StringMatcherSpec::exact("/a"));
        assert!(m.matches("/a"));
        assert!(!m.matches("/b"));
        assert!(!m.matches("/ab"));
    }

    #[test]
    fn test_prefix() {
        let m = matcher(StringMatcherSpec::prefix("/a"));
        assert!(m.matches("/ab"));
        assert!(m.matches("/a"));
        assert!(!m.matches("/b"));
    }

    #[test]
    fn test_empty() {
        let m = matcher(StringMatcherSpec::empty());
        assert!(m.matches(""));
        assert!(!m.matches("x"));
    }

    #[test]
    fn test_regex_is_unanchored() {
        let m = matcher(StringMatcherSpec::regex(r"v\d+"));
        assert!(m.matches("/api/v2/users"));
        assert!(!m.matches("/api/latest"));
    }

    #[test]
    fn test_matches_any() {
        let m = matcher(StringMatcherSpec::exact("beta"));
        assert!(m.matches_any(["alpha", "beta"]));
        assert!(!m.matches_any(["alpha", "gamma"]));
        assert!(!m.matches_any(Vec::<&str>::new()));
    }

    #[test]
    fn test_validation() {
        assert_eq!(StringMatcherSpec::default().validate(), Err(SpecError::NoPattern));

        let conflict = StringMatcherSpec { empty: true, prefix: "/x".into(), ..Default::default() };
        assert_eq!(conflict.validate(), Err(SpecError::EmptyConflict));

        let bad = StringMatcherSpec::regex("(unclosed");
        assert!(matches!(bad.validate(), Err(SpecError::InvalidRegex { .. })));
        assert!(StringMatcher::new(&bad).is_err());
    }

    #[test]
    fn test_url_matcher_uses_path() {
        let m = UrlMatcher::new(&UrlMatcherSpec { url: StringMatcherSpec::prefix("/api") }).unwrap();
        let req = Request::builder()
            .uri("http://example.com/api/v1?q=1")
            .body(Body::empty())
            .unwrap();
        assert!(m.matches(&req));

        let req = Request::builder()
            .uri("http://example.com/images")
            .body(Body::empty())
            .unwrap();
        assert!(!m.matches(&req));
    }
}
