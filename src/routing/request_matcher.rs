//! Traffic segment matching for candidate pool-sets.
//!
//! # Responsibilities
//! - Validate `RequestMatcherSpec` from configuration
//! - Build one of four policies: general, ipHash, headerHash, random
//!
//! # Design Decisions
//! - Splits are per-mille (0..=1000) for fine-grained canaries
//! - Hash policies use FNV-1 32-bit so the same client always lands on
//!   the same side of the split without any server-side state

use std::collections::BTreeMap;

use axum::body::Body;
use axum::http::Request;
use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::http::request::{first_header, header_values, real_ip};
use crate::routing::matcher::{Matcher, StringMatcher, StringMatcherSpec, UrlMatcher, UrlMatcherSpec};

const PERMIL_MAX: u32 = 1000;

/// Matching policy named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    General,
    IpHash,
    HeaderHash,
    Random,
}

impl Policy {
    /// Parse a policy name. The empty string means `general`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "" | "general" => Some(Policy::General),
            "ipHash" => Some(Policy::IpHash),
            "headerHash" => Some(Policy::HeaderHash),
            "random" => Some(Policy::Random),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestMatcherSpec {
    pub policy: String,
    pub match_all_headers: bool,
    pub headers: BTreeMap<String, StringMatcherSpec>,
    pub urls: Vec<UrlMatcherSpec>,
    pub permil: u32,
    pub header_hash_key: String,
}

impl RequestMatcherSpec {
    pub fn validate(&self) -> Result<(), SpecError> {
        match Policy::parse(&self.policy) {
            Some(Policy::General) => {
                if self.headers.is_empty() {
                    return Err(SpecError::NoHeaders);
                }
            }
            Some(_) => {
                if self.permil == 0 {
                    return Err(SpecError::NoPermil);
                }
                if self.permil > PERMIL_MAX {
                    return Err(SpecError::PermilOutOfRange(self.permil));
                }
            }
            None => return Err(SpecError::UnsupportedPolicy(self.policy.clone())),
        }

        for rule in self.headers.values() {
            rule.validate()?;
        }
        for url in &self.urls {
            url.url.validate()?;
        }

        if Policy::parse(&self.policy) == Some(Policy::HeaderHash) && self.header_hash_key.is_empty() {
            return Err(SpecError::NoHeaderHashKey);
        }
        Ok(())
    }
}

/// Build the matcher for a spec.
///
/// An unknown policy cannot pass `validate`; if one arrives anyway it is
/// logged and served by ip hashing.
pub fn new_request_matcher(spec: &RequestMatcherSpec) -> Result<Box<dyn Matcher>, SpecError> {
    let policy = Policy::parse(&spec.policy).unwrap_or_else(|| {
        tracing::error!(policy = %spec.policy, "BUG: unsupported probability policy, falling back to ipHash");
        Policy::IpHash
    });

    let matcher: Box<dyn Matcher> = match policy {
        Policy::General => Box::new(GeneralMatcher::new(spec)?),
        Policy::IpHash => Box::new(IpHashMatcher { permil: spec.permil }),
        Policy::HeaderHash => Box::new(HeaderHashMatcher {
            permil: spec.permil,
            header_hash_key: spec.header_hash_key.clone(),
        }),
        Policy::Random => Box::new(RandomMatcher { permil: spec.permil }),
    };
    Ok(matcher)
}

/// 32-bit FNV-1 (multiply, then xor).
pub fn fnv1_32(data: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 2_166_136_261;
    const PRIME: u32 = 16_777_619;

    data.iter().fold(OFFSET_BASIS, |hash, byte| hash.wrapping_mul(PRIME) ^ u32::from(*byte))
}

fn within_permil(value: u32, permil: u32) -> bool {
    value % PERMIL_MAX < permil
}

/// Header rules, optionally narrowed by URL rules.
#[derive(Debug)]
pub struct GeneralMatcher {
    match_all_headers: bool,
    headers: Vec<(String, StringMatcher)>,
    urls: Vec<UrlMatcher>,
}

impl GeneralMatcher {
    pub fn new(spec: &RequestMatcherSpec) -> Result<Self, SpecError> {
        let headers = spec
            .headers
            .iter()
            .map(|(name, rule)| Ok((name.clone(), StringMatcher::new(rule)?)))
            .collect::<Result<Vec<_>, SpecError>>()?;
        let urls = spec.urls.iter().map(UrlMatcher::new).collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            match_all_headers: spec.match_all_headers,
            headers,
            urls,
        })
    }

    // An absent header is matched as the empty string.
    fn header_matches(req: &Request<Body>, name: &str, rule: &StringMatcher) -> bool {
        let values = header_values(req, name);
        if values.is_empty() {
            rule.matches("")
        } else {
            rule.matches_any(values)
        }
    }
}

impl Matcher for GeneralMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let mut rules = self.headers.iter();
        let headers_matched = if self.match_all_headers {
            rules.all(|(name, rule)| Self::header_matches(req, name, rule))
        } else {
            rules.any(|(name, rule)| Self::header_matches(req, name, rule))
        };

        if !headers_matched {
            return false;
        }
        self.urls.is_empty() || self.urls.iter().any(|url| url.matches(req))
    }
}

#[derive(Debug)]
pub struct IpHashMatcher {
    permil: u32,
}

impl Matcher for IpHashMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        within_permil(fnv1_32(real_ip(req).as_bytes()), self.permil)
    }
}

#[derive(Debug)]
pub struct HeaderHashMatcher {
    permil: u32,
    header_hash_key: String,
}

impl Matcher for HeaderHashMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let value = first_header(req, &self.header_hash_key).unwrap_or("");
        within_permil(fnv1_32(value.as_bytes()), self.permil)
    }
}

#[derive(Debug)]
pub struct RandomMatcher {
    permil: u32,
}

impl Matcher for RandomMatcher {
    fn matches(&self, _req: &Request<Body>) -> bool {
        within_permil(rand::random::<u32>(), self.permil)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)], path: &str) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn spec(policy: &str, permil: u32) -> RequestMatcherSpec {
        RequestMatcherSpec { policy: policy.into(), permil, ..Default::default() }
    }

    #[test]
    fn test_fnv1_reference_values() {
        assert_eq!(fnv1_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1_32(b"a"), 0x050c_5d7e);
        assert_eq!(fnv1_32(b"foobar"), 0x31f0_b262);
    }

    #[test]
    fn test_validation() {
        assert_eq!(RequestMatcherSpec::default().validate(), Err(SpecError::NoHeaders));
        assert_eq!(spec("random", 0).validate(), Err(SpecError::NoPermil));
        assert_eq!(spec("random", 1001).validate(), Err(SpecError::PermilOutOfRange(1001)));
        assert_eq!(spec("headerHash", 10).validate(), Err(SpecError::NoHeaderHashKey));
        assert_eq!(
            spec("weighted", 10).validate(),
            Err(SpecError::UnsupportedPolicy("weighted".into()))
        );
        assert!(spec("ipHash", 10).validate().is_ok());

        let mut bad_header = RequestMatcherSpec::default();
        bad_header.headers.insert("X-A".into(), StringMatcherSpec::default());
        assert_eq!(bad_header.validate(), Err(SpecError::NoPattern));
    }

    #[test]
    fn test_random_full_and_partial() {
        let all = new_request_matcher(&spec("random", 1000)).unwrap();
        let req = request(&[], "/");
        assert!((0..500).all(|_| all.matches(&req)));

        let some = new_request_matcher(&spec("random", 500)).unwrap();
        let hits = (0..2000).filter(|_| some.matches(&req)).count();
        assert!(hits > 0 && hits < 2000);
    }

    #[test]
    fn test_header_hash_is_deterministic() {
        let mut s = spec("headerHash", 800);
        s.header_hash_key = "X-User".into();
        let m = new_request_matcher(&s).unwrap();

        // fnv1("user-1") % 1000 == 770, fnv1("foobar") % 1000 == 890
        let user = request(&[("X-User", "user-1")], "/");
        assert!((0..100).all(|_| m.matches(&user)));
        let other = request(&[("X-User", "foobar")], "/");
        assert!((0..100).all(|_| !m.matches(&other)));
    }

    #[test]
    fn test_ip_hash_uses_real_ip() {
        // fnv1("10.0.0.1") % 1000 == 169, fnv1("192.168.1.7") % 1000 == 388
        let m = new_request_matcher(&spec("ipHash", 200)).unwrap();
        assert!(m.matches(&request(&[("X-Forwarded-For", "10.0.0.1, 172.16.0.9")], "/")));
        assert!(!m.matches(&request(&[("X-Real-Ip", "192.168.1.7")], "/")));
    }

    #[test]
    fn test_unsupported_policy_degrades_to_ip_hash() {
        let m = new_request_matcher(&spec("weighted", 200)).unwrap();
        assert!(m.matches(&request(&[("X-Real-Ip", "10.0.0.1")], "/")));
        assert!(!m.matches(&request(&[("X-Real-Ip", "192.168.1.7")], "/")));
    }

    fn general(match_all: bool) -> RequestMatcherSpec {
        let mut s = RequestMatcherSpec { match_all_headers: match_all, ..Default::default() };
        s.headers.insert("X-Canary".into(), StringMatcherSpec::exact("true"));
        s.headers.insert("X-Region".into(), StringMatcherSpec::prefix("eu-"));
        s
    }

    #[test]
    fn test_general_any_header() {
        let m = new_request_matcher(&general(false)).unwrap();
        assert!(m.matches(&request(&[("X-Canary", "true")], "/")));
        assert!(m.matches(&request(&[("X-Region", "eu-west")], "/")));
        assert!(!m.matches(&request(&[("X-Canary", "false")], "/")));
        assert!(!m.matches(&request(&[], "/")));
    }

    #[test]
    fn test_general_all_headers() {
        let m = new_request_matcher(&general(true)).unwrap();
        assert!(m.matches(&request(&[("X-Canary", "true"), ("X-Region", "eu-west")], "/")));
        assert!(!m.matches(&request(&[("X-Canary", "true")], "/")));
    }

    #[test]
    fn test_general_absent_header_matches_empty_rule() {
        let mut s = RequestMatcherSpec::default();
        s.headers.insert("X-Debug".into(), StringMatcherSpec::empty());
        let m = new_request_matcher(&s).unwrap();
        assert!(m.matches(&request(&[], "/")));
        assert!(!m.matches(&request(&[("X-Debug", "1")], "/")));
    }

    #[test]
    fn test_general_header_values_any() {
        let mut s = RequestMatcherSpec { match_all_headers: true, ..Default::default() };
        s.headers.insert("X-Tag".into(), StringMatcherSpec::exact("beta"));
        let m = new_request_matcher(&s).unwrap();
        assert!(m.matches(&request(&[("X-Tag", "alpha"), ("X-Tag", "beta")], "/")));
    }

    #[test]
    fn test_general_urls_narrow_header_match() {
        let mut s = general(false);
        s.urls.push(UrlMatcherSpec { url: StringMatcherSpec::prefix("/api") });
        s.urls.push(UrlMatcherSpec { url: StringMatcherSpec::exact("/health") });
        let m = new_request_matcher(&s).unwrap();

        assert!(m.matches(&request(&[("X-Canary", "true")], "/api/users")));
        assert!(m.matches(&request(&[("X-Canary", "true")], "/health")));
        assert!(!m.matches(&request(&[("X-Canary", "true")], "/static/app.js")));
        assert!(!m.matches(&request(&[], "/api/users")));
    }

    #[test]
    fn test_spec_deserializes_camel_case() {
        let s: RequestMatcherSpec = toml::from_str(
            r#"
            policy = "headerHash"
            permil = 250
            headerHashKey = "X-User"
            matchAllHeaders = true
            "#,
        )
        .unwrap();
        assert_eq!(s.header_hash_key, "X-User");
        assert!(s.match_all_headers);
        assert!(s.validate().is_ok());
    }
}
