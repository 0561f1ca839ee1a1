//! Request inspection helpers shared by matchers and the proxy.
//!
//! # Design Decisions
//! - Proxy headers win over the socket address so clients behind a
//!   trusted load balancer hash on their own IP
//! - Helpers are generic over the body type; only headers are read

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// The client's IP: first `X-Forwarded-For` entry, then `X-Real-Ip`,
/// then the peer address. Empty when none is known.
pub fn real_ip<B>(req: &Request<B>) -> String {
    if let Some(forwarded) = first_header(req, X_FORWARDED_FOR) {
        if let Some(ip) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
            return ip.to_string();
        }
    }

    if let Some(ip) = first_header(req, X_REAL_IP).map(str::trim).filter(|ip| !ip.is_empty()) {
        return ip.to_string();
    }

    peer_ip(req).unwrap_or_default()
}

/// IP of the directly connected peer, when the server recorded it.
pub fn peer_ip<B>(req: &Request<B>) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// First value of a header, if present and valid UTF-8.
pub fn first_header<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Every UTF-8 value of a header, in order.
pub fn header_values<'a, B>(req: &'a Request<B>, name: &str) -> Vec<&'a str> {
    req.headers()
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_real_ip_prefers_forwarded_for() {
        let req = Request::builder()
            .header("X-Forwarded-For", " 10.0.0.1, 172.16.0.1")
            .header("X-Real-Ip", "10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(real_ip(&req), "10.0.0.1");
    }

    #[test]
    fn test_real_ip_falls_back_to_peer() {
        let mut req = Request::builder()
            .header("X-Real-Ip", "")
            .body(Body::empty())
            .unwrap();
        assert_eq!(real_ip(&req), "");

        let addr: SocketAddr = "192.168.1.7:5555".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(real_ip(&req), "192.168.1.7");
    }

    #[test]
    fn test_header_values() {
        let req = Request::builder()
            .header("X-Tag", "a")
            .header("X-Tag", "b")
            .body(Body::empty())
            .unwrap();
        assert_eq!(first_header(&req, "x-tag"), Some("a"));
        assert_eq!(header_values(&req, "x-tag"), vec!["a", "b"]);
        assert!(header_values(&req, "x-missing").is_empty());
    }
}
