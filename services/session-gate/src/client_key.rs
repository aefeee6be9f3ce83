//! Client identification for login rate limiting

use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderName};

/// How a request's client key is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientKeyPolicy {
    /// Transport peer IP address
    Peer,
    /// First comma-separated entry of a header set by a trusted proxy,
    /// falling back to the peer address when the header is absent or empty
    Header(HeaderName),
}

impl ClientKeyPolicy {
    pub fn resolve(&self, headers: &HeaderMap, peer: SocketAddr) -> String {
        match self {
            ClientKeyPolicy::Peer => peer.ip().to_string(),
            ClientKeyPolicy::Header(name) => headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
                .unwrap_or_else(|| peer.ip().to_string()),
        }
    }
}
