//! Client identity → session key.
//!
//! Resolution order: explicit session header, then a digest of the
//! `Authorization` credentials, then the peer IP address. Credentials are
//! never stored in clear.

use std::fmt;
use std::net::SocketAddr;

use axum::http::header::{self, HeaderMap, HeaderName, InvalidHeaderName};
use sha2::{Digest, Sha256};

use crate::config::IdentityConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    SessionHeader,
    Authorization,
    PeerAddress,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdentitySource::SessionHeader => "session_header",
            IdentitySource::Authorization => "authorization",
            IdentitySource::PeerAddress => "peer_address",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub key: String,
    pub source: IdentitySource,
}

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    session_header: HeaderName,
    use_authorization: bool,
}

impl IdentityResolver {
    pub fn from_config(config: &IdentityConfig) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            session_header: HeaderName::from_bytes(config.session_header.trim().as_bytes())?,
            use_authorization: config.use_authorization,
        })
    }

    pub fn resolve(&self, headers: &HeaderMap, peer: SocketAddr) -> ClientIdentity {
        if let Some(session) = header_text(headers, &self.session_header) {
            return ClientIdentity {
                key: session.to_string(),
                source: IdentitySource::SessionHeader,
            };
        }

        if self.use_authorization {
            if let Some(credentials) = headers.get(header::AUTHORIZATION) {
                let digest = Sha256::digest(credentials.as_bytes());
                return ClientIdentity {
                    key: format!("auth:{}", hex::encode(digest)),
                    source: IdentitySource::Authorization,
                };
            }
        }

        ClientIdentity {
            key: format!("ip:{}", peer.ip()),
            source: IdentitySource::PeerAddress,
        }
    }
}

fn header_text<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver() -> IdentityResolver {
        IdentityResolver::from_config(&IdentityConfig::default()).unwrap()
    }

    fn peer() -> SocketAddr {
        "192.0.2.10:55000".parse().unwrap()
    }

    #[test]
    fn session_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-session-id", HeaderValue::from_static(" abc "));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));

        let identity = resolver().resolve(&headers, peer());
        assert_eq!(identity.key, "abc");
        assert_eq!(identity.source, IdentitySource::SessionHeader);
    }

    #[test]
    fn authorization_is_hashed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret-token"));

        let identity = resolver().resolve(&headers, peer());
        assert_eq!(identity.source, IdentitySource::Authorization);
        assert_eq!(
            identity.key,
            "auth:86e774bff90b0fe5f8ec00ffd9e579c653705ca16285d09d992ae2bfb58bc308"
        );
        assert!(!identity.key.contains("secret-token"));

        // Stable across requests.
        assert_eq!(resolver().resolve(&headers, peer()), identity);
    }

    #[test]
    fn falls_back_to_peer_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-session-id", HeaderValue::from_static("   "));
        let identity = resolver().resolve(&headers, peer());
        assert_eq!(identity.key, "ip:192.0.2.10");
        assert_eq!(identity.source, IdentitySource::PeerAddress);
    }

    #[test]
    fn authorization_can_be_ignored() {
        let config = IdentityConfig {
            use_authorization: false,
            ..IdentityConfig::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        let identity = IdentityResolver::from_config(&config).unwrap().resolve(&headers, peer());
        assert_eq!(identity.source, IdentitySource::PeerAddress);
    }
}
