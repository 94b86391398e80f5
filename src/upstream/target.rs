//! Upstream address parsing.

use std::fmt;

use axum::http::HeaderValue;
use url::Url;

/// Why a configured upstream address was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("invalid upstream address '{0}'")]
    Invalid(String),

    #[error("unsupported scheme '{scheme}' in '{address}' (only http is relayed)")]
    UnsupportedScheme { address: String, scheme: String },

    #[error("upstream address '{0}' must not carry a path, query or credentials")]
    HasPath(String),

    #[error("no upstream targets configured")]
    NoTargets,
}

/// A validated upstream, identified by its `host:port` authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamTarget {
    authority: String,
    host_header: HeaderValue,
}

impl UpstreamTarget {
    /// Accepts `http://host[:port]` or a bare `host[:port]`.
    pub fn parse(address: &str) -> Result<Self, TargetError> {
        let address = address.trim();
        let url = if address.contains("://") {
            Url::parse(address)
        } else {
            Url::parse(&format!("http://{address}"))
        }
        .map_err(|_| TargetError::Invalid(address.to_string()))?;

        if url.scheme() != "http" {
            return Err(TargetError::UnsupportedScheme {
                address: address.to_string(),
                scheme: url.scheme().to_string(),
            });
        }
        if (url.path() != "/" && !url.path().is_empty())
            || url.query().is_some()
            || !url.username().is_empty()
        {
            return Err(TargetError::HasPath(address.to_string()));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TargetError::Invalid(address.to_string()))?;
        let port = url.port_or_known_default().unwrap_or(80);
        let authority = format!("{host}:{port}");
        let host_header = HeaderValue::from_str(&authority)
            .map_err(|_| TargetError::Invalid(address.to_string()))?;

        Ok(Self {
            authority,
            host_header,
        })
    }

    /// `host:port`, used for dialing and as the session's target.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Value for the `Host` header of relayed requests.
    pub fn host_header(&self) -> &HeaderValue {
        &self.host_header
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url_and_bare_forms() {
        assert_eq!(UpstreamTarget::parse("http://10.0.0.5:9000").unwrap().authority(), "10.0.0.5:9000");
        assert_eq!(UpstreamTarget::parse("10.0.0.5:9000").unwrap().authority(), "10.0.0.5:9000");
        assert_eq!(UpstreamTarget::parse("http://api.internal/").unwrap().authority(), "api.internal:80");
    }

    #[test]
    fn bare_and_url_forms_are_equal() {
        assert_eq!(
            UpstreamTarget::parse("backend:8080").unwrap(),
            UpstreamTarget::parse("http://backend:8080").unwrap()
        );
    }

    #[test]
    fn rejects_https_paths_and_garbage() {
        assert!(matches!(
            UpstreamTarget::parse("https://secure:443"),
            Err(TargetError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            UpstreamTarget::parse("http://backend:8080/api"),
            Err(TargetError::HasPath(_))
        ));
        assert!(UpstreamTarget::parse("http://").is_err());
    }
}
