//! Request relay.
//!
//! # Responsibilities
//! - Map each client request to a session and its upstream target
//! - Rewrite the request for the upstream (origin-form URI, headers)
//! - Forward within the request deadline and stream the response back
//! - Report outcomes to the health supervisor and metrics

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, Uri, Version};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::health::HealthSupervisor;
use crate::http::request::X_REQUEST_ID;
use crate::observability::metrics;
use crate::relay::identity::IdentityResolver;
use crate::resilience::Deadline;
use crate::security::headers::{apply_forwarded, strip_hop_by_hop};
use crate::store::{SessionRecord, SessionStatus, StateStore};
use crate::upstream::{TargetPool, UpstreamConnector};

pub struct RelayEngine {
    store: Arc<StateStore>,
    connector: Arc<UpstreamConnector>,
    health: Arc<HealthSupervisor>,
    identity: IdentityResolver,
    request_timeout: Duration,
    activity_flush: Duration,
    preserve_host: bool,
}

impl RelayEngine {
    pub fn new(
        config: &RelayConfig,
        identity: IdentityResolver,
        store: Arc<StateStore>,
        connector: Arc<UpstreamConnector>,
        health: Arc<HealthSupervisor>,
    ) -> Self {
        Self {
            store,
            connector,
            health,
            identity,
            request_timeout: config.timeouts.request(),
            activity_flush: config.store.activity_flush(),
            preserve_host: config.upstream.preserve_host,
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn connector(&self) -> &Arc<UpstreamConnector> {
        &self.connector
    }

    pub fn health(&self) -> &Arc<HealthSupervisor> {
        &self.health
    }

    /// Relay one client request to its session's upstream.
    pub async fn handle(
        &self,
        peer: SocketAddr,
        request: Request<Body>,
    ) -> Result<Response<Body>, RelayError> {
        let start = Instant::now();
        let method = request.method().to_string();
        let identity = self.identity.resolve(request.headers(), peer);

        let record = self.record_activity(&identity.key).await;
        let pool = self
            .connector
            .pool(&record.target)
            .cloned()
            .unwrap_or_else(|| self.connector.assign());

        tracing::debug!(
            session = %identity.key,
            identity = %identity.source,
            upstream = %pool.target(),
            method = %method,
            path = %request.uri().path(),
            "Relaying request"
        );

        let upstream_request = self.prepare(request, peer, &pool);
        let result = self.exchange(&pool, upstream_request).await;

        match result {
            Ok(mut response) => {
                strip_hop_by_hop(response.headers_mut());
                self.health.relay_succeeded();
                metrics::record_request(
                    &method,
                    response.status().as_u16(),
                    pool.target().authority(),
                    start,
                );
                Ok(response)
            }
            Err(error) => {
                tracing::warn!(
                    session = %identity.key,
                    upstream = %pool.target(),
                    kind = error.kind(),
                    error = %error,
                    "Relay failed"
                );
                self.health.relay_failed(&error);
                metrics::record_request(
                    &method,
                    error.status_code().as_u16(),
                    pool.target().authority(),
                    start,
                );
                Err(error)
            }
        }
    }

    /// Connect and forward under one deadline covering pool wait, dial and
    /// the response head.
    async fn exchange(
        &self,
        pool: &Arc<TargetPool>,
        request: Request<Body>,
    ) -> Result<Response<Body>, RelayError> {
        let deadline = Deadline::after(self.request_timeout);
        let outcome = deadline
            .run(async {
                let handle = self.connector.connect(pool).await?;
                self.connector.forward(handle, request).await
            })
            .await;

        outcome.unwrap_or_else(|exceeded| {
            Err(RelayError::UpstreamTimeout {
                target: pool.target().to_string(),
                waited: exceeded.waited,
            })
        })
    }

    /// Look up or create the session and record this exchange.
    ///
    /// Touches to an existing session stay in memory while the snapshot
    /// was written within the last `activity_flush`; the next touch after
    /// that, or the sweeper, writes them out. Persistence failures never
    /// fail the request; the session continues in memory.
    async fn record_activity(&self, key: &str) -> SessionRecord {
        let now = Utc::now();
        if !self.store.is_persistent() {
            return self
                .store
                .update_in_memory(key, |prev| self.next_record(prev, now))
                .await;
        }

        let debounced = self.store.persisted_within(self.activity_flush)
            && self.store.get(key).is_some_and(|record| {
                record.status == SessionStatus::Active
                    && self.connector.pool(&record.target).is_some()
            });
        if debounced {
            return self
                .store
                .update_in_memory(key, |prev| self.next_record(prev, now))
                .await;
        }

        match self.store.update(key, |prev| self.next_record(prev, now)).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(session = %key, error = %e, "Session not persisted, continuing in memory");
                self.store
                    .update_in_memory(key, |prev| self.next_record(prev, now))
                    .await
            }
        }
    }

    /// Existing sessions keep their target while it is still configured;
    /// closed or orphaned sessions start over on a newly assigned target.
    fn next_record(&self, prev: Option<&SessionRecord>, now: DateTime<Utc>) -> SessionRecord {
        let mut record = match prev {
            Some(existing)
                if existing.status != SessionStatus::Closed
                    && self.connector.pool(&existing.target).is_some() =>
            {
                existing.clone()
            }
            _ => SessionRecord::new(self.connector.assign().target().authority(), now),
        };
        record.touch(now);
        record
    }

    fn prepare(&self, request: Request<Body>, peer: SocketAddr, pool: &TargetPool) -> Request<Body> {
        let (mut parts, body) = request.into_parts();
        let original_host = parts.headers.get(header::HOST).cloned();

        strip_hop_by_hop(&mut parts.headers);
        apply_forwarded(&mut parts.headers, peer.ip(), original_host.clone());

        match original_host {
            Some(host) if self.preserve_host => {
                parts.headers.insert(header::HOST, host);
            }
            _ => {
                parts
                    .headers
                    .insert(header::HOST, pool.target().host_header().clone());
            }
        }

        if !parts.headers.contains_key(&X_REQUEST_ID) {
            if let Ok(id) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
                parts.headers.insert(X_REQUEST_ID, id);
            }
        }

        parts.uri = origin_form(&parts.uri);
        parts.version = Version::HTTP_11;
        Request::from_parts(parts, body)
    }
}

/// Path and query only, as HTTP/1.1 expects on an origin connection.
fn origin_form(uri: &Uri) -> Uri {
    uri.path_and_query()
        .map(|pq| Uri::from(pq.clone()))
        .unwrap_or_else(|| Uri::from_static("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthCheckConfig;

    fn engine(store: StateStore, activity_flush_secs: u64) -> RelayEngine {
        let mut config = RelayConfig::default();
        config.upstream.targets = vec!["127.0.0.1:9".into()];
        config.store.activity_flush_secs = activity_flush_secs;
        RelayEngine::new(
            &config,
            IdentityResolver::from_config(&config.identity).unwrap(),
            Arc::new(store),
            Arc::new(UpstreamConnector::from_config(&config).unwrap()),
            Arc::new(HealthSupervisor::new(&HealthCheckConfig::default())),
        )
    }

    fn on_disk(dir: &std::path::Path, key: &str) -> Option<u64> {
        let raw = std::fs::read_to_string(dir.join("sessions.json")).ok()?;
        let sessions: serde_json::Value = serde_json::from_str(&raw).ok()?;
        sessions[key]["requests"].as_u64()
    }

    #[tokio::test]
    async fn busy_session_is_still_written_by_the_relay_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path(), "sessions").await.unwrap();
        let engine = engine(store, 1);

        let first = engine.record_activity("busy").await;
        assert_eq!(first.target, "127.0.0.1:9");
        assert_eq!(on_disk(dir.path(), "busy"), Some(1));

        engine.record_activity("busy").await;
        assert_eq!(on_disk(dir.path(), "busy"), Some(1), "second touch is debounced");

        // Touches keep arriving faster than the flush window.
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(300)).await;
            engine.record_activity("busy").await;
        }
        assert!(on_disk(dir.path(), "busy").unwrap() > 2);
        assert_eq!(engine.store().get("busy").unwrap().requests, 7);
    }

    #[tokio::test]
    async fn detached_store_records_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::detached(dir.path(), "sessions", "snapshot corrupt");
        let engine = engine(store, 5);

        engine.record_activity("k").await;
        engine.record_activity("k").await;
        assert_eq!(engine.store().get("k").unwrap().requests, 2);
        assert!(!dir.path().join("sessions.json").exists());
    }

    #[test]
    fn origin_form_drops_scheme_and_authority() {
        let uri: Uri = "http://client.example:8000/api/items?page=2".parse().unwrap();
        assert_eq!(origin_form(&uri), "/api/items?page=2");

        let bare: Uri = "http://client.example".parse().unwrap();
        assert_eq!(origin_form(&bare).path(), "/");
    }
}
