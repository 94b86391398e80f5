//! Outbound connections to upstream targets.
//!
//! # Responsibilities
//! - Assign new sessions to a target
//! - Hand out pooled or freshly dialed connections (`connect`)
//! - Send a request and return a lazily streamed response (`forward`)
//! - Probe targets for the health supervisor

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time;

use crate::config::{RelayConfig, SelectionStrategy};
use crate::error::RelayError;
use crate::observability::metrics;
use crate::resilience::retries::{self, RetryPolicy};
use crate::upstream::body::stream_body;
use crate::upstream::least_conn::LeastConnections;
use crate::upstream::pool::{Sender, TargetHealth, TargetPool, UpstreamHandle};
use crate::upstream::round_robin::RoundRobin;
use crate::upstream::target::{TargetError, UpstreamTarget};
use crate::upstream::TargetSelector;

/// Point-in-time view of one target's pool.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStats {
    pub target: String,
    pub health: TargetHealth,
    pub in_flight: usize,
    pub idle: usize,
    pub max_connections: usize,
}

pub struct UpstreamConnector {
    pools: Vec<Arc<TargetPool>>,
    selector: Box<dyn TargetSelector>,
    retry: RetryPolicy,
    connect_timeout: Duration,
    keep_alive: Duration,
    acquire_timeout: Duration,
    retry_after: Duration,
}

impl std::fmt::Debug for UpstreamConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConnector")
            .field("pools", &self.pools)
            .field("selector", &self.selector)
            .field("retry", &self.retry)
            .finish()
    }
}

impl UpstreamConnector {
    pub fn from_config(config: &RelayConfig) -> Result<Self, TargetError> {
        let upstream = &config.upstream;
        let keep_alive = config.timeouts.keep_alive();

        let pools = upstream
            .targets
            .iter()
            .map(|address| {
                UpstreamTarget::parse(address).map(|target| {
                    Arc::new(TargetPool::new(
                        target,
                        upstream.max_connections_per_target,
                        upstream.max_idle_per_target,
                        keep_alive,
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if pools.is_empty() {
            return Err(TargetError::NoTargets);
        }

        let selector: Box<dyn TargetSelector> = match upstream.strategy {
            SelectionStrategy::RoundRobin => Box::new(RoundRobin::new()),
            SelectionStrategy::LeastConnections => Box::new(LeastConnections::new()),
        };

        Ok(Self {
            pools,
            selector,
            retry: RetryPolicy::from(&config.retries),
            connect_timeout: config.timeouts.connect(),
            keep_alive,
            acquire_timeout: upstream.acquire_timeout(),
            retry_after: Duration::from_secs(upstream.retry_after_secs),
        })
    }

    pub fn pools(&self) -> &[Arc<TargetPool>] {
        &self.pools
    }

    /// The pool for a configured target, by authority.
    pub fn pool(&self, authority: &str) -> Option<&Arc<TargetPool>> {
        self.pools
            .iter()
            .find(|pool| pool.target().authority() == authority)
    }

    /// Pick a target for a new session. When every target is marked
    /// unreachable the first one is used, so the client still gets a
    /// gateway error from a real attempt.
    pub fn assign(&self) -> Arc<TargetPool> {
        self.selector
            .select(&self.pools)
            .unwrap_or_else(|| self.pools[0].clone())
    }

    pub fn stats(&self) -> Vec<TargetStats> {
        self.pools
            .iter()
            .map(|pool| TargetStats {
                target: pool.target().to_string(),
                health: pool.health(),
                in_flight: pool.in_flight(),
                idle: pool.idle_count(),
                max_connections: pool.max_connections(),
            })
            .collect()
    }

    /// Obtain an exclusive connection to the pool's target.
    ///
    /// Waits up to the acquire timeout for a slot, then reuses an idle
    /// connection or dials with retries.
    pub async fn connect(&self, pool: &Arc<TargetPool>) -> Result<UpstreamHandle, RelayError> {
        let Some(permit) = pool.acquire(self.acquire_timeout).await else {
            tracing::warn!(
                upstream = %pool.target(),
                in_flight = pool.in_flight(),
                "Connection pool saturated"
            );
            return Err(RelayError::PoolSaturated {
                target: pool.target().to_string(),
                retry_after: self.retry_after,
            });
        };

        if let Some(sender) = pool.checkout_idle() {
            tracing::trace!(upstream = %pool.target(), "Reusing pooled connection");
            return Ok(UpstreamHandle::new(pool.clone(), sender, true, permit));
        }

        let sender = self.dial_with_retry(pool).await?;
        Ok(UpstreamHandle::new(pool.clone(), sender, false, permit))
    }

    /// Send `request` and return the response once its head arrives. The
    /// body is streamed lazily and owns the handle until it finishes.
    pub async fn forward(
        &self,
        mut handle: UpstreamHandle,
        request: Request<Body>,
    ) -> Result<Response<Body>, RelayError> {
        let response = self.exchange(&mut handle, request).await?;
        let (parts, incoming) = response.into_parts();
        Ok(Response::from_parts(
            parts,
            stream_body(incoming, handle, self.keep_alive),
        ))
    }

    /// Check that `pool`'s target accepts connections and, with a `path`,
    /// answers `GET path` with a non-5xx status. Probe connections are
    /// never pooled and hold no slot.
    pub async fn probe(
        &self,
        pool: &TargetPool,
        path: Option<&str>,
        timeout: Duration,
    ) -> Result<(), RelayError> {
        let target = pool.target();
        let outcome = time::timeout(timeout, async {
            let mut sender = self.dial(target).await.map_err(|e| e.to_string())?;
            let Some(path) = path else {
                return Ok(());
            };
            let request = Request::builder()
                .method(Method::GET)
                .uri(path)
                .header(header::HOST, target.host_header().clone())
                .header(header::USER_AGENT, "session-relay-health-check")
                .body(Body::empty())
                .map_err(|e| e.to_string())?;
            sender.ready().await.map_err(|e| e.to_string())?;
            let response = sender
                .send_request(request)
                .await
                .map_err(|e| e.to_string())?;
            if response.status().is_server_error() {
                return Err(format!("probe returned {}", response.status()));
            }
            Ok(())
        })
        .await;

        match outcome {
            Ok(Ok(())) => {
                pool.mark_success();
                Ok(())
            }
            Ok(Err(reason)) => {
                tracing::warn!(upstream = %target, reason = %reason, "Health probe failed");
                pool.mark_failure();
                Err(RelayError::UpstreamUnreachable {
                    target: target.to_string(),
                    attempts: 1,
                    reason,
                })
            }
            Err(_) => {
                tracing::warn!(upstream = %target, timeout = ?timeout, "Health probe timed out");
                pool.mark_failure();
                Err(RelayError::UpstreamTimeout {
                    target: target.to_string(),
                    waited: timeout,
                })
            }
        }
    }

    /// Send on the handle's connection. A reused connection that turns out
    /// to be stale before the request left is replaced once by a fresh dial.
    async fn exchange(
        &self,
        handle: &mut UpstreamHandle,
        mut request: Request<Body>,
    ) -> Result<Response<Incoming>, RelayError> {
        let target = handle.target().to_string();
        loop {
            let reused = handle.is_reused();
            let Some(sender) = handle.sender_mut() else {
                return Err(RelayError::UpstreamUnreachable {
                    target,
                    attempts: 0,
                    reason: "connection already released".to_string(),
                });
            };

            let ready = time::timeout(self.keep_alive, sender.ready()).await;
            match ready {
                Ok(Ok(())) => {}
                Ok(Err(e)) if reused => {
                    tracing::debug!(upstream = %target, error = %e, "Pooled connection closed, redialing");
                    self.redial(handle).await?;
                    continue;
                }
                Ok(Err(e)) => {
                    handle.mark_broken();
                    return Err(RelayError::UpstreamUnreachable {
                        target,
                        attempts: 1,
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    handle.mark_broken();
                    return Err(RelayError::UpstreamTimeout {
                        target,
                        waited: self.keep_alive,
                    });
                }
            }

            let sent = time::timeout(self.keep_alive, sender.try_send_request(request)).await;
            match sent {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(mut e)) => match e.take_message() {
                    Some(unsent) if reused => {
                        tracing::debug!(
                            upstream = %target,
                            error = %e.error(),
                            "Stale pooled connection, retrying on a fresh one"
                        );
                        self.redial(handle).await?;
                        request = unsent;
                    }
                    _ => {
                        handle.mark_broken();
                        handle.pool().mark_failure();
                        return Err(RelayError::UpstreamUnreachable {
                            target,
                            attempts: 1,
                            reason: e.error().to_string(),
                        });
                    }
                },
                Err(_) => {
                    handle.mark_broken();
                    tracing::warn!(upstream = %target, waited = ?self.keep_alive, "Upstream response timed out");
                    return Err(RelayError::UpstreamTimeout {
                        target,
                        waited: self.keep_alive,
                    });
                }
            }
        }
    }

    async fn redial(&self, handle: &mut UpstreamHandle) -> Result<(), RelayError> {
        let pool = handle.pool().clone();
        let sender = self.dial_with_retry(&pool).await?;
        handle.replace_sender(sender);
        Ok(())
    }

    async fn dial_with_retry(&self, pool: &TargetPool) -> Result<Sender, RelayError> {
        let target = pool.target();
        let result = self
            .retry
            .run(
                |attempt| async move {
                    tracing::debug!(upstream = %target, attempt, "Dialing upstream");
                    self.dial(target).await
                },
                retries::is_retryable,
            )
            .await;

        match result {
            Ok(sender) => {
                metrics::record_dial(target.authority(), "ok");
                pool.mark_success();
                Ok(sender)
            }
            Err(exhausted) => {
                metrics::record_dial(target.authority(), "failed");
                pool.mark_failure();
                tracing::warn!(
                    upstream = %target,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Upstream unreachable"
                );
                Err(RelayError::UpstreamUnreachable {
                    target: target.to_string(),
                    attempts: exhausted.attempts,
                    reason: exhausted.last_error.to_string(),
                })
            }
        }
    }

    /// One TCP connect plus HTTP/1.1 handshake. The connection driver runs
    /// as its own task until the sender side is dropped.
    async fn dial(&self, target: &UpstreamTarget) -> io::Result<Sender> {
        let stream = time::timeout(self.connect_timeout, TcpStream::connect(target.authority()))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.connect_timeout),
                )
            })??;
        stream.set_nodelay(true)?;

        let (sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(io::Error::other)?;

        let authority = target.authority().to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(upstream = %authority, error = %e, "Upstream connection ended with error");
            }
        });
        Ok(sender)
    }
}
