//! Lazy response body relay.

use std::io;
use std::time::Duration;

use axum::body::{Body, BodyDataStream};
use axum::BoxError;
use futures_util::{stream, StreamExt};
use hyper::body::Incoming;

use crate::upstream::pool::UpstreamHandle;

/// Upstream body plus the connection it arrives on. `handle` is `None`
/// once the body has ended or failed.
struct BodyState {
    data: BodyDataStream,
    handle: Option<UpstreamHandle>,
    idle: Duration,
}

impl BodyState {
    fn fail(&mut self) -> Option<UpstreamHandle> {
        let mut handle = self.handle.take()?;
        handle.mark_broken();
        Some(handle)
    }
}

/// Wrap an upstream body so chunks are pulled only as the client reads them.
///
/// The handle rides along with the stream: it is released when the body
/// ends, and marked broken if the upstream errors or stalls past `idle`.
/// If the client goes away first, the rest of the body is drained in the
/// background so the connection can still be pooled.
pub fn stream_body(incoming: Incoming, handle: UpstreamHandle, idle: Duration) -> Body {
    let state = BodyState {
        data: Body::new(incoming).into_data_stream(),
        handle: Some(handle),
        idle,
    };

    let chunks = stream::unfold(state, |mut state| async move {
        if state.handle.is_none() {
            return None;
        }
        match tokio::time::timeout(state.idle, state.data.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), state)),
            Ok(None) => {
                drop(state.handle.take());
                None
            }
            Ok(Some(Err(e))) => {
                if let Some(handle) = state.fail() {
                    tracing::warn!(upstream = %handle.target(), error = %e, "Upstream body failed mid-stream");
                }
                Some((Err(BoxError::from(e)), state))
            }
            Err(_) => {
                if let Some(handle) = state.fail() {
                    tracing::warn!(
                        upstream = %handle.target(),
                        idle = ?state.idle,
                        "Upstream body stalled, terminating response"
                    );
                }
                let stalled = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("upstream_timeout: no body bytes for {:?}", state.idle),
                );
                Some((Err(BoxError::from(stalled)), state))
            }
        }
    });

    Body::from_stream(chunks)
}

impl Drop for BodyState {
    fn drop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            handle.mark_broken();
            return;
        };

        let mut data = std::mem::replace(&mut self.data, Body::empty().into_data_stream());
        let wait = self.idle;
        runtime.spawn(async move {
            let drained = tokio::time::timeout(wait, async {
                while let Some(chunk) = data.next().await {
                    chunk?;
                }
                Ok::<(), axum::Error>(())
            })
            .await;

            match drained {
                Ok(Ok(())) => {
                    tracing::trace!(upstream = %handle.target(), "Drained abandoned response body");
                }
                Ok(Err(e)) => {
                    tracing::debug!(upstream = %handle.target(), error = %e, "Abandoned body failed while draining");
                    handle.mark_broken();
                }
                Err(_) => {
                    tracing::debug!(upstream = %handle.target(), "Abandoned body did not finish in time");
                    handle.mark_broken();
                }
            }
        });
    }
}
