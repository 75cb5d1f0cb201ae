//! Streaming egress - long-lived SSE subscriber streams
//!
//! After the subscribe gate passes, the handler drains the registered queue
//! into `data: <json>` frames, interleaved with `: keepalive` comment frames.
//! Client disconnect drops the stream, which drops the receiver, which
//! deregisters the queue - no error emitted anywhere.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio::sync::broadcast::error::RecvError;

use swarmgate_broker::authorize_subscribe;

use crate::error::ApiError;
use crate::handlers::bearer_header;
use crate::state::AppState;

/// GET /subscribe/{topic} - authorized long-lived event stream.
pub async fn subscribe_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let grant = authorize_subscribe(&state.ctx, bearer_header(&headers), &topic).await?;
    let ae_id = grant.ae_id.clone();
    let mut receiver = grant.receiver;

    let stream = async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    yield Ok(Event::default().data(message.to_string()));
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Bounded fan-out: the oldest messages were dropped for
                    // this slow consumer; the stream itself continues.
                    tracing::warn!(ae_id = %ae_id, topic = %topic, skipped, "subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::info!(ae_id = %ae_id, topic = %topic, "subscriber stream ended");
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.keepalive)
            .text("keepalive"),
    ))
}
