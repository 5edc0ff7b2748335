//! Live MJPEG stream
//!
//! Each connection gets its own subscriber on the frame publisher. A waiting
//! subscriber blocks, so every wait runs on the blocking pool. When no new
//! frame arrives within the wait the last one is sent again to keep the
//! connection alive.

use async_stream::stream;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use metrics::{counter, gauge};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::AppState;

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// How long one wait for a fresh frame may take
const FRAME_WAIT: Duration = Duration::from_secs(1);

/// Wrap one JPEG as a multipart part
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 64);
    payload.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    payload.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

/// GET /video_feed
pub async fn video_feed(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut subscriber = state.publisher.subscribe();
    let stop = state.stop.clone();

    counter!("stream_connections_total").increment(1);
    gauge!("stream_clients").increment(1.0);
    let guard = ClientGuard;

    let body = stream! {
        let _guard = guard;
        while !stop.is_stopped() {
            let waited = tokio::task::spawn_blocking(move || {
                let delivery = subscriber.next(FRAME_WAIT);
                (subscriber, delivery)
            })
            .await;

            let delivery = match waited {
                Ok((returned, delivery)) => {
                    subscriber = returned;
                    delivery
                }
                Err(e) => {
                    debug!("Stream wait aborted: {}", e);
                    break;
                }
            };
            yield Ok::<Bytes, Infallible>(multipart_part(delivery.bytes()));
        }
    };

    Response::builder()
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

/// Decrements the client gauge when the stream is dropped
struct ClientGuard;

impl Drop for ClientGuard {
    fn drop(&mut self) {
        gauge!("stream_clients").decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_router;
    use crate::test_support::*;
    use axum::http::StatusCode;
    use futures::StreamExt;
    use tower::ServiceExt;

    #[test]
    fn test_multipart_part_layout() {
        let part = multipart_part(b"\xff\xd8jpeg");
        assert_eq!(&part[..], b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xff\xd8jpeg\r\n");
    }

    #[tokio::test]
    async fn test_stream_serves_placeholder_then_frames() {
        let root = scratch_dir("stream");
        let state = state(&root);
        let publisher = state.publisher.clone();
        let stop = state.stop.clone();
        let app = create_router(state).unwrap();

        let response = app
            .oneshot(request("GET", "/video_feed", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );

        let mut body = response.into_body().into_data_stream();

        // Nothing published yet: the placeholder after the wait times out
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(first, multipart_part(b"placeholder"));

        publisher.publish(b"live".to_vec());
        let second = body.next().await.unwrap().unwrap();
        assert_eq!(second, multipart_part(b"live"));

        stop.stop();
        // The stream ends after the in-flight wait
        while let Some(chunk) = body.next().await {
            chunk.unwrap();
        }
    }
}
