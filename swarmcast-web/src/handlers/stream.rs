//! Range delivery for files inside active swarms
//!
//! Bytes are pulled from the engine reader chunk by chunk as the body is
//! polled, so a slow swarm slows the response instead of buffering it.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{self, Stream};
use swarmcast_core::engine::FileReader;
use swarmcast_core::media;

use super::range::{
    RangeRequest, apply_streaming_headers, build_range_response, build_unsatisfiable_response,
    extract_range_header, parse_range_header,
};
use crate::error::ApiError;
use crate::server::AppState;

/// `GET|HEAD /stream/{id}/{file_index}`
pub async fn stream_file(
    State(state): State<AppState>,
    Path((id, file_index)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    match serve_range(&state, &id, &file_index, &method, &headers).await {
        Ok(response) => response,
        Err(error) => {
            let mut response = error.into_response();
            apply_streaming_headers(response.headers_mut());
            response
        }
    }
}

async fn serve_range(
    state: &AppState,
    id: &str,
    file_index: &str,
    method: &Method,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let session = state.controller.session(id)?;
    let file_index: usize = file_index
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid file index: {file_index}")))?;
    let file = session.file(file_index)?;
    let file_length = file.length;
    let content_type = media::content_type_for(&file.name);

    let range = match parse_range_header(extract_range_header(headers), file_length) {
        RangeRequest::Unsatisfiable => {
            tracing::debug!(
                "Unsatisfiable range {:?} for {}/{} ({} bytes)",
                extract_range_header(headers),
                id,
                file_index,
                file_length
            );
            return build_unsatisfiable_response(file_length).map_err(internal);
        }
        RangeRequest::Full => None,
        RangeRequest::Partial(range) => Some(range),
    };
    let (start, length) = range.map_or((0, file_length), |range| (range.start, range.length()));

    // Any explicit range is a playhead hint, including a return to byte 0
    // after a player reads the tail of the file
    let streaming = &state.controller.config().streaming;
    if streaming.infer_position_from_range && range.is_some() {
        if let Err(e) = session.update_playback_position(file_index, start) {
            tracing::debug!("Could not infer playback position: {}", e);
        }
    }

    if *method == Method::HEAD {
        return build_range_response(range, file_length, content_type, Body::empty())
            .map_err(internal);
    }

    let reader = session.open_reader(file_index).await?;
    tracing::debug!(
        "Streaming {}/{} bytes {}..{} of {} as {}",
        id,
        file_index,
        start,
        start + length,
        file_length,
        content_type
    );

    let body = Body::from_stream(reader_stream(
        reader,
        start,
        length,
        streaming.read_chunk_size,
        format!("{id}/{file_index}"),
    ));
    build_range_response(range, file_length, content_type, body).map_err(internal)
}

fn internal(status: axum::http::StatusCode) -> ApiError {
    ApiError::Internal(format!("Failed to build response: {status}"))
}

struct ReaderState {
    reader: Box<dyn FileReader>,
    seek_to: Option<u64>,
    remaining: u64,
    chunk_size: usize,
    label: String,
}

/// Streams exactly `length` bytes starting at `start`.
///
/// The stream owns the reader, so it is dropped when the body completes, fails
/// or is abandoned by the client. Errors end the stream early.
fn reader_stream(
    reader: Box<dyn FileReader>,
    start: u64,
    length: u64,
    chunk_size: usize,
    label: String,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let state = ReaderState {
        reader,
        seek_to: (start > 0).then_some(start),
        remaining: length,
        chunk_size: chunk_size.max(1),
        label,
    };

    stream::unfold(state, |mut state| async move {
        if state.remaining == 0 {
            return None;
        }

        if let Some(position) = state.seek_to.take() {
            if let Err(e) = state.reader.seek(position).await {
                tracing::warn!("Seek to {} failed for {}: {}", position, state.label, e);
                return None;
            }
        }

        let wanted = state.remaining.min(state.chunk_size as u64) as usize;
        match state.reader.read_chunk(wanted).await {
            Ok(chunk) if chunk.is_empty() => {
                tracing::warn!(
                    "Reader for {} ended with {} bytes outstanding",
                    state.label,
                    state.remaining
                );
                None
            }
            Ok(mut chunk) => {
                chunk.truncate(wanted);
                state.remaining -= chunk.len() as u64;
                Some((Ok(chunk), state))
            }
            Err(e) => {
                tracing::warn!(
                    "Read failed for {} with {} bytes outstanding: {}",
                    state.label,
                    state.remaining,
                    e
                );
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::to_bytes;
    use axum::http::header::{ACCEPT_RANGES, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use swarmcast_core::engine::mock::MockSwarmEngine;
    use swarmcast_core::engine::{EngineError, InfoHash, MagnetLink, PiecePriority};
    use swarmcast_core::{SessionController, SwarmcastConfig};
    use tower::ServiceExt;

    use super::*;
    use crate::server::stream_router;

    fn movie_bytes() -> Bytes {
        Bytes::from((0..1000u32).map(|i| (i % 256) as u8).collect::<Vec<_>>())
    }

    async fn setup() -> (Router, Arc<MockSwarmEngine>, String) {
        let info_hash = InfoHash::new([0xab; 20]);
        let engine = Arc::new(MockSwarmEngine::new().with_swarm(
            info_hash,
            100,
            vec![
                ("extras/notes.txt", Bytes::from_static(b"hello")),
                ("movie.mkv", movie_bytes()),
            ],
        ));
        let controller = Arc::new(SessionController::new(
            engine.clone(),
            SwarmcastConfig::for_testing(),
        ));
        let added = controller
            .add_swarm(&MagnetLink::build(info_hash, "movie", &[]), None)
            .await
            .unwrap();
        let router = stream_router(AppState::new(controller));
        (router, engine, added.id)
    }

    async fn send(router: &Router, uri: &str, range: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }
        router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_partial_range() {
        let (router, _, id) = setup().await;

        let response = send(&router, &format!("/stream/{id}/1"), Some("bytes=100-199")).await;

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        let headers = response.headers().clone();
        assert_eq!(headers[CONTENT_RANGE], "bytes 100-199/1000");
        assert_eq!(headers[CONTENT_LENGTH], "100");
        assert_eq!(headers[CONTENT_TYPE], "video/x-matroska");
        assert_eq!(headers[ACCEPT_RANGES], "bytes");
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, movie_bytes().slice(100..200));
    }

    #[tokio::test]
    async fn test_full_response_without_range() {
        let (router, _, id) = setup().await;

        let response = send(&router, &format!("/stream/{id}/1"), None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "1000");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, movie_bytes());
    }

    #[tokio::test]
    async fn test_open_ended_range_clamps_to_file() {
        let (router, _, id) = setup().await;

        let response = send(&router, &format!("/stream/{id}/1"), Some("bytes=900-")).await;

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes 900-999/1000");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), 100);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let (router, _, id) = setup().await;

        let response = send(&router, &format!("/stream/{id}/1"), Some("bytes=2000-3000")).await;

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes */1000");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_range_serves_full_file() {
        let (router, _, id) = setup().await;

        let response = send(&router, &format!("/stream/{id}/1"), Some("bytes=-100")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "1000");
    }

    #[tokio::test]
    async fn test_unknown_session_and_bad_index() {
        let (router, _, id) = setup().await;

        let response = send(&router, &format!("/stream/{}/0", "0".repeat(40)), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[ACCEPT_RANGES], "bytes");

        let response = send(&router, "/stream/not-a-hash/0", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&router, &format!("/stream/{id}/7"), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&router, &format!("/stream/{id}/abc"), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_content_type_follows_extension() {
        let (router, _, id) = setup().await;

        let response = send(&router, &format!("/stream/{id}/0"), None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
    }

    #[tokio::test]
    async fn test_range_start_moves_playback_window() {
        let (router, engine, id) = setup().await;

        let response = send(&router, &format!("/stream/{id}/1"), Some("bytes=800-")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);

        // File 1 starts at swarm byte 5, so byte 800 lives in piece 8
        let priorities = engine.swarm(InfoHash::new([0xab; 20])).unwrap().priorities();
        assert_eq!(priorities[8], PiecePriority::High);
        assert_eq!(priorities[0], PiecePriority::Default);
    }

    #[tokio::test]
    async fn test_range_from_zero_after_tail_read_moves_window_back() {
        let (router, engine, id) = setup().await;
        let swarm = engine.swarm(InfoHash::new([0xab; 20])).unwrap();

        send(&router, &format!("/stream/{id}/1"), Some("bytes=900-")).await;
        assert_eq!(swarm.priorities()[9], PiecePriority::High);

        let response = send(&router, &format!("/stream/{id}/1"), Some("bytes=0-")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);

        let priorities = swarm.priorities();
        assert_eq!(priorities[0], PiecePriority::High);
        assert_ne!(priorities[9], PiecePriority::High);
    }

    #[tokio::test]
    async fn test_request_without_range_leaves_window() {
        let (router, engine, id) = setup().await;
        let swarm = engine.swarm(InfoHash::new([0xab; 20])).unwrap();

        send(&router, &format!("/stream/{id}/1"), Some("bytes=900-")).await;
        send(&router, &format!("/stream/{id}/1"), None).await;

        let priorities = swarm.priorities();
        assert_eq!(priorities[9], PiecePriority::High);
        assert_eq!(priorities[0], PiecePriority::Default);
    }

    /// Serves one chunk, then fails every read.
    struct FailingReader {
        served: bool,
    }

    #[async_trait::async_trait]
    impl FileReader for FailingReader {
        fn length(&self) -> u64 {
            1000
        }

        async fn seek(&mut self, position: u64) -> Result<u64, EngineError> {
            Ok(position)
        }

        async fn read_chunk(&mut self, max_len: usize) -> Result<Bytes, EngineError> {
            if self.served {
                return Err(EngineError::SwarmClosed);
            }
            self.served = true;
            Ok(Bytes::from(vec![7u8; max_len]))
        }
    }

    #[tokio::test]
    async fn test_read_error_ends_body_early() {
        let reader = Box::new(FailingReader { served: false });

        let chunks: Vec<_> = reader_stream(reader, 100, 500, 64, "failing/0".to_string())
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_head_returns_headers_only() {
        let (router, _, id) = setup().await;

        let request = Request::builder()
            .method(Method::HEAD)
            .uri(format!("/stream/{id}/1"))
            .header(RANGE, "bytes=0-9")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[CONTENT_LENGTH], "10");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }
}
