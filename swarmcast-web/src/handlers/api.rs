//! JSON API handlers for swarm management

use axum::Json;
use axum::extract::{Path, State};
use bytes::Bytes;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use swarmcast_core::session::{AddedSwarm, PlaybackUpdate};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSwarmRequest {
    pub magnet: String,
    #[serde(default)]
    pub file_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRequest {
    pub torrent_id: String,
    pub file_index: i64,
    pub position_bytes: i64,
}

/// Parses a JSON body, rejecting anything malformed with 400.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {e}")))
}

fn file_index(value: i64) -> Result<usize, ApiError> {
    usize::try_from(value).map_err(|_| ApiError::BadRequest(format!("Invalid file index: {value}")))
}

/// `POST /add`
pub async fn add_swarm(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AddedSwarm>, ApiError> {
    let request: AddSwarmRequest = parse_body(&body)?;
    if request.magnet.trim().is_empty() {
        return Err(ApiError::BadRequest("Magnet link is required".to_string()));
    }
    let explicit_index = request.file_index.map(file_index).transpose()?;

    let added = state
        .controller
        .add_swarm(&request.magnet, explicit_index)
        .await?;
    Ok(Json(added))
}

/// `GET /status`
pub async fn swarm_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "torrents": state.controller.status() }))
}

/// `POST /position`
pub async fn update_position(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PlaybackUpdate>, ApiError> {
    let request: PositionRequest = parse_body(&body)?;
    let index = file_index(request.file_index)?;

    let update = state.controller.update_playback_position(
        &request.torrent_id,
        index,
        request.position_bytes,
    )?;
    Ok(Json(update))
}

/// `DELETE /remove/{id}`
pub async fn remove_swarm(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.controller.remove_swarm(&id)?;
    Ok(Json(json!({ "removed": id })))
}

/// `DELETE /remove/` without an id
pub async fn remove_missing_id() -> ApiError {
    ApiError::BadRequest("Torrent ID is required".to_string())
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.controller.session_count(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use swarmcast_core::engine::mock::MockSwarmEngine;
    use swarmcast_core::engine::{InfoHash, MagnetLink, PiecePriority};
    use swarmcast_core::{SessionController, SwarmcastConfig};
    use tower::ServiceExt;

    use crate::server::{AppState, api_router};

    const HASH: [u8; 20] = [0x42; 20];

    fn setup() -> (Router, Arc<MockSwarmEngine>) {
        let engine = Arc::new(MockSwarmEngine::new().with_swarm(
            InfoHash::new(HASH),
            1024,
            vec![("Movie.2024.mp4", bytes::Bytes::from(vec![0u8; 64 * 1024]))],
        ));
        let mut config = SwarmcastConfig::for_testing();
        config.session.metadata_timeout = Duration::from_millis(50);
        let controller = Arc::new(SessionController::new(engine.clone(), config));
        (api_router(AppState::new(controller)), engine)
    }

    async fn call(router: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn add_body(info_hash: [u8; 20]) -> String {
        serde_json::json!({ "magnet": MagnetLink::build(InfoHash::new(info_hash), "Movie", &[]) })
            .to_string()
    }

    #[tokio::test]
    async fn test_add_returns_stream_url_and_files() {
        let (router, _) = setup();

        let (status, json) = call(&router, Method::POST, "/add", &add_body(HASH)).await;

        assert_eq!(status, StatusCode::OK);
        let id = InfoHash::new(HASH).to_string();
        assert_eq!(json["torrentId"], id);
        assert_eq!(
            json["streamUrl"],
            format!("http://localhost:8081/stream/{id}/0")
        );
        assert_eq!(json["files"][0]["name"], "Movie.2024.mp4");
        assert_eq!(json["files"][0]["size"], 64 * 1024);
        assert_eq!(json["files"][0]["index"], 0);
    }

    #[tokio::test]
    async fn test_add_rejects_bad_input() {
        let (router, _) = setup();

        let (status, json) = call(&router, Method::POST, "/add", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Invalid JSON"));

        let (status, _) = call(&router, Method::POST, "/add", r#"{"magnet":"invalid-magnet"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = serde_json::json!({
            "magnet": MagnetLink::build(InfoHash::new(HASH), "Movie", &[]),
            "fileIndex": 3,
        });
        let (status, _) = call(&router, Method::POST, "/add", &body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = serde_json::json!({
            "magnet": MagnetLink::build(InfoHash::new(HASH), "Movie", &[]),
            "fileIndex": -1,
        });
        let (status, _) = call(&router, Method::POST, "/add", &body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_add_metadata_timeout_is_408() {
        let (router, _) = setup();

        let (status, json) = call(&router, Method::POST, "/add", &add_body([0x01; 20])).await;

        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert!(json["error"].as_str().unwrap().contains("Timeout"));
    }

    #[tokio::test]
    async fn test_status_lists_sessions() {
        let (router, engine) = setup();
        call(&router, Method::POST, "/add", &add_body(HASH)).await;
        engine
            .swarm(InfoHash::new(HASH))
            .unwrap()
            .set_bytes_completed(64 * 1024);

        let (status, json) = call(&router, Method::GET, "/status", "").await;

        assert_eq!(status, StatusCode::OK);
        let torrents = json["torrents"].as_array().unwrap();
        assert_eq!(torrents.len(), 1);
        assert_eq!(torrents[0]["status"], "completed");
        assert_eq!(torrents[0]["progress"], 100.0);
        assert_eq!(torrents[0]["name"], "Movie.2024.mp4");
    }

    #[tokio::test]
    async fn test_position_updates_priorities() {
        let (router, engine) = setup();
        call(&router, Method::POST, "/add", &add_body(HASH)).await;
        let id = InfoHash::new(HASH).to_string();

        let body = serde_json::json!({ "torrentId": id, "fileIndex": 0, "positionBytes": 40 * 1024 });
        let (status, json) = call(&router, Method::POST, "/position", &body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["highPieces"]["first"], 40);
        let priorities = engine.swarm(InfoHash::new(HASH)).unwrap().priorities();
        assert_eq!(priorities[40], PiecePriority::High);
        assert_eq!(priorities[0], PiecePriority::Default);
    }

    #[tokio::test]
    async fn test_position_errors() {
        let (router, _) = setup();
        call(&router, Method::POST, "/add", &add_body(HASH)).await;
        let id = InfoHash::new(HASH).to_string();

        let body = serde_json::json!({ "torrentId": "f".repeat(40), "fileIndex": 0, "positionBytes": 0 });
        let (status, _) = call(&router, Method::POST, "/position", &body.to_string()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let body = serde_json::json!({ "torrentId": id, "fileIndex": 5, "positionBytes": 0 });
        let (status, _) = call(&router, Method::POST, "/position", &body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&router, Method::POST, "/position", "[]").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_remove_flow() {
        let (router, engine) = setup();
        call(&router, Method::POST, "/add", &add_body(HASH)).await;
        let id = InfoHash::new(HASH).to_string();

        let (status, json) = call(&router, Method::DELETE, &format!("/remove/{id}"), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["removed"], id);
        assert!(engine.swarm(InfoHash::new(HASH)).unwrap().is_released());

        let (status, _) = call(&router, Method::DELETE, &format!("/remove/{id}"), "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&router, Method::DELETE, "/remove/", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = setup();

        let (status, json) = call(&router, Method::GET, "/health", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["sessions"], 0);
    }
}
