//! Playback position updates driving piece priorities end to end

use std::time::Duration;

use futures::future::join_all;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use serde_json::json;
use swarmcast_core::engine::PiecePriority;

use crate::common::{TestServer, ephemeral_config, movie_bytes, sample_torrent};

const BUFFER_AHEAD: u64 = 128 * 1024;

async fn paused_server() -> (TestServer, String) {
    let mut config = ephemeral_config();
    config.scheduler.buffer_ahead_bytes = BUFFER_AHEAD;
    let server = TestServer::start_with_config(TestServer::paused_engine(), config).await;
    let (status, added) = server.add(&sample_torrent().magnet_link()).await;
    assert_eq!(status, StatusCode::OK);
    (server, added["torrentId"].as_str().unwrap().to_string())
}

fn band_indices(priorities: &[PiecePriority], band: PiecePriority) -> Vec<usize> {
    priorities
        .iter()
        .enumerate()
        .filter(|(_, priority)| **priority == band)
        .map(|(index, _)| index)
        .collect()
}

#[tokio::test]
async fn test_add_prioritizes_file_start() {
    let (server, _) = paused_server().await;

    let priorities = server.engine.priorities(sample_torrent().info_hash).unwrap();

    assert_eq!(band_indices(&priorities, PiecePriority::High), (0..=5).collect::<Vec<_>>());
    // Buffer end lands in piece 9, then a 10 piece prefetch tail
    assert_eq!(band_indices(&priorities, PiecePriority::Normal), (6..=19).collect::<Vec<_>>());
    assert_eq!(priorities[20], PiecePriority::Default);
}

#[tokio::test]
async fn test_seek_moves_window_and_withdraws_old_pieces() {
    let (server, id) = paused_server().await;

    let (status, plan) = server
        .post(
            "/position",
            json!({ "torrentId": id, "fileIndex": 1, "positionBytes": 512 * 1024 }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["torrentId"], id);
    assert_eq!(plan["positionBytes"], 512 * 1024);
    assert_eq!(plan["highPieces"], json!({ "first": 32, "last": 37 }));
    assert_eq!(plan["normalPieces"], json!({ "first": 38, "last": 41 }));
    assert_eq!(plan["prefetchPieces"], json!({ "first": 42, "last": 51 }));

    let priorities = server.engine.priorities(sample_torrent().info_hash).unwrap();
    assert_eq!(band_indices(&priorities, PiecePriority::High), (32..=37).collect::<Vec<_>>());
    assert!(priorities[..32].iter().all(|p| *p == PiecePriority::Default));
}

#[tokio::test]
async fn test_negative_and_past_end_positions_clamp() {
    let (server, id) = paused_server().await;

    let (status, plan) = server
        .post(
            "/position",
            json!({ "torrentId": id, "fileIndex": 1, "positionBytes": -500 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["positionBytes"], 0);
    assert_eq!(plan["highPieces"]["first"], 0);

    let (status, plan) = server
        .post(
            "/position",
            json!({ "torrentId": id, "fileIndex": 1, "positionBytes": 50_000_000 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["highPieces"], json!({ "first": 64, "last": 64 }));
    assert!(plan["prefetchPieces"].is_null());
}

#[tokio::test]
async fn test_position_for_unknown_session_or_file() {
    let (server, id) = paused_server().await;

    let (status, _) = server
        .post(
            "/position",
            json!({ "torrentId": "c".repeat(40), "fileIndex": 0, "positionBytes": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .post(
            "/position",
            json!({ "torrentId": id, "fileIndex": 2, "positionBytes": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_concurrent_updates_leave_one_window() {
    let (server, id) = paused_server().await;

    let updates = (0..10u64).map(|step| {
        server.post(
            "/position",
            json!({ "torrentId": id, "fileIndex": 1, "positionBytes": step * 96 * 1024 }),
        )
    });
    for (status, _) in join_all(updates).await {
        assert_eq!(status, StatusCode::OK);
    }

    let priorities = server.engine.priorities(sample_torrent().info_hash).unwrap();
    let high = band_indices(&priorities, PiecePriority::High);
    assert!(!high.is_empty() && high.len() <= 6, "{high:?}");
    assert!(
        high.windows(2).all(|pair| pair[1] == pair[0] + 1),
        "high band is not contiguous: {high:?}"
    );
}

#[tokio::test]
async fn test_range_request_pulls_window_forward() {
    let mut config = ephemeral_config();
    config.scheduler.buffer_ahead_bytes = BUFFER_AHEAD;
    let engine = TestServer::downloading_engine().with_download_rate(256 * 1024);
    let server = TestServer::start_with_config(engine, config).await;
    let (_, added) = server.add(&sample_torrent().magnet_link()).await;
    let id = added["torrentId"].as_str().unwrap();

    // In index order this byte would take several seconds to arrive
    let start = 768 * 1024;
    let response = tokio::time::timeout(
        Duration::from_secs(1),
        server
            .client
            .get(server.stream(&format!("/stream/{id}/1")))
            .header(RANGE, format!("bytes={start}-{}", start + 99))
            .send(),
    )
    .await
    .expect("range request stalled")
    .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);

    let body = tokio::time::timeout(Duration::from_secs(1), response.bytes())
        .await
        .expect("seeked read was not prioritized")
        .unwrap();
    assert_eq!(body, movie_bytes(1024 * 1024).slice(start..start + 100));
}
