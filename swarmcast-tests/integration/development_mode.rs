//! Streaming local video files through the development-mode catalog

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, RANGE};
use swarmcast_sim::{ContentCatalog, SimulatedSwarmEngine};
use tempfile::TempDir;

use crate::common::{TestServer, ephemeral_config, movie_bytes};

#[tokio::test]
async fn test_local_file_streams_through_swarm() {
    let dir = TempDir::new().unwrap();
    let content = movie_bytes(600 * 1024);
    tokio::fs::create_dir(dir.path().join("nested")).await.unwrap();
    tokio::fs::write(dir.path().join("nested/Local_Movie.mkv"), &content)
        .await
        .unwrap();
    tokio::fs::write(dir.path().join("notes.txt"), b"not a video")
        .await
        .unwrap();

    let catalog = ContentCatalog::from_directory(dir.path()).await.unwrap();
    assert_eq!(catalog.len(), 1);
    let torrent = catalog.torrents()[0].clone();
    assert_eq!(torrent.name, "Local Movie");

    let config = ephemeral_config();
    let engine = SimulatedSwarmEngine::new(catalog, &config.simulation);
    let server = TestServer::start_with_config(engine, config).await;

    let (status, added) = server.add(&torrent.magnet_link()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(added["files"][0]["name"], "Local_Movie.mkv");
    let id = added["torrentId"].as_str().unwrap();

    let response = server
        .client
        .get(server.stream(&format!("/stream/{id}/0")))
        .header(RANGE, "bytes=300000-300999")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_TYPE], "video/x-matroska");
    let body = response.bytes().await.unwrap();
    assert_eq!(body, content.slice(300_000..301_000));
}
