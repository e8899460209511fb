//! Add, status, remove and timeout behavior through the JSON API

use std::time::Duration;

use futures::future::join_all;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use swarmcast_core::engine::{InfoHash, MagnetLink};

use crate::common::{TestServer, ephemeral_config, sample_torrent};

#[tokio::test]
async fn test_add_status_remove_cycle() {
    let server = TestServer::start(TestServer::downloading_engine()).await;
    let torrent = sample_torrent();
    let id = torrent.info_hash.to_string();

    let (status, added) = server.add(&torrent.magnet_link()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(added["torrentId"], id);
    assert_eq!(added["name"], "Sample Movie");
    assert_eq!(added["fileIndex"], 1, "first video file is selected");
    let stream_url = added["streamUrl"].as_str().unwrap();
    assert!(stream_url.ends_with(&format!("/stream/{id}/1")), "{stream_url}");
    assert_eq!(added["files"].as_array().unwrap().len(), 2);
    assert_eq!(added["files"][1]["size"], 1024 * 1024);

    let (status, listing) = server.get_json("/status").await;
    assert_eq!(status, StatusCode::OK);
    let torrents = listing["torrents"].as_array().unwrap();
    assert_eq!(torrents.len(), 1);
    assert_eq!(torrents[0]["id"], id);
    let progress = torrents[0]["progress"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&progress));

    let (status, removed) = server.delete(&format!("/remove/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["removed"], id);
    assert_eq!(server.engine.is_released(torrent.info_hash), Some(true));

    let (_, listing) = server.get_json("/status").await;
    assert!(listing["torrents"].as_array().unwrap().is_empty());

    let response = server
        .client
        .get(server.stream(&format!("/stream/{id}/1")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (status, _) = server.delete(&format!("/remove/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_stream_url_uses_bound_port() {
    let server = TestServer::start(TestServer::downloading_engine()).await;

    let (_, added) = server.add(&sample_torrent().magnet_link()).await;
    let stream_url = added["streamUrl"].as_str().unwrap().to_string();

    let response = server
        .client
        .get(stream_url.replace("localhost", "127.0.0.1"))
        .header("Range", "bytes=0-15")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
}

#[tokio::test]
async fn test_concurrent_adds_share_one_session() {
    let server = TestServer::start(TestServer::downloading_engine()).await;
    let magnet = sample_torrent().magnet_link();

    let results = join_all((0..5).map(|_| server.add(&magnet))).await;

    for (status, added) in &results {
        assert_eq!(*status, StatusCode::OK);
        assert_eq!(added["torrentId"], results[0].1["torrentId"]);
    }
    let (_, health) = server.get_json("/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sessions"], 1);
}

#[tokio::test]
async fn test_unknown_magnet_times_out() {
    let mut config = ephemeral_config();
    config.session.metadata_timeout = Duration::from_millis(200);
    let server = TestServer::start_with_config(TestServer::downloading_engine(), config).await;
    let magnet = MagnetLink::build(InfoHash::new([0x5a; 20]), "Nobody Seeds This", &[]);

    let (status, body) = server.add(&magnet).await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert!(body["error"].as_str().unwrap().contains("Timeout"));
    let (_, listing) = server.get_json("/status").await;
    assert!(listing["torrents"].as_array().unwrap().is_empty());
    assert_eq!(
        server.engine.is_released(InfoHash::new([0x5a; 20])),
        Some(true)
    );
}

#[tokio::test]
async fn test_malformed_requests_are_rejected() {
    let server = TestServer::start(TestServer::downloading_engine()).await;

    let (status, _) = server.add("not-a-magnet").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.add("magnet:?dn=missing-hash").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let response = server
        .client
        .post(server.api("/add"))
        .header("content-type", "application/json")
        .body("{")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, _) = server.delete("/remove/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_shutdown_releases_sessions() {
    let server = TestServer::start(TestServer::downloading_engine()).await;
    let torrent = sample_torrent();
    server.add(&torrent.magnet_link()).await;
    let engine = server.engine.clone();

    server.stop().await;

    assert_eq!(engine.is_released(torrent.info_hash), Some(true));
}

#[tokio::test]
async fn test_shutdown_with_stream_waiting_on_piece() {
    let server = TestServer::start(TestServer::paused_engine()).await;
    let torrent = sample_torrent();
    let (_, added) = server.add(&torrent.magnet_link()).await;
    let id = added["torrentId"].as_str().unwrap().to_string();
    let engine = server.engine.clone();

    let client = server.client.clone();
    let url = server.stream(&format!("/stream/{id}/1"));
    let request = tokio::spawn(async move {
        let response = client.get(url).header(RANGE, "bytes=0-99").send().await?;
        response.bytes().await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!request.is_finished(), "no piece is complete yet");

    // Panics if the drain is still waiting on the open response after 5s
    server.stop().await;

    assert_eq!(engine.is_released(torrent.info_hash), Some(true));
    let body = tokio::time::timeout(Duration::from_secs(5), request)
        .await
        .unwrap()
        .unwrap();
    assert!(body.is_err(), "stream completed without its piece: {body:?}");
}
