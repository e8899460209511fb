//! Range delivery over real HTTP against the simulated swarm

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};

use crate::common::{PIECE_LENGTH, TestServer, movie_bytes, sample_torrent};

const MOVIE_LENGTH: usize = 1024 * 1024;

async fn started() -> (TestServer, String) {
    let server = TestServer::start(TestServer::downloading_engine()).await;
    let (status, added) = server.add(&sample_torrent().magnet_link()).await;
    assert_eq!(status, StatusCode::OK);
    let id = added["torrentId"].as_str().unwrap().to_string();
    (server, id)
}

#[tokio::test]
async fn test_partial_content_matches_file_bytes() {
    let (server, id) = started().await;

    let response = server
        .client
        .get(server.stream(&format!("/stream/{id}/1")))
        .header(RANGE, "bytes=1000-1999")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    let headers = response.headers().clone();
    assert_eq!(headers[CONTENT_RANGE], format!("bytes 1000-1999/{MOVIE_LENGTH}").as_str());
    assert_eq!(headers[CONTENT_LENGTH], "1000");
    assert_eq!(headers[CONTENT_TYPE], "video/mp4");
    assert_eq!(headers[ACCEPT_RANGES], "bytes");
    let body = response.bytes().await.unwrap();
    assert_eq!(body, movie_bytes(MOVIE_LENGTH).slice(1000..2000));
}

#[tokio::test]
async fn test_range_spanning_pieces() {
    let (server, id) = started().await;
    let start = PIECE_LENGTH as usize - 10;
    let end = 3 * PIECE_LENGTH as usize + 10;

    let response = server
        .client
        .get(server.stream(&format!("/stream/{id}/1")))
        .header(RANGE, format!("bytes={start}-{end}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    let body = response.bytes().await.unwrap();
    assert_eq!(body, movie_bytes(MOVIE_LENGTH).slice(start..=end));
}

#[tokio::test]
async fn test_full_file_without_range() {
    let (server, id) = started().await;

    let response = server
        .client
        .get(server.stream(&format!("/stream/{id}/1")))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_LENGTH], MOVIE_LENGTH.to_string().as_str());
    let body = response.bytes().await.unwrap();
    assert_eq!(body, movie_bytes(MOVIE_LENGTH));
}

#[tokio::test]
async fn test_non_video_file_in_same_swarm() {
    let (server, id) = started().await;

    let response = server
        .client
        .get(server.stream(&format!("/stream/{id}/0")))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"sample");
}

#[tokio::test]
async fn test_out_of_bounds_range_is_416() {
    let (server, id) = started().await;

    let response = server
        .client
        .get(server.stream(&format!("/stream/{id}/1")))
        .header(RANGE, format!("bytes={MOVIE_LENGTH}-"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        response.headers()[CONTENT_RANGE],
        format!("bytes */{MOVIE_LENGTH}").as_str()
    );
}

#[tokio::test]
async fn test_bad_file_index_and_unknown_id() {
    let (server, id) = started().await;

    let response = server
        .client
        .get(server.stream(&format!("/stream/{id}/9")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server
        .client
        .get(server.stream(&format!("/stream/{}/0", "e".repeat(40))))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_read_blocks_until_pieces_complete() {
    let server = TestServer::start(TestServer::paused_engine()).await;
    let torrent = sample_torrent();
    let (_, added) = server.add(&torrent.magnet_link()).await;
    let id = added["torrentId"].as_str().unwrap().to_string();

    let client = server.client.clone();
    let url = server.stream(&format!("/stream/{id}/1"));
    let request = tokio::spawn(async move {
        let response = client
            .get(url)
            .header(RANGE, "bytes=0-99")
            .send()
            .await
            .unwrap();
        (response.status(), response.bytes().await.unwrap())
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!request.is_finished(), "read returned before its piece was complete");

    // File 1 starts 6 bytes into the swarm, so its first 100 bytes live in piece 0
    assert_eq!(server.engine.complete_pieces(torrent.info_hash, 0..=0), 1);

    let (status, body) = tokio::time::timeout(Duration::from_secs(5), request)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, movie_bytes(MOVIE_LENGTH).slice(0..100));
}

#[tokio::test]
async fn test_remove_cuts_open_stream_short() {
    let server = TestServer::start(TestServer::paused_engine()).await;
    let torrent = sample_torrent();
    let (_, added) = server.add(&torrent.magnet_link()).await;
    let id = added["torrentId"].as_str().unwrap().to_string();
    server.engine.complete_pieces(torrent.info_hash, 0..=0);

    // Piece 0 is available, piece 1 never arrives
    let client = server.client.clone();
    let url = server.stream(&format!("/stream/{id}/1"));
    let request = tokio::spawn(async move {
        let response = client.get(url).header(RANGE, "bytes=0-49999").send().await?;
        response.bytes().await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!request.is_finished(), "read past piece 0 returned early");

    let (status, _) = server.delete(&format!("/remove/{id}")).await;
    assert_eq!(status, StatusCode::OK);

    let body = tokio::time::timeout(Duration::from_secs(5), request)
        .await
        .expect("removed stream stayed open")
        .unwrap();
    // Either the connection reports the short body or it hands back fewer bytes
    if let Ok(bytes) = body {
        assert!(bytes.len() < 50_000, "full body after remove");
    }

    let (status, health) = server.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["sessions"], 0);
    let response = server
        .client
        .get(server.stream(&format!("/stream/{id}/1")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
