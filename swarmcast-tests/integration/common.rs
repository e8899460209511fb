//! Shared harness: a running server pair backed by the simulated engine

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{Value, json};
use swarmcast_core::SwarmcastConfig;
use swarmcast_sim::{ContentCatalog, SimulatedFile, SimulatedSwarmEngine, SimulatedTorrent};
use swarmcast_web::{ServerError, SwarmcastServer};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const PIECE_LENGTH: u64 = 16 * 1024;

/// Deterministic movie bytes: the low byte of each offset.
pub fn movie_bytes(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>())
}

/// Two-file torrent: a small text file followed by a 1 MiB movie.
pub fn sample_torrent() -> SimulatedTorrent {
    SimulatedTorrent::new(
        "Sample Movie",
        PIECE_LENGTH,
        vec![
            SimulatedFile::memory("Sample/info.txt", Bytes::from_static(b"sample")),
            SimulatedFile::memory("Sample/Sample.Movie.mp4", movie_bytes(1024 * 1024)),
        ],
    )
}

pub fn ephemeral_config() -> SwarmcastConfig {
    let mut config = SwarmcastConfig::for_testing();
    config.server.api_port = 0;
    config.server.stream_port = 0;
    config
}

pub struct TestServer {
    pub engine: Arc<SimulatedSwarmEngine>,
    pub client: reqwest::Client,
    api_base: String,
    stream_base: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
}

impl TestServer {
    pub async fn start(engine: SimulatedSwarmEngine) -> Self {
        Self::start_with_config(engine, ephemeral_config()).await
    }

    pub async fn start_with_config(engine: SimulatedSwarmEngine, config: SwarmcastConfig) -> Self {
        let engine = Arc::new(engine);
        let server = SwarmcastServer::bind(config, engine.clone()).await.unwrap();
        let api_base = format!("http://{}", server.api_addr());
        let stream_base = format!("http://{}", server.stream_addr());

        let (shutdown, rx) = oneshot::channel();
        let task = tokio::spawn(server.run(async {
            let _ = rx.await;
        }));

        Self {
            engine,
            client: reqwest::Client::new(),
            api_base,
            stream_base,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Fast-downloading engine over the sample torrent.
    pub fn downloading_engine() -> SimulatedSwarmEngine {
        let catalog = ContentCatalog::new().with_torrent(sample_torrent());
        SimulatedSwarmEngine::new(catalog, &ephemeral_config().simulation)
    }

    /// Engine whose pieces only complete when a test says so.
    pub fn paused_engine() -> SimulatedSwarmEngine {
        Self::downloading_engine().paused()
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    pub fn stream(&self, path: &str) -> String {
        format!("{}{}", self.stream_base, path)
    }

    pub async fn add(&self, magnet: &str) -> (reqwest::StatusCode, Value) {
        self.post("/add", json!({ "magnet": magnet })).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (reqwest::StatusCode, Value) {
        let response = self
            .client
            .post(self.api(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    pub async fn get_json(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let response = self.client.get(self.api(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    pub async fn delete(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let response = self.client.delete(self.api(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    /// Stops both servers and waits for them to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("server did not stop")
                .unwrap()
                .unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
