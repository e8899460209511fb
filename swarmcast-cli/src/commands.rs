//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Subcommand, ValueEnum};
use serde_json::{Value, json};
use swarmcast_core::SwarmcastConfig;
use swarmcast_core::tracing_setup::{CliLogLevel, init_tracing};
use swarmcast_sim::{ContentCatalog, SimulatedSwarmEngine};

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

/// Where the swarm content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RuntimeMode {
    /// Synthetic demo torrents
    Simulation,
    /// Video files from a local directory
    Development,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the API and streaming servers
    Server {
        /// JSON API port
        #[arg(long)]
        api_port: Option<u16>,
        /// Streaming port
        #[arg(long)]
        stream_port: Option<u16>,
        /// Content source for the swarm engine
        #[arg(long, value_enum, default_value = "simulation")]
        mode: RuntimeMode,
        /// Directory scanned for videos in development mode
        #[arg(long)]
        movies_dir: Option<PathBuf>,
        /// Console log level
        #[arg(long, value_enum, default_value = "info")]
        log_level: CliLogLevel,
    },
    /// Add a magnet link and print its stream URL
    Add {
        magnet: String,
        /// File to stream instead of the first video
        #[arg(long)]
        file_index: Option<usize>,
        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,
    },
    /// Show every active swarm
    Status {
        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,
    },
    /// Report a playback position
    Seek {
        /// Torrent id (info hash)
        id: String,
        file_index: usize,
        /// Byte offset within the file
        position: u64,
        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,
    },
    /// Remove a swarm and release its resources
    Remove {
        /// Torrent id (info hash)
        id: String,
        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the failure of the command that ran
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Server {
            api_port,
            stream_port,
            mode,
            movies_dir,
            log_level,
        } => start_server(api_port, stream_port, mode, movies_dir, log_level).await,
        Commands::Add {
            magnet,
            file_index,
            api_url,
        } => {
            let mut body = json!({ "magnet": magnet });
            if let Some(index) = file_index {
                body["fileIndex"] = json!(index);
            }
            let response = ApiClient::new(&api_url).post("/add", &body).await?;
            println!("Added {}", response["name"].as_str().unwrap_or_default());
            println!("  Torrent ID: {}", response["torrentId"].as_str().unwrap_or_default());
            println!("  Stream URL: {}", response["streamUrl"].as_str().unwrap_or_default());
            print_files(&response["files"]);
            Ok(())
        }
        Commands::Status { api_url } => {
            let response = ApiClient::new(&api_url).get("/status").await?;
            print_status(&response["torrents"]);
            Ok(())
        }
        Commands::Seek {
            id,
            file_index,
            position,
            api_url,
        } => {
            let body = json!({ "torrentId": id, "fileIndex": file_index, "positionBytes": position });
            let response = ApiClient::new(&api_url).post("/position", &body).await?;
            println!("Playback window moved to byte {position}");
            println!("  High:   {}", format_span(&response["highPieces"]));
            println!("  Normal: {}", format_span(&response["normalPieces"]));
            Ok(())
        }
        Commands::Remove { id, api_url } => {
            ApiClient::new(&api_url).delete(&format!("/remove/{id}")).await?;
            println!("Removed {id}");
            Ok(())
        }
    }
}

/// Start both servers and block until Ctrl-C
///
/// # Errors
/// - Log directory could not be created
/// - Development mode without a readable movies directory
/// - Servers failed to bind or stopped with an error
pub async fn start_server(
    api_port: Option<u16>,
    stream_port: Option<u16>,
    mode: RuntimeMode,
    movies_dir: Option<PathBuf>,
    log_level: CliLogLevel,
) -> anyhow::Result<()> {
    init_tracing(log_level.as_tracing_level(), None).context("Failed to initialize logging")?;

    let mut config = SwarmcastConfig::from_env();
    if let Some(port) = api_port {
        config.server.api_port = port;
    }
    if let Some(port) = stream_port {
        config.server.stream_port = port;
    }

    let catalog = match mode {
        RuntimeMode::Simulation => ContentCatalog::demo(config.simulation.seed),
        RuntimeMode::Development => {
            let Some(dir) = movies_dir else {
                bail!("--movies-dir is required in development mode");
            };
            ContentCatalog::from_directory(&dir)
                .await
                .with_context(|| format!("Failed to scan {}", dir.display()))?
        }
    };

    tracing::info!("Starting in {:?} mode with {} torrents", mode, catalog.len());
    for torrent in catalog.torrents() {
        tracing::info!("  {}: {}", torrent.name, torrent.magnet_link());
    }

    let engine = Arc::new(SimulatedSwarmEngine::new(catalog, &config.simulation));
    swarmcast_web::run_servers(config, engine).await?;
    Ok(())
}

/// Thin JSON client for a running API server.
struct ApiClient {
    client: reqwest::Client,
    base: String,
}

impl ApiClient {
    fn new(api_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: api_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let response = self.client.get(self.url(path)).send().await?;
        read_json(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        read_json(response).await
    }

    async fn delete(&self, path: &str) -> anyhow::Result<Value> {
        let response = self.client.delete(self.url(path)).send().await?;
        read_json(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

async fn read_json(response: reqwest::Response) -> anyhow::Result<Value> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("no error message");
        bail!("Server returned {status}: {message}");
    }
    Ok(body)
}

fn print_files(files: &Value) {
    let Some(files) = files.as_array() else {
        return;
    };
    println!("  Files:");
    for file in files {
        println!(
            "    [{}] {} ({})",
            file["index"],
            file["name"].as_str().unwrap_or_default(),
            format_bytes(file["size"].as_u64().unwrap_or(0))
        );
    }
}

fn print_status(torrents: &Value) {
    let torrents = torrents.as_array().map(Vec::as_slice).unwrap_or_default();
    if torrents.is_empty() {
        println!("No active torrents.");
        return;
    }

    println!("{:<40}  {:>7}  {:<11}  {:>12}  NAME", "ID", "DONE", "STATUS", "DOWN");
    for torrent in torrents {
        println!(
            "{:<40}  {:>6.1}%  {:<11}  {:>10}/s  {}",
            torrent["id"].as_str().unwrap_or_default(),
            torrent["progress"].as_f64().unwrap_or(0.0),
            torrent["status"].as_str().unwrap_or_default(),
            format_bytes(torrent["downloadSpeed"].as_u64().unwrap_or(0)),
            torrent["name"].as_str().unwrap_or_default(),
        );
    }
}

fn format_span(span: &Value) -> String {
    match (span["first"].as_u64(), span["last"].as_u64()) {
        (Some(first), Some(last)) => format!("pieces {first}-{last}"),
        _ => "none".to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
