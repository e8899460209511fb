//! Centralized configuration for Swarmcast.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// Errors raised while validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("API and stream servers cannot share port {port}")]
    PortConflict { port: u16 },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
}

/// Central configuration for all Swarmcast components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SwarmcastConfig {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub session: SessionConfig,
    pub streaming: StreamingConfig,
    pub simulation: SimulationConfig,
}

/// Listener configuration for the API and streaming servers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address both servers bind to
    pub bind_addr: IpAddr,
    /// JSON API port
    pub api_port: u16,
    /// Streaming port
    pub stream_port: u16,
    /// Host name placed in published stream URLs
    pub public_host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from([127, 0, 0, 1]),
            api_port: 8080,
            stream_port: 8081,
            public_host: "localhost".to_string(),
        }
    }
}

impl ServerConfig {
    /// Origin prefixed to every published stream URL.
    pub fn stream_origin(&self) -> String {
        format!("http://{}:{}", self.public_host, self.stream_port)
    }
}

/// Piece priority window sizing.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Look-ahead distance from the playhead
    pub buffer_ahead_bytes: u64,
    /// Pieces after the playhead piece that receive High priority
    pub immediate_window_pieces: u32,
    /// Pieces past the buffer end that receive Normal priority
    pub prefetch_tail_pieces: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            buffer_ahead_bytes: 20 * 1024 * 1024, // 20 MiB
            immediate_window_pieces: 5,
            prefetch_tail_pieces: 10,
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long `add` waits for swarm metadata
    pub metadata_timeout: Duration,
    /// First path segment of stream URLs
    pub stream_base: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            metadata_timeout: Duration::from_secs(120),
            stream_base: "stream".to_string(),
        }
    }
}

/// Range delivery settings.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Maximum bytes pulled from the engine per body chunk
    pub read_chunk_size: usize,
    /// Treat the start of a range request as a playback position update
    pub infer_position_from_range: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 64 * 1024, // 64 KiB
            infer_position_from_range: true,
        }
    }
}

/// Simulated swarm configuration for testing and development.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Delay before a catalogued swarm reports its metadata
    pub metadata_delay: Duration,
    /// Simulated download speed in bytes per second
    pub download_rate: u64,
    /// Interval between simulated piece completions
    pub tick_interval: Duration,
    /// Deterministic seed for synthetic content
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            metadata_delay: Duration::from_millis(500),
            download_rate: 4 * 1024 * 1024, // 4 MiB/s
            tick_interval: Duration::from_millis(100),
            seed: 42,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for fast deterministic tests.
    pub fn deterministic_testing() -> Self {
        Self {
            metadata_delay: Duration::from_millis(5),
            download_rate: 64 * 1024 * 1024,
            tick_interval: Duration::from_millis(5),
            seed: 42,
        }
    }
}

impl SwarmcastConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparsable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = env_value::<u16>("TORRENT_API_PORT") {
            config.server.api_port = port;
        }

        if let Some(port) = env_value::<u16>("TORRENT_STREAM_PORT") {
            config.server.stream_port = port;
        }

        if let Some(addr) = env_value::<IpAddr>("SWARMCAST_BIND_ADDR") {
            config.server.bind_addr = addr;
        }

        if let Ok(host) = std::env::var("SWARMCAST_PUBLIC_HOST") {
            if !host.is_empty() {
                config.server.public_host = host;
            }
        }

        if let Some(seconds) = env_value::<u64>("SWARMCAST_METADATA_TIMEOUT") {
            config.session.metadata_timeout = Duration::from_secs(seconds);
        }

        if let Some(bytes) = env_value::<u64>("SWARMCAST_BUFFER_AHEAD") {
            config.scheduler.buffer_ahead_bytes = bytes;
        }

        if let Some(rate) = env_value::<u64>("SWARMCAST_SIM_RATE") {
            config.simulation.download_rate = rate;
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        let mut config = Self {
            simulation: SimulationConfig::deterministic_testing(),
            ..Default::default()
        };
        config.session.metadata_timeout = Duration::from_secs(2);
        config
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    /// - `ConfigError::PortConflict` - API and stream ports are equal and non-zero
    /// - `ConfigError::ZeroValue` - A size or rate that must be positive is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.api_port != 0 && self.server.api_port == self.server.stream_port {
            return Err(ConfigError::PortConflict {
                port: self.server.api_port,
            });
        }
        if self.streaming.read_chunk_size == 0 {
            return Err(ConfigError::ZeroValue {
                field: "read_chunk_size",
            });
        }
        if self.simulation.tick_interval.is_zero() {
            return Err(ConfigError::ZeroValue {
                field: "tick_interval",
            });
        }
        Ok(())
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = SwarmcastConfig::default();

        assert_eq!(config.server.api_port, 8080);
        assert_eq!(config.server.stream_port, 8081);
        assert_eq!(config.scheduler.buffer_ahead_bytes, 20 * 1024 * 1024);
        assert_eq!(config.scheduler.immediate_window_pieces, 5);
        assert_eq!(config.scheduler.prefetch_tail_pieces, 10);
        assert_eq!(config.session.metadata_timeout, Duration::from_secs(120));
        assert_eq!(config.session.stream_base, "stream");
        assert!(config.streaming.infer_position_from_range);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_origin() {
        let config = SwarmcastConfig::default();
        assert_eq!(config.server.stream_origin(), "http://localhost:8081");
    }

    #[test]
    fn test_validate_rejects_shared_port() {
        let mut config = SwarmcastConfig::default();
        config.server.stream_port = config.server.api_port;
        assert_eq!(
            config.validate(),
            Err(ConfigError::PortConflict { port: 8080 })
        );

        // Ephemeral ports are allowed to both be zero
        config.server.api_port = 0;
        config.server.stream_port = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_preset() {
        let config = SwarmcastConfig::for_testing();
        assert!(config.session.metadata_timeout < Duration::from_secs(120));
        assert!(config.simulation.metadata_delay < Duration::from_millis(100));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("TORRENT_API_PORT", "9090");
            std::env::set_var("TORRENT_STREAM_PORT", "not-a-port");
            std::env::set_var("SWARMCAST_METADATA_TIMEOUT", "30");
            std::env::set_var("SWARMCAST_PUBLIC_HOST", "media.local");
        }

        let config = SwarmcastConfig::from_env();

        assert_eq!(config.server.api_port, 9090);
        assert_eq!(config.server.stream_port, 8081);
        assert_eq!(config.session.metadata_timeout, Duration::from_secs(30));
        assert_eq!(config.server.stream_origin(), "http://media.local:8081");

        // Cleanup
        unsafe {
            std::env::remove_var("TORRENT_API_PORT");
            std::env::remove_var("TORRENT_STREAM_PORT");
            std::env::remove_var("SWARMCAST_METADATA_TIMEOUT");
            std::env::remove_var("SWARMCAST_PUBLIC_HOST");
        }
    }
}
