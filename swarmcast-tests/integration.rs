//! Integration tests for Swarmcast
//!
//! Each test runs the API and streaming servers on ephemeral ports against the
//! simulated swarm engine and talks to them over real HTTP.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/api_lifecycle.rs"]
mod api_lifecycle;
#[path = "integration/development_mode.rs"]
mod development_mode;
#[path = "integration/playback_scheduling.rs"]
mod playback_scheduling;
#[path = "integration/range_streaming.rs"]
mod range_streaming;
