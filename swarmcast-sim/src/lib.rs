//! Swarmcast Simulation - An in-process swarm engine for development and tests.
//!
//! The simulated engine implements the same capability traits as a real swarm
//! engine, so the session controller, scheduler and HTTP servers run
//! unchanged on top of it:
//!
//! - **Catalog**: torrents backed by memory, deterministic synthetic bytes or
//!   local video files
//! - **Metadata delay**: metadata arrives after a configurable delay; unknown
//!   info hashes never resolve, like a swarm without peers
//! - **Priority-driven download**: pieces complete at a configured byte rate,
//!   highest priority first
//! - **Blocking reads**: readers wait until the pieces they need are complete
//!
//! # Example
//!
//! ```rust,no_run
//! use swarmcast_core::config::SimulationConfig;
//! use swarmcast_sim::{ContentCatalog, SimulatedSwarmEngine};
//!
//! let catalog = ContentCatalog::demo(42);
//! for torrent in catalog.torrents() {
//!     println!("{}: {}", torrent.name, torrent.magnet_link());
//! }
//! let engine = SimulatedSwarmEngine::new(catalog, &SimulationConfig::default());
//! ```

pub mod catalog;
pub mod engine;
mod swarm;

pub use catalog::{ContentCatalog, FileSource, SimulatedFile, SimulatedTorrent};
pub use engine::SimulatedSwarmEngine;
