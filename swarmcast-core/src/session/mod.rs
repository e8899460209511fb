//! Swarm sessions and their lifecycle
//!
//! A session exists for every swarm whose metadata has arrived. The registry
//! is the single shared map of sessions; the controller is the only writer.

pub use controller::{AddedSwarm, PlaybackUpdate, SessionController, SwarmState, SwarmStatus};
pub use error::SessionError;
pub use registry::{Insertion, SessionRegistry};
pub use swarm::{FileEntry, SwarmSession, file_entries, select_stream_file};

mod controller;
mod error;
mod registry;
mod swarm;
