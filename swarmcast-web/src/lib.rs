//! Swarmcast Web - JSON API and HTTP range streaming
//!
//! Two axum servers sit on top of one [`swarmcast_core::SessionController`]:
//!
//! - **API server**: `POST /add`, `GET /status`, `POST /position`,
//!   `DELETE /remove/{id}` and `GET /health`, all JSON
//! - **Stream server**: `GET /stream/{id}/{file_index}` answering single byte
//!   ranges with 206, whole files with 200 and out-of-bounds ranges with 416

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, ServerError, SwarmcastServer, api_router, run_servers, stream_router};
