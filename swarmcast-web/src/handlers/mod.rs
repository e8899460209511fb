//! HTTP request handlers

pub mod api;
pub mod range;
pub mod stream;
