//! HTTP adapters (axum).

pub mod billing;
