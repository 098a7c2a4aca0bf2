// Public API for the binary and integration tests

pub mod api;
pub mod broadcast;
pub mod config;
pub mod dedup;
pub mod error;
pub mod matcher;
pub mod protocol;
pub mod questions;
pub mod scoring;
pub mod semantic;
pub mod state;
pub mod types;
pub mod ws;
