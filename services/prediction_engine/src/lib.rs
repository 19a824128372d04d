pub mod api_football;
pub mod batch;
pub mod config;
pub mod engine;
pub mod events;
pub mod feed;
pub mod ingestion;
pub mod lifecycle;
pub mod match_feed;
pub mod memory_store;
pub mod metrics;
pub mod pg_store;
pub mod predictions;
pub mod push;
pub mod ranking;
pub mod refresh;
pub mod scoring;
pub mod store;
pub mod types;
pub mod utils;
pub mod web;

pub use engine::{Engine, EngineError, EngineSettings};
