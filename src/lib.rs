pub mod auth;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod export;
pub mod extraction;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod state;
pub mod storage;
pub mod summarizer;
pub mod utils;
pub mod validation;
pub mod workers;

pub use workers::{default_handlers, Worker};

/// Installs the process-wide `tracing` subscriber, honouring `RUST_LOG`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
