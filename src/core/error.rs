//! Error types for terrain generation

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown selector: {0}")]
    UnknownSelector(String),

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Terrain not ready: {0}")]
    TerrainNotReady(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
