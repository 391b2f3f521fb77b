//! Terrain generation entry points

pub mod config;
pub mod engine;

pub use config::{EngineConfig, TerrainSettings};
pub use engine::{TerrainEngine, TerrainStats, SPAWN_CLEARANCE};
