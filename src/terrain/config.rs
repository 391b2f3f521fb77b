//! Terrain engine configuration
//!
//! Everything is `serde`-serialisable with defaults for every field, so a
//! JSON file only needs to name what it changes:
//!
//! ```json
//! { "terrain": { "chunk_size": 16, "algorithm": "dual_contouring" },
//!   "trees": { "resources": [{ "name": "pine", "height_range": [0.1, 0.6] }] } }
//! ```

use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::density::{DensityMode, NoiseSettings};
use crate::mesh::IsosurfaceAlgorithm;
use crate::placement::ObjectSpawnSettings;
use crate::streaming::{DispatchMode, GridSettings};

/// Terrain extent, shape and scheduling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    pub noise: NoiseSettings,
    /// Replace the noise seed with a random one on every generation
    pub random_seed: bool,
    /// Chunk edge length in cubes
    pub chunk_size: u32,
    pub max_height: f32,
    pub view_distance: f32,
    pub sea_level: f32,
    pub algorithm: IsosurfaceAlgorithm,
    pub density_mode: DensityMode,
    /// Static world footprint (x, z)
    pub world_size: [f32; 2],
    /// Stream chunks around an observer instead of building a fixed world
    pub infinite: bool,
    /// Expose a sea-level plane to surface queries
    pub water: bool,
    pub max_chunks_per_tick: usize,
    pub dispatch: DispatchMode,
    /// Extraction worker threads, 0 for one per core
    pub worker_threads: usize,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            noise: NoiseSettings { amplitude: 10.0, ..Default::default() },
            random_seed: false,
            chunk_size: 16,
            max_height: 100.0,
            view_distance: 64.0,
            sea_level: 0.0,
            algorithm: IsosurfaceAlgorithm::MarchingCubes,
            density_mode: DensityMode::Heightmap,
            world_size: [64.0, 64.0],
            infinite: false,
            water: false,
            max_chunks_per_tick: 2,
            dispatch: DispatchMode::Threaded,
            worker_threads: 0,
        }
    }
}

impl TerrainSettings {
    /// Grid parameters derived from these settings
    pub fn grid_settings(&self) -> GridSettings {
        GridSettings {
            chunk_size: self.chunk_size,
            view_distance: self.view_distance,
            max_height: self.max_height,
            world_size: Vec2::from(self.world_size),
            max_chunks_per_tick: self.max_chunks_per_tick,
            algorithm: self.algorithm,
        }
    }

    /// Chunk containers to pre-allocate for the configured mode
    pub fn chunk_pool_size(&self) -> usize {
        let grid = self.grid_settings();
        if self.infinite {
            grid.streaming_pool_size()
        } else {
            grid.static_pool_size()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be positive".into()));
        }
        if self.max_height < self.chunk_size as f32 {
            return Err(Error::Config(format!(
                "max height {} is smaller than one chunk ({})",
                self.max_height, self.chunk_size
            )));
        }
        if self.view_distance <= 0.0 {
            return Err(Error::Config("view distance must be positive".into()));
        }
        if self.max_chunks_per_tick == 0 {
            return Err(Error::Config("max chunks per tick must be at least 1".into()));
        }
        if self.noise.octaves == 0 {
            return Err(Error::Config("noise needs at least one octave".into()));
        }
        if self.chunk_pool_size() == 0 {
            return Err(Error::Config(format!(
                "settings produce an empty chunk pool (world {:?}, chunk size {})",
                self.world_size, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Complete engine configuration: terrain plus two placement families
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub terrain: TerrainSettings,
    pub trees: ObjectSpawnSettings,
    pub objects: ObjectSpawnSettings,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&json)?;
        log::debug!("Loaded engine config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// First problem found, if any
    pub fn validate(&self) -> Result<()> {
        self.terrain.validate()?;
        self.trees.validate()?;
        self.objects.validate()?;
        Ok(())
    }
}
