//! Extractor selection

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{DualContouring, MarchingCubes, MeshData};
use crate::core::Error;
use crate::density::Density;

/// A chunk extractor bound to its density field and chunk origin.
///
/// Builders are moved onto worker threads, so they must be `Send`.
pub trait MeshBuilder: Send + Sync {
    /// Extract the chunk's mesh
    fn generate(&self) -> MeshData;

    /// Which algorithm this builder runs
    fn algorithm(&self) -> IsosurfaceAlgorithm;
}

/// Isosurface extraction algorithm
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsosurfaceAlgorithm {
    #[default]
    MarchingCubes,
    DualContouring,
}

impl fmt::Display for IsosurfaceAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarchingCubes => write!(f, "marching_cubes"),
            Self::DualContouring => write!(f, "dual_contouring"),
        }
    }
}

impl FromStr for IsosurfaceAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "marching_cubes" | "mc" => Ok(Self::MarchingCubes),
            "dual_contouring" | "dc" => Ok(Self::DualContouring),
            other => Err(Error::UnknownSelector(format!("isosurface algorithm '{other}'"))),
        }
    }
}

/// Create the extractor for one chunk
pub fn mesh_builder(
    algorithm: IsosurfaceAlgorithm,
    density: Arc<Density>,
    offset: Vec3,
    chunk_size: u32,
) -> Box<dyn MeshBuilder> {
    match algorithm {
        IsosurfaceAlgorithm::MarchingCubes => {
            Box::new(MarchingCubes::new(density, offset, chunk_size))
        }
        IsosurfaceAlgorithm::DualContouring => {
            Box::new(DualContouring::new(density, offset, chunk_size))
        }
    }
}
