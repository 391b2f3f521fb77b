//! Isoterra - streamed voxel terrain meshed with Marching Cubes or Dual Contouring

pub mod core;
pub mod math;
pub mod density;
pub mod mesh;
pub mod chunk;
pub mod streaming;
pub mod placement;
pub mod terrain;
