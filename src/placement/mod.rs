//! Decoration placement on chunk surfaces
//!
//! Each [`ObjectSpawner`] walks a regular sub-grid over a finished chunk,
//! filters candidate columns by placement noise, slope, height and sea
//! level, and checks the surviving objects out of a per-type pool.

pub mod spawner;

pub use spawner::{
    ObjectInstance, ObjectResource, ObjectSpawnSettings, ObjectSpawner, PlacedObject,
};
