//! Chunks: fixed-size cubic cells of the terrain grid
//!
//! A [`Chunk`] is a pooled container that is assigned a [`ChunkCoord`],
//! receives extracted geometry, publishes it to a [`MeshSink`] and the
//! [`ColliderSet`], and owns the objects placed on its surface.

pub mod coord;
pub mod lifecycle;
pub mod sink;
pub mod surface;

pub use coord::ChunkCoord;
pub use lifecycle::{BuildTicket, Chunk, ChunkContext, ChunkState};
pub use sink::{MemorySink, MeshSink, NullSink};
pub use surface::{ColliderSet, LayerMask, MeshCollider, SurfaceHit, SurfaceQuery};
