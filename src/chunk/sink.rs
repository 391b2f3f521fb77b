//! Render/collision backends receiving finished chunk meshes

use std::collections::HashMap;

use glam::Vec3;

use super::ChunkCoord;
use crate::mesh::MeshData;

/// Consumer of chunk geometry.
///
/// Chunks hand their mesh over after every successful build and clear it on
/// teardown; they never read anything back.
pub trait MeshSink {
    /// Publish a chunk's mesh; `origin` is the chunk's world-space offset
    fn apply(&mut self, coord: ChunkCoord, origin: Vec3, mesh: &MeshData);

    /// Drop whatever was published for `coord`
    fn clear(&mut self, coord: ChunkCoord);
}

/// Sink that discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MeshSink for NullSink {
    fn apply(&mut self, _coord: ChunkCoord, _origin: Vec3, _mesh: &MeshData) {}

    fn clear(&mut self, _coord: ChunkCoord) {}
}

/// Sink keeping a copy of every published mesh, useful for offline generation
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    meshes: HashMap<ChunkCoord, (Vec3, MeshData)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coord: ChunkCoord) -> Option<&(Vec3, MeshData)> {
        self.meshes.get(&coord)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Total (vertices, triangles) across all published meshes
    pub fn totals(&self) -> (usize, usize) {
        self.meshes.values().fold((0, 0), |(v, t), (_, mesh)| {
            (v + mesh.vertex_count(), t + mesh.triangle_count())
        })
    }
}

impl MeshSink for MemorySink {
    fn apply(&mut self, coord: ChunkCoord, origin: Vec3, mesh: &MeshData) {
        let entry = self.meshes.entry(coord).or_insert_with(|| (origin, MeshData::new()));
        entry.0 = origin;
        entry.1.copy_from(mesh);
    }

    fn clear(&mut self, coord: ChunkCoord) {
        self.meshes.remove(&coord);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_tracks_meshes() {
        let mut mesh = MeshData::new();
        mesh.push_triangle([Vec3::ZERO, Vec3::X, Vec3::Z], [Vec3::Y; 3]);

        let mut sink = MemorySink::new();
        let coord = ChunkCoord::new(1, 0, -1);
        sink.apply(coord, Vec3::new(16.0, 0.0, -16.0), &mesh);
        sink.apply(coord, Vec3::new(16.0, 0.0, -16.0), &mesh);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.totals(), (3, 1));

        sink.clear(coord);
        assert!(sink.is_empty());
    }
}
