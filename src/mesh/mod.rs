//! Isosurface extraction
//!
//! Converts a sampled [`Density`](crate::density::Density) field into a
//! triangle mesh approximating its zero level set. Two extractors share the
//! lookup tables in [`tables`]:
//!
//! - [`MarchingCubes`]: per-cube table lookup with linear edge interpolation
//! - [`DualContouring`]: one relaxed vertex per cube, quads across crossed edges
//!
//! Both produce chunk-local [`MeshData`] through the [`MeshBuilder`] trait.

pub mod tables;
pub mod normals;
pub mod marching_cubes;
pub mod dual_contouring;
pub mod builder;

pub use builder::{mesh_builder, IsosurfaceAlgorithm, MeshBuilder};
pub use dual_contouring::{relax_vertex, DualContouring};
pub use marching_cubes::MarchingCubes;
pub use normals::recalculate_normals;

use glam::Vec3;

/// Extracted chunk geometry.
///
/// Vertices are in chunk-local space; `normals` runs parallel to `vertices`
/// and `triangles` indexes both with stride 3.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<u32>,
    pub normals: Vec<Vec3>,
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    /// An airless (or fully solid) chunk has no vertices
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }

    /// Whether every triangle index refers to an existing vertex and the
    /// index list is a whole number of triangles
    pub fn indices_in_range(&self) -> bool {
        self.triangles.len() % 3 == 0
            && self.normals.len() == self.vertices.len()
            && self
                .triangles
                .iter()
                .all(|&i| (i as usize) < self.vertices.len())
    }

    /// Append an unshared triangle
    pub(crate) fn push_triangle(&mut self, corners: [Vec3; 3], normals: [Vec3; 3]) {
        for (position, normal) in corners.into_iter().zip(normals) {
            self.triangles.push(self.vertices.len() as u32);
            self.vertices.push(position);
            self.normals.push(normal);
        }
    }

    /// Empty all buffers while keeping their allocations
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.triangles.clear();
        self.normals.clear();
    }

    /// Replace contents with `other`, reusing this mesh's allocations
    pub fn copy_from(&mut self, other: &MeshData) {
        self.clear();
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles.extend_from_slice(&other.triangles);
        self.normals.extend_from_slice(&other.normals);
    }

    /// Axis-aligned extent of the vertices, if any
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.vertices.first()?;
        Some(
            self.vertices
                .iter()
                .fold((first, first), |(lo, hi), v| (lo.min(*v), hi.max(*v))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_triangle_and_ranges() {
        let mut mesh = MeshData::new();
        assert!(mesh.is_empty());
        assert!(mesh.bounds().is_none());

        mesh.push_triangle([Vec3::ZERO, Vec3::X, Vec3::Z], [Vec3::Y; 3]);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.triangles, vec![0, 1, 2]);
        assert!(mesh.indices_in_range());
        assert_eq!(mesh.bounds(), Some((Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0))));

        mesh.triangles.push(7);
        assert!(!mesh.indices_in_range());
    }

    #[test]
    fn test_copy_from_reuses_buffers() {
        let mut source = MeshData::new();
        source.push_triangle([Vec3::ZERO, Vec3::X, Vec3::Y], [Vec3::Z; 3]);

        let mut target = MeshData::new();
        target.push_triangle([Vec3::ONE; 3], [Vec3::X; 3]);
        target.push_triangle([Vec3::ONE; 3], [Vec3::X; 3]);
        let capacity = target.vertices.capacity();

        target.copy_from(&source);
        assert_eq!(target, source);
        assert_eq!(target.vertices.capacity(), capacity);
    }
}
