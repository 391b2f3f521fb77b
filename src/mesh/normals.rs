//! Smooth normal recalculation for unindexed triangle soup.
//!
//! Marching Cubes emits three fresh vertices per triangle, so neighbouring
//! triangles never share an index. Vertices are instead grouped by quantised
//! position and each one averages the face normals of every coincident
//! triangle within the smoothing angle.

use std::collections::HashMap;

use glam::Vec3;

/// Positions closer than `1 / POSITION_QUANTUM` on every axis are merged
pub const POSITION_QUANTUM: f32 = 100_000.0;

/// Default smoothing angle in degrees
pub const DEFAULT_SMOOTHING_ANGLE: f32 = 90.0;

type VertexKey = (i64, i64, i64);

fn vertex_key(p: Vec3) -> VertexKey {
    (
        (p.x * POSITION_QUANTUM).round() as i64,
        (p.y * POSITION_QUANTUM).round() as i64,
        (p.z * POSITION_QUANTUM).round() as i64,
    )
}

#[derive(Clone, Copy)]
struct Corner {
    vertex: usize,
    triangle: usize,
}

/// Face normal of a counter-clockwise triangle, zero when degenerate
pub fn face_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

/// Compute one normal per vertex.
///
/// For every vertex, sums the face normals of all triangles touching the same
/// quantised position whose normal is within `angle_degrees` of the vertex's
/// own face. Output is parallel to `vertices`; vertices not referenced by any
/// triangle get `Vec3::ZERO`.
pub fn recalculate_normals(vertices: &[Vec3], triangles: &[u32], angle_degrees: f32) -> Vec<Vec3> {
    let cos_threshold = angle_degrees.to_radians().cos();

    let face_normals: Vec<Vec3> = triangles
        .chunks_exact(3)
        .map(|t| {
            face_normal(
                vertices[t[0] as usize],
                vertices[t[1] as usize],
                vertices[t[2] as usize],
            )
        })
        .collect();

    // Insertion order is kept so summation order, and therefore the result,
    // is identical across runs.
    let mut order: Vec<VertexKey> = Vec::new();
    let mut groups: HashMap<VertexKey, Vec<Corner>> = HashMap::new();
    for (triangle, tri) in triangles.chunks_exact(3).enumerate() {
        for &vertex in tri {
            let vertex = vertex as usize;
            groups
                .entry(vertex_key(vertices[vertex]))
                .or_insert_with(|| {
                    order.push(vertex_key(vertices[vertex]));
                    Vec::new()
                })
                .push(Corner { vertex, triangle });
        }
    }

    let mut normals = vec![Vec3::ZERO; vertices.len()];
    for key in &order {
        let Some(group) = groups.get(key) else { continue };
        for lhs in group {
            let own = face_normals[lhs.triangle];
            let mut sum = Vec3::ZERO;
            for rhs in group {
                let other = face_normals[rhs.triangle];
                if lhs.vertex == rhs.vertex || own.dot(other).clamp(-1.0, 1.0) >= cos_threshold {
                    sum += other;
                }
            }
            normals[lhs.vertex] = sum.normalize_or_zero();
        }
    }
    normals
}
