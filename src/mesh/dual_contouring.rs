//! Uniform Dual Contouring.
//!
//! The chunk is swept one Y slice at a time. Each slice stores the corner
//! densities of a `(cs + 3)^2` grid padded by one voxel on every side, plus
//! the resolved vertices of the cube layer that ends on that slice. Three
//! slice buffers are recycled by `slice % 3`, so resident memory stays
//! quadratic in the chunk size.
//!
//! A cube vertex is placed by relaxing a mass point towards the tangent
//! planes of its edge crossings (Hermite data). Quads are then emitted across
//! every crossed edge owned by the chunk, connecting the four cubes sharing
//! that edge.

use std::sync::Arc;

use glam::Vec3;

use super::builder::{IsosurfaceAlgorithm, MeshBuilder};
use super::tables::{EDGE_CONNECTION, EDGE_TABLE, VERTEX_OFFSET};
use super::MeshData;
use crate::density::Density;

/// Densities closer to zero than this count as on the surface
pub const SURFACE_EPSILON: f32 = 1e-3;

/// Bisection stops once the bracket is shorter than this
pub const BRACKET_EPSILON: f32 = 1e-3;

/// Upper bound on bisection steps for one edge
pub const MAX_BISECTION_STEPS: usize = 32;

/// Mass-point relaxation iterations
pub const RELAX_ITERATIONS: usize = 50;

/// Relaxation stops once the squared restoring force drops below this
pub const RELAX_TOLERANCE: f32 = 1e-6;

/// Step for central-difference gradients
pub const GRADIENT_STEP: f32 = 1.0;

/// Resolved vertex of one cube
#[derive(Clone, Copy, Debug, Default)]
struct CubeVertex {
    case: u8,
    edges: u16,
    position: Vec3,
    normal: Vec3,
}

/// One Y slice of corner samples plus the cube layer ending on it
#[derive(Clone, Debug, Default)]
struct Slice {
    densities: Vec<f32>,
    cubes: Vec<CubeVertex>,
}

/// Dual Contouring over one chunk
#[derive(Clone, Debug)]
pub struct DualContouring {
    density: Arc<Density>,
    offset: Vec3,
    chunk_size: u32,
}

impl DualContouring {
    /// `offset` is the chunk's world-space origin
    pub fn new(density: Arc<Density>, offset: Vec3, chunk_size: u32) -> Self {
        Self {
            density,
            offset,
            chunk_size,
        }
    }

    /// Points per slice row
    fn row(&self) -> usize {
        self.chunk_size as usize + 3
    }

    /// Chunk-local position of slice point `(i, j, k)`; the padding puts
    /// index 0 at local -1
    fn local(i: usize, j: usize, k: usize) -> Vec3 {
        Vec3::new(i as f32 - 1.0, j as f32 - 1.0, k as f32 - 1.0)
    }

    fn sample_slice(&self, j: usize, densities: &mut [f32]) {
        let row = self.row();
        for k in 0..row {
            for i in 0..row {
                densities[i + k * row] = self.density.evaluate(self.offset + Self::local(i, j, k));
            }
        }
    }

    /// Resolve every cube between slice `j - 1` (`lower`) and slice `j` (`upper`)
    fn resolve_layer(&self, j: usize, lower: &[f32], upper: &[f32], cubes: &mut [CubeVertex]) {
        let row = self.row();
        let cubes_per_row = row - 1;
        let mut points = Vec::with_capacity(12);
        let mut gradients = Vec::with_capacity(12);

        for k in 0..cubes_per_row {
            for i in 0..cubes_per_row {
                let mut corner_density = [0f32; 8];
                let mut corner_position = [Vec3::ZERO; 8];
                let mut case = 0u8;
                for (corner, [dx, dy, dz]) in VERTEX_OFFSET.iter().enumerate() {
                    let (ci, ck) = (i + *dx as usize, k + *dz as usize);
                    let slice = if *dy == 0 { lower } else { upper };
                    let value = slice[ci + ck * row];
                    corner_density[corner] = value;
                    corner_position[corner] =
                        self.offset + Self::local(ci, j - 1 + *dy as usize, ck);
                    if value <= 0.0 {
                        case |= 1 << corner;
                    }
                }

                let edges = EDGE_TABLE[case as usize];
                let cube = &mut cubes[i + k * cubes_per_row];
                *cube = CubeVertex { case, edges, ..Default::default() };
                if edges == 0 {
                    continue;
                }

                points.clear();
                gradients.clear();
                for (edge, [a, b]) in EDGE_CONNECTION.iter().enumerate() {
                    if edges & (1 << edge) == 0 {
                        continue;
                    }
                    let point = self.find_crossing(
                        corner_position[*a],
                        corner_density[*a],
                        corner_position[*b],
                        corner_density[*b],
                    );
                    points.push(point);
                    gradients.push(self.density.gradient(point, GRADIENT_STEP));
                }

                let world = relax_vertex(&points, &gradients);
                cube.position = world - self.offset;
                cube.normal = self.density.gradient(world, GRADIENT_STEP);
            }
        }
    }

    /// Locate the zero crossing on a sign-changing edge by bisection
    fn find_crossing(&self, pa: Vec3, da: f32, pb: Vec3, db: f32) -> Vec3 {
        if da.abs() < SURFACE_EPSILON {
            return pa;
        }
        if db.abs() < SURFACE_EPSILON {
            return pb;
        }

        let (mut inside, mut outside) = if da <= 0.0 { (pa, pb) } else { (pb, pa) };
        let mut mid = (inside + outside) * 0.5;
        for _ in 0..MAX_BISECTION_STEPS {
            mid = (inside + outside) * 0.5;
            let d = self.density.evaluate(mid);
            if d.abs() < SURFACE_EPSILON || inside.distance(outside) < BRACKET_EPSILON {
                break;
            }
            if d < 0.0 {
                inside = mid;
            } else {
                outside = mid;
            }
        }
        mid
    }

    /// Emit quads for crossed edges of cubes in `layer`, looking one layer up
    /// through `above`
    fn emit_quads(&self, layer: &[CubeVertex], above: &[CubeVertex], mesh: &mut MeshData) {
        let cs = self.chunk_size as usize;
        let stride = self.row() - 1;
        let at = |cubes: &[CubeVertex], i: usize, k: usize| cubes[i + k * stride];

        for k in 1..=cs {
            for i in 1..=cs {
                let v0 = at(layer, i, k);
                if v0.edges == 0 {
                    continue;
                }
                // z edge through corners 2-6
                if v0.edges & (1 << 10) != 0 {
                    let quad = [v0, at(layer, i + 1, k), at(above, i + 1, k), at(above, i, k)];
                    push_quad(mesh, quad, v0.case & (1 << 6) != 0);
                }
                // x edge through corners 6-7
                if v0.edges & (1 << 6) != 0 {
                    let quad = [v0, at(layer, i, k + 1), at(above, i, k + 1), at(above, i, k)];
                    push_quad(mesh, quad, v0.case & (1 << 7) != 0);
                }
                // y edge through corners 5-6
                if v0.edges & (1 << 5) != 0 {
                    let quad = [v0, at(layer, i + 1, k), at(layer, i + 1, k + 1), at(layer, i, k + 1)];
                    push_quad(mesh, quad, v0.case & (1 << 5) != 0);
                }
            }
        }
    }
}

fn push_quad(mesh: &mut MeshData, [v0, v1, v2, v3]: [CubeVertex; 4], flip: bool) {
    let triangles = if flip {
        [[v0, v2, v1], [v0, v3, v2]]
    } else {
        [[v0, v1, v2], [v0, v2, v3]]
    };
    for tri in triangles {
        mesh.push_triangle(tri.map(|v| v.position), tri.map(|v| v.normal));
    }
}

/// Resolve a cube vertex from Hermite data.
///
/// Starts at the centroid of the crossings and pulls it towards each
/// tangent plane with a damped step, converging on their common
/// intersection. Returns `Vec3::ZERO` for empty input.
pub fn relax_vertex(points: &[Vec3], normals: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::ZERO;
    }
    let count = points.len() as f32;
    let mut center = points.iter().copied().sum::<Vec3>() / count;

    for iteration in 0..RELAX_ITERATIONS {
        let mut force = Vec3::ZERO;
        for (point, normal) in points.iter().zip(normals) {
            force += *normal * -normal.dot(center - *point);
        }
        let damping = 1.0 - iteration as f32 / RELAX_ITERATIONS as f32;
        center += force * damping / count;
        if force.length_squared() < RELAX_TOLERANCE {
            break;
        }
    }
    center
}

impl MeshBuilder for DualContouring {
    fn generate(&self) -> MeshData {
        let row = self.row();
        let cubes_per_row = row - 1;
        let mut slices: [Slice; 3] = std::array::from_fn(|_| Slice {
            densities: vec![0.0; row * row],
            cubes: vec![CubeVertex::default(); cubes_per_row * cubes_per_row],
        });
        let mut mesh = MeshData::new();

        for j in 0..row {
            let current = j % 3;
            {
                let Slice { densities, .. } = &mut slices[current];
                self.sample_slice(j, densities);
            }
            if j == 0 {
                continue;
            }

            let previous = (j - 1) % 3;
            let [a, b, c] = &mut slices;
            let (lower, upper) = match (previous, current) {
                (0, 1) => (&*a, b),
                (1, 2) => (&*b, c),
                _ => (&*c, a),
            };
            self.resolve_layer(j, &lower.densities, &upper.densities, &mut upper.cubes);

            if j >= 3 {
                self.emit_quads(&slices[previous].cubes, &slices[current].cubes, &mut mesh);
            }
        }
        mesh
    }

    fn algorithm(&self) -> IsosurfaceAlgorithm {
        IsosurfaceAlgorithm::DualContouring
    }
}
