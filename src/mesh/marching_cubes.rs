//! Marching Cubes extraction for one chunk

use std::sync::Arc;

use glam::Vec3;

use super::builder::{IsosurfaceAlgorithm, MeshBuilder};
use super::normals::{recalculate_normals, DEFAULT_SMOOTHING_ANGLE};
use super::tables::{EDGE_CONNECTION, EDGE_DIRECTION, EDGE_TABLE, TRI_END, TRI_TABLE, VERTEX_OFFSET, WINDING_ORDER};
use super::MeshData;
use crate::density::Density;

/// Below this corner delta an edge crossing is placed at the midpoint
pub const INTERPOLATION_EPSILON: f32 = 1e-4;

/// Marching Cubes over the `[0, chunk_size]^3` lattice of one chunk
#[derive(Clone, Debug)]
pub struct MarchingCubes {
    density: Arc<Density>,
    offset: Vec3,
    chunk_size: u32,
    smoothing_angle: f32,
}

impl MarchingCubes {
    /// `offset` is the chunk's world-space origin
    pub fn new(density: Arc<Density>, offset: Vec3, chunk_size: u32) -> Self {
        Self {
            density,
            offset,
            chunk_size,
            smoothing_angle: DEFAULT_SMOOTHING_ANGLE,
        }
    }

    pub fn with_smoothing_angle(mut self, degrees: f32) -> Self {
        self.smoothing_angle = degrees;
        self
    }

    /// Sample every lattice corner once, x fastest then y then z
    fn sample_lattice(&self) -> Vec<f32> {
        let n = self.chunk_size as usize + 1;
        let mut samples = Vec::with_capacity(n * n * n);
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    let local = Vec3::new(x as f32, y as f32, z as f32);
                    samples.push(self.density.evaluate(self.offset + local));
                }
            }
        }
        samples
    }

    /// Triangulate without computing normals
    pub fn march(&self) -> MeshData {
        let cs = self.chunk_size as usize;
        let n = cs + 1;
        let samples = self.sample_lattice();
        let index = |x: usize, y: usize, z: usize| x + y * n + z * n * n;

        let mut mesh = MeshData::new();
        let mut cube = [0f32; 8];
        let mut edge_vertex = [Vec3::ZERO; 12];

        for z in 0..cs {
            for y in 0..cs {
                for x in 0..cs {
                    let mut case = 0usize;
                    for (corner, [dx, dy, dz]) in VERTEX_OFFSET.iter().enumerate() {
                        let value = samples[index(x + *dx as usize, y + *dy as usize, z + *dz as usize)];
                        cube[corner] = value;
                        if value <= 0.0 {
                            case |= 1 << corner;
                        }
                    }

                    let edges = EDGE_TABLE[case];
                    if edges == 0 {
                        continue;
                    }

                    let origin = Vec3::new(x as f32, y as f32, z as f32);
                    for edge in 0..12 {
                        if edges & (1 << edge) == 0 {
                            continue;
                        }
                        let [a, b] = EDGE_CONNECTION[edge];
                        let t = crossing_offset(cube[a], cube[b]);
                        let [ox, oy, oz] = VERTEX_OFFSET[a];
                        edge_vertex[edge] = origin
                            + Vec3::new(ox as f32, oy as f32, oz as f32)
                            + Vec3::from(EDGE_DIRECTION[edge]) * t;
                    }

                    let row = &TRI_TABLE[case];
                    for tri in row.chunks_exact(3) {
                        if tri[0] == TRI_END {
                            break;
                        }
                        for &k in &WINDING_ORDER {
                            mesh.triangles.push(mesh.vertices.len() as u32);
                            mesh.vertices.push(edge_vertex[tri[k] as usize]);
                        }
                    }
                }
            }
        }
        mesh
    }
}

/// Parametric position of the zero crossing between two corner samples
#[inline]
pub fn crossing_offset(v1: f32, v2: f32) -> f32 {
    let delta = v2 - v1;
    if delta.abs() < INTERPOLATION_EPSILON {
        0.5
    } else {
        -v1 / delta
    }
}

impl MeshBuilder for MarchingCubes {
    fn generate(&self) -> MeshData {
        let mut mesh = self.march();
        mesh.normals = recalculate_normals(&mesh.vertices, &mesh.triangles, self.smoothing_angle);
        mesh
    }

    fn algorithm(&self) -> IsosurfaceAlgorithm {
        IsosurfaceAlgorithm::MarchingCubes
    }
}
