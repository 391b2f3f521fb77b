//! CPU surface queries against chunk meshes.
//!
//! Object placement and spawn-point resolution only ever ask one question:
//! "what is straight below this point?" [`ColliderSet`] answers it from the
//! triangles of every Ready chunk plus an optional sea-level plane.

use std::collections::HashMap;
use std::ops::BitOr;

use glam::Vec3;

use super::ChunkCoord;
use crate::math::{Aabb, Ray};
use crate::mesh::MeshData;

/// Collision layer filter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerMask(u32);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);
    pub const TERRAIN: LayerMask = LayerMask(1 << 0);
    pub const WATER: LayerMask = LayerMask(1 << 1);
    pub const ALL: LayerMask = LayerMask(u32::MAX);

    /// Whether any layer in `other` is enabled in this mask
    pub fn intersects(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for LayerMask {
    type Output = LayerMask;

    fn bitor(self, rhs: LayerMask) -> LayerMask {
        LayerMask(self.0 | rhs.0)
    }
}

/// Result of a downward surface query
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
    pub distance: f32,
    pub point: Vec3,
    /// Surface normal, facing the query origin
    pub normal: Vec3,
    pub layer: LayerMask,
}

/// Black-box "raycast straight down" service
pub trait SurfaceQuery {
    fn raycast_down(&self, origin: Vec3, max_distance: f32, layers: LayerMask) -> Option<SurfaceHit>;
}

/// World-space triangles of one chunk
#[derive(Clone, Debug, Default)]
pub struct MeshCollider {
    bounds: Aabb,
    triangles: Vec<[Vec3; 3]>,
}

impl MeshCollider {
    /// Build from chunk-local mesh data placed at `origin`. Returns `None`
    /// for an empty mesh.
    pub fn new(origin: Vec3, mesh: &MeshData) -> Option<Self> {
        let bounds = Aabb::from_points(mesh.vertices.iter().map(|v| *v + origin))?;
        let triangles = mesh
            .triangles
            .chunks_exact(3)
            .map(|t| {
                [
                    mesh.vertices[t[0] as usize] + origin,
                    mesh.vertices[t[1] as usize] + origin,
                    mesh.vertices[t[2] as usize] + origin,
                ]
            })
            .collect();
        Some(Self { bounds, triangles })
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Nearest hit within `max_distance`, as (distance, normal facing the ray)
    pub fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<(f32, Vec3)> {
        let (t_near, _) = ray.intersects_aabb(&self.bounds)?;
        if t_near > max_distance {
            return None;
        }

        let mut best: Option<(f32, Vec3)> = None;
        for [a, b, c] in &self.triangles {
            let Some(t) = ray.intersects_triangle(*a, *b, *c) else { continue };
            if t > max_distance || best.is_some_and(|(d, _)| d <= t) {
                continue;
            }
            let mut normal = (*b - *a).cross(*c - *a).normalize_or_zero();
            if normal.dot(ray.direction) > 0.0 {
                normal = -normal;
            }
            best = Some((t, normal));
        }
        best
    }
}

/// Colliders of every built chunk plus the optional water plane
#[derive(Clone, Debug, Default)]
pub struct ColliderSet {
    colliders: HashMap<ChunkCoord, MeshCollider>,
    water_level: Option<f32>,
}

impl ColliderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the collider for `coord`; an empty mesh removes it
    pub fn insert(&mut self, coord: ChunkCoord, origin: Vec3, mesh: &MeshData) {
        match MeshCollider::new(origin, mesh) {
            Some(collider) => {
                self.colliders.insert(coord, collider);
            }
            None => {
                self.colliders.remove(&coord);
            }
        }
    }

    pub fn remove(&mut self, coord: ChunkCoord) -> bool {
        self.colliders.remove(&coord).is_some()
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.colliders.contains_key(&coord)
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    /// Enable or disable the sea-level plane on the WATER layer
    pub fn set_water_level(&mut self, level: Option<f32>) {
        self.water_level = level;
    }

    pub fn water_level(&self) -> Option<f32> {
        self.water_level
    }

    /// Drop all colliders and the water plane
    pub fn clear(&mut self) {
        self.colliders.clear();
        self.water_level = None;
    }
}

impl SurfaceQuery for ColliderSet {
    fn raycast_down(&self, origin: Vec3, max_distance: f32, layers: LayerMask) -> Option<SurfaceHit> {
        let mut best: Option<SurfaceHit> = None;

        if layers.intersects(LayerMask::TERRAIN) {
            let ray = Ray::new(origin, Vec3::NEG_Y);
            for collider in self.colliders.values() {
                if !collider.bounds.contains_column(origin) {
                    continue;
                }
                if let Some((distance, normal)) = collider.raycast(&ray, max_distance) {
                    if best.is_none_or(|hit| distance < hit.distance) {
                        best = Some(SurfaceHit {
                            distance,
                            point: ray.at(distance),
                            normal,
                            layer: LayerMask::TERRAIN,
                        });
                    }
                }
            }
        }

        if let Some(level) = self.water_level.filter(|_| layers.intersects(LayerMask::WATER)) {
            let distance = origin.y - level;
            if (0.0..=max_distance).contains(&distance)
                && best.is_none_or(|hit| distance < hit.distance)
            {
                best = Some(SurfaceHit {
                    distance,
                    point: Vec3::new(origin.x, level, origin.z),
                    normal: Vec3::Y,
                    layer: LayerMask::WATER,
                });
            }
        }

        best
    }
}
