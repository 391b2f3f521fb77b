//! Scalar density fields sampled by the isosurface extractors.
//!
//! Sign convention: negative is solid, positive is air, and the zero level
//! set is the terrain surface. Every field here is a pure function of the
//! sample position and its construction parameters, so a single instance is
//! shared read-only (behind an `Arc`) by every chunk build.

pub mod noise;

pub use self::noise::{NoiseSettings, NoiseSource, NoiseType};

use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::Error;

/// Multiplier on the vertical term below the floor height. Flattens deep
/// terrain so the world bottom does not produce stray surfaces.
pub const BELOW_FLOOR_STEEPNESS: f32 = 1.5;

/// How the terrain noise is mapped into density
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityMode {
    /// 2D noise displaces a ground plane; no overhangs
    #[default]
    Heightmap,
    /// 3D noise perturbs the ground plane; allows overhangs and caves
    Noise3d,
}

impl FromStr for DensityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "heightmap" => Ok(Self::Heightmap),
            "noise3d" | "noise" | "3d" => Ok(Self::Noise3d),
            other => Err(Error::UnknownSelector(format!("density mode '{other}'"))),
        }
    }
}

/// Boolean composition of two density fields
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[default]
    Union,
    Difference,
    Intersection,
}

impl Operation {
    /// Combine two density samples
    #[inline]
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Operation::Union => a.min(b),
            Operation::Intersection => a.max(b),
            // inside a, outside b
            Operation::Difference => a.max(-b),
        }
    }
}

/// Noise-driven terrain density
#[derive(Clone, Debug)]
pub struct TerrainDensity {
    noise: NoiseSource,
    amplitude: f32,
    scale: f64,
    mode: DensityMode,
    floor: f32,
}

impl TerrainDensity {
    /// Create a terrain density.
    ///
    /// `scale` converts world coordinates into noise coordinates; terrain
    /// generation uses `1 / chunk_size` so noise features are measured in
    /// chunks.
    pub fn new(noise: NoiseSource, amplitude: f32, scale: f64, mode: DensityMode) -> Self {
        Self {
            noise,
            amplitude,
            scale,
            mode,
            floor: 0.0,
        }
    }

    /// Set the height below which the vertical gradient is steepened
    pub fn with_floor(mut self, floor: f32) -> Self {
        self.floor = floor;
        self
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    pub fn mode(&self) -> DensityMode {
        self.mode
    }

    /// Vertical term: identity above the floor, steeper below it
    #[inline]
    pub fn shaped_height(&self, y: f32) -> f32 {
        if y < self.floor {
            self.floor + (y - self.floor) * BELOW_FLOOR_STEEPNESS
        } else {
            y
        }
    }

    /// Evaluate density at a world position
    pub fn evaluate(&self, p: Vec3) -> f32 {
        let nx = p.x as f64 * self.scale;
        let nz = p.z as f64 * self.scale;
        let noise = match self.mode {
            DensityMode::Heightmap => self.noise.sample(nx, 0.0, nz),
            DensityMode::Noise3d => self.noise.sample(nx, p.y as f64 * self.scale, nz),
        };
        self.shaped_height(p.y) - noise * self.amplitude
    }
}

/// A composable density field
#[derive(Clone, Debug)]
pub enum Density {
    Terrain(TerrainDensity),
    /// Half-space; `normal` points towards air
    Plane { point: Vec3, normal: Vec3 },
    Sphere { center: Vec3, radius: f32 },
    Constant(f32),
    Combine {
        op: Operation,
        lhs: Box<Density>,
        rhs: Box<Density>,
    },
}

impl Density {
    /// Evaluate density at a world position
    pub fn evaluate(&self, p: Vec3) -> f32 {
        match self {
            Density::Terrain(terrain) => terrain.evaluate(p),
            Density::Plane { point, normal } => (p - *point).dot(*normal),
            Density::Sphere { center, radius } => (p - *center).length() - radius,
            Density::Constant(value) => *value,
            Density::Combine { op, lhs, rhs } => op.apply(lhs.evaluate(p), rhs.evaluate(p)),
        }
    }

    /// Normalised central-difference gradient, pointing towards increasing
    /// density (out of the solid). Zero where the field is flat.
    pub fn gradient(&self, p: Vec3, step: f32) -> Vec3 {
        let dx = Vec3::new(step, 0.0, 0.0);
        let dy = Vec3::new(0.0, step, 0.0);
        let dz = Vec3::new(0.0, 0.0, step);
        Vec3::new(
            self.evaluate(p + dx) - self.evaluate(p - dx),
            self.evaluate(p + dy) - self.evaluate(p - dy),
            self.evaluate(p + dz) - self.evaluate(p - dz),
        )
        .normalize_or_zero()
    }

    /// Combine with another field
    pub fn combine(self, op: Operation, other: Density) -> Density {
        Density::Combine {
            op,
            lhs: Box::new(self),
            rhs: Box::new(other),
        }
    }

    pub fn union(self, other: Density) -> Density {
        self.combine(Operation::Union, other)
    }

    pub fn difference(self, other: Density) -> Density {
        self.combine(Operation::Difference, other)
    }

    pub fn intersection(self, other: Density) -> Density {
        self.combine(Operation::Intersection, other)
    }
}

impl From<TerrainDensity> for Density {
    fn from(terrain: TerrainDensity) -> Self {
        Density::Terrain(terrain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terrain(mode: DensityMode) -> TerrainDensity {
        let noise = NoiseSource::new(&NoiseSettings { seed: 42, ..Default::default() });
        TerrainDensity::new(noise, 10.0, 1.0 / 16.0, mode)
    }

    #[test]
    fn test_heightmap_sign_convention() {
        let t = terrain(DensityMode::Heightmap);
        // amplitude 10 bounds the surface to [-10/1.5, 10]
        assert!(t.evaluate(Vec3::new(3.0, 11.0, 5.0)) > 0.0);
        assert!(t.evaluate(Vec3::new(3.0, -7.0, 5.0)) < 0.0);
    }

    #[test]
    fn test_heightmap_ignores_noise_y() {
        let t = terrain(DensityMode::Heightmap);
        let a = t.evaluate(Vec3::new(4.5, 2.0, 9.5));
        let b = t.evaluate(Vec3::new(4.5, 3.0, 9.5));
        assert!((b - a - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_floor_steepens_below() {
        let t = terrain(DensityMode::Heightmap);
        assert_eq!(t.shaped_height(4.0), 4.0);
        assert_eq!(t.shaped_height(-4.0), -6.0);

        let raised = terrain(DensityMode::Heightmap).with_floor(2.0);
        assert_eq!(raised.shaped_height(0.0), -1.0);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        for mode in [DensityMode::Heightmap, DensityMode::Noise3d] {
            let a = Density::from(terrain(mode));
            let b = Density::from(terrain(mode));
            for i in 0..64 {
                let p = Vec3::new(i as f32 * 0.7, i as f32 * 0.3 - 8.0, i as f32 * -1.1);
                assert_eq!(a.evaluate(p).to_bits(), b.evaluate(p).to_bits());
            }
        }
    }

    #[test]
    fn test_operations() {
        assert_eq!(Operation::Union.apply(1.0, -2.0), -2.0);
        assert_eq!(Operation::Intersection.apply(1.0, -2.0), 1.0);
        assert_eq!(Operation::Difference.apply(-1.0, -2.0), 2.0);
        assert_eq!(Operation::Difference.apply(-1.0, 3.0), -1.0);
    }

    #[test]
    fn test_sphere_carved_from_ground() {
        let ground = Density::Plane { point: Vec3::ZERO, normal: Vec3::Y };
        let cave = Density::Sphere { center: Vec3::new(0.0, -5.0, 0.0), radius: 2.0 };
        let field = ground.difference(cave);

        assert!(field.evaluate(Vec3::new(0.0, -5.0, 0.0)) > 0.0);
        assert!(field.evaluate(Vec3::new(10.0, -5.0, 0.0)) < 0.0);
        assert!(field.evaluate(Vec3::new(0.0, 1.0, 0.0)) > 0.0);
    }

    #[test]
    fn test_gradient_of_plane() {
        let plane = Density::Plane {
            point: Vec3::new(0.0, 3.0, 0.0),
            normal: Vec3::new(1.0, 1.0, 0.0).normalize(),
        };
        let g = plane.gradient(Vec3::new(2.0, 1.0, 7.0), 1.0);
        assert!((g - Vec3::new(1.0, 1.0, 0.0).normalize()).length() < 1e-5);

        assert_eq!(Density::Constant(1.0).gradient(Vec3::ZERO, 1.0), Vec3::ZERO);
    }

    #[test]
    fn test_density_mode_from_str() {
        assert_eq!("heightmap".parse::<DensityMode>().unwrap(), DensityMode::Heightmap);
        assert_eq!("noise3d".parse::<DensityMode>().unwrap(), DensityMode::Noise3d);
        assert!("voronoi".parse::<DensityMode>().is_err());
    }
}
