//! Noise-driven object placement on finished chunks

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::chunk::surface::{LayerMask, SurfaceQuery};
use crate::core::{Error, Result};
use crate::density::{NoiseSettings, NoiseSource};
use crate::streaming::pool::{MultiObjectPool, TypedHandle};

/// Lattice points always sample zero noise, so columns are sampled off-grid
pub const NOISE_POSITION_OFFSET: f32 = 0.5;

/// Objects pre-allocated per registered type
pub const DEFAULT_TYPE_POOL_SIZE: usize = 300;

/// One placeable object type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectResource {
    /// Prefab identifier understood by whoever instantiates the objects.
    /// Entries with an empty name are dropped.
    pub name: String,
    /// Allowed surface height as fractions of the terrain max height
    pub height_range: [f32; 2],
    /// Allowed surface slope in degrees
    pub slope_range: [f32; 2],
}

impl Default for ObjectResource {
    fn default() -> Self {
        Self {
            name: String::new(),
            height_range: [0.0, 1.0],
            slope_range: [0.0, 90.0],
        }
    }
}

impl ObjectResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_height_range(mut self, min: f32, max: f32) -> Self {
        self.height_range = [min, max];
        self
    }

    pub fn with_slope_range(mut self, min: f32, max: f32) -> Self {
        self.slope_range = [min, max];
        self
    }
}

/// Placement rules for one family of objects (trees, props, ...)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectSpawnSettings {
    pub resources: Vec<ObjectResource>,
    /// Sub-grid spacing in world units
    pub min_distance: u32,
    /// Fraction of candidate columns that may hold an object
    pub spawn_probability: f32,
    pub noise: NoiseSettings,
    /// Objects pre-allocated per type
    pub pool_size: usize,
    // Inherited from the terrain settings at generation time
    pub chunk_size: u32,
    pub max_height: f32,
    pub view_distance: f32,
    pub sea_level: f32,
}

impl Default for ObjectSpawnSettings {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            min_distance: 10,
            spawn_probability: 0.5,
            noise: NoiseSettings::default(),
            pool_size: DEFAULT_TYPE_POOL_SIZE,
            chunk_size: 16,
            max_height: 100.0,
            view_distance: 64.0,
            sea_level: 0.0,
        }
    }
}

impl ObjectSpawnSettings {
    /// Check the settings for values that would make placement meaningless
    pub fn validate(&self) -> Result<()> {
        if self.min_distance == 0 {
            return Err(Error::Config("object min_distance must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.spawn_probability) {
            return Err(Error::Config(format!(
                "spawn probability {} outside [0, 1]",
                self.spawn_probability
            )));
        }
        for resource in &self.resources {
            let [h0, h1] = resource.height_range;
            let [s0, s1] = resource.slope_range;
            if h0 > h1 || s0 > s1 {
                return Err(Error::Config(format!(
                    "object '{}' has an inverted height or slope range",
                    resource.name
                )));
            }
        }
        Ok(())
    }
}

/// Pooled instance state of a placed object
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ObjectInstance {
    pub position: Vec3,
    /// Rotation about +Y in degrees
    pub yaw: f32,
    pub active: bool,
}

/// Record of one placed object, owned by the chunk that spawned it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacedObject {
    pub handle: TypedHandle,
    pub position: Vec3,
    /// Normalised placement noise that selected this object
    pub noise: f32,
    pub yaw: f32,
}

impl PlacedObject {
    /// Index of the object's resource
    pub fn type_id(&self) -> u32 {
        self.handle.type_id
    }
}

/// Places objects of one settings family on chunk surfaces
#[derive(Debug)]
pub struct ObjectSpawner {
    settings: ObjectSpawnSettings,
    noise: NoiseSource,
    pool: MultiObjectPool<ObjectInstance>,
}

impl ObjectSpawner {
    /// Validate settings, drop unnamed resources and pre-size the pools.
    pub fn new(mut settings: ObjectSpawnSettings) -> Result<Self> {
        settings.validate()?;
        let before = settings.resources.len();
        settings.resources.retain(|r| !r.name.is_empty());
        if settings.resources.len() < before {
            log::warn!(
                "Dropped {} object resources without a name",
                before - settings.resources.len()
            );
        }

        let mut pool = MultiObjectPool::new();
        for type_id in 0..settings.resources.len() as u32 {
            pool.create_pool(type_id, settings.pool_size);
        }
        let noise = NoiseSource::new(&settings.noise);

        Ok(Self {
            settings,
            noise,
            pool,
        })
    }

    pub fn settings(&self) -> &ObjectSpawnSettings {
        &self.settings
    }

    pub fn resources(&self) -> &[ObjectResource] {
        &self.settings.resources
    }

    /// Objects currently placed across all chunks
    pub fn in_use(&self) -> usize {
        self.pool.total_in_use()
    }

    pub fn instance(&self, placed: &PlacedObject) -> Option<&ObjectInstance> {
        self.pool.get_ref(placed.handle)
    }

    /// Normalised placement noise for a world column, in `[0, 1]`
    pub fn placement_noise(&self, x: f32, z: f32) -> f32 {
        let n = self.noise.sample(
            (x + NOISE_POSITION_OFFSET) as f64,
            0.0,
            (z + NOISE_POSITION_OFFSET) as f64,
        );
        (n + 1.0) / 2.0
    }

    /// Map a normalised noise value in `[0, spawn_probability]` to a resource
    /// index. `[0, spawn_probability]` is split into equal bins, one per
    /// resource in registration order.
    pub fn select_type(&self, noise: f32) -> Option<usize> {
        let count = self.settings.resources.len();
        if count == 0 {
            return None;
        }
        let bin = self.settings.spawn_probability / count as f32;
        let (mut lo, mut hi) = (0, count);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if noise < bin * (mid + 1) as f32 {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Some(lo.min(count - 1))
    }

    /// Walk the chunk's placement sub-grid and place every accepted object.
    ///
    /// `chunk_origin` is the chunk's minimum corner. Columns within one
    /// chunk size of `observer` are skipped.
    pub fn spawn_objects(
        &mut self,
        chunk_origin: Vec3,
        observer: Vec3,
        surface: &dyn SurfaceQuery,
    ) -> Vec<PlacedObject> {
        let mut placed = Vec::new();
        if self.settings.resources.is_empty() {
            return placed;
        }

        let chunk_size = self.settings.chunk_size as i32;
        let step = self.settings.min_distance as i32;
        // first column on the world-wide placement grid inside this chunk
        let edge_x = (step - (chunk_origin.x as i32).rem_euclid(step)) % step;
        let edge_z = (step - (chunk_origin.z as i32).rem_euclid(step)) % step;

        let mut x = edge_x;
        while x < chunk_size {
            let mut z = edge_z;
            while z < chunk_size {
                let candidate = Vec3::new(
                    chunk_origin.x + x as f32,
                    chunk_origin.y + chunk_size as f32,
                    chunk_origin.z + z as f32,
                );
                if candidate.distance(observer) > chunk_size as f32 {
                    if let Some(object) = self.try_place(candidate, surface) {
                        placed.push(object);
                    }
                }
                z += step;
            }
            x += step;
        }
        placed
    }

    fn try_place(&mut self, candidate: Vec3, surface: &dyn SurfaceQuery) -> Option<PlacedObject> {
        let noise = self.placement_noise(candidate.x, candidate.z);
        if noise > self.settings.spawn_probability {
            return None;
        }
        let type_index = self.select_type(noise)?;
        let resource = &self.settings.resources[type_index];

        let max_distance = self.settings.chunk_size as f32 - 1.0;
        let hit = surface.raycast_down(candidate, max_distance, LayerMask::TERRAIN)?;

        let slope = hit.normal.angle_between(Vec3::Y).to_degrees();
        let [min_slope, max_slope] = resource.slope_range;
        if slope < min_slope || slope > max_slope {
            return None;
        }

        let height = candidate.y - hit.distance;
        let max_height = self.settings.max_height;
        let [min_fraction, max_fraction] = resource.height_range;
        if height < min_fraction * max_height || height > max_fraction * max_height {
            return None;
        }
        // no objects under water
        if height <= self.settings.sea_level {
            return None;
        }

        let position = Vec3::new(candidate.x, height, candidate.z);
        let yaw = ChaCha8Rng::seed_from_u64((noise * 100.0) as u64).random_range(0..360) as f32;

        let handle = match self.pool.get(type_index as u32) {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("Object placement skipped: {e}");
                return None;
            }
        };
        if let Some(instance) = self.pool.get_mut(handle) {
            *instance = ObjectInstance {
                position,
                yaw,
                active: true,
            };
        }

        Some(PlacedObject {
            handle,
            position,
            noise,
            yaw,
        })
    }

    /// Return placed objects to the pool, leaving `objects` empty
    pub fn destroy_objects(&mut self, objects: &mut Vec<PlacedObject>) {
        for object in objects.drain(..) {
            if let Some(instance) = self.pool.get_mut(object.handle) {
                instance.active = false;
            }
            if let Err(e) = self.pool.reuse(object.handle) {
                log::warn!("Failed to release placed object: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::surface::SurfaceHit;

    /// Infinite flat ground at a fixed height
    struct FlatGround {
        height: f32,
        normal: Vec3,
    }

    impl SurfaceQuery for FlatGround {
        fn raycast_down(&self, origin: Vec3, max_distance: f32, layers: LayerMask) -> Option<SurfaceHit> {
            let distance = origin.y - self.height;
            if !layers.intersects(LayerMask::TERRAIN) || !(0.0..=max_distance).contains(&distance) {
                return None;
            }
            Some(SurfaceHit {
                distance,
                point: Vec3::new(origin.x, self.height, origin.z),
                normal: self.normal,
                layer: LayerMask::TERRAIN,
            })
        }
    }

    fn settings(resources: Vec<ObjectResource>) -> ObjectSpawnSettings {
        ObjectSpawnSettings {
            resources,
            min_distance: 2,
            spawn_probability: 1.0,
            pool_size: 4,
            chunk_size: 16,
            max_height: 100.0,
            sea_level: -50.0,
            ..Default::default()
        }
    }

    const FAR: Vec3 = Vec3::new(1000.0, 0.0, 1000.0);

    #[test]
    fn test_select_type_bins() {
        let resources = vec![ObjectResource::new("a"), ObjectResource::new("b"), ObjectResource::new("c")];
        let spawner = ObjectSpawner::new(ObjectSpawnSettings {
            spawn_probability: 0.6,
            ..settings(resources)
        })
        .unwrap();

        assert_eq!(spawner.select_type(0.0), Some(0));
        assert_eq!(spawner.select_type(0.19), Some(0));
        assert_eq!(spawner.select_type(0.21), Some(1));
        assert_eq!(spawner.select_type(0.59), Some(2));
        assert_eq!(spawner.select_type(0.6), Some(2));
    }

    #[test]
    fn test_unnamed_resources_dropped() {
        let spawner = ObjectSpawner::new(settings(vec![
            ObjectResource::new("tree"),
            ObjectResource::default(),
        ]))
        .unwrap();
        assert_eq!(spawner.resources().len(), 1);

        let empty = ObjectSpawner::new(settings(vec![])).unwrap();
        assert_eq!(empty.select_type(0.1), None);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut bad = settings(vec![ObjectResource::new("a")]);
        bad.spawn_probability = 1.5;
        assert!(matches!(ObjectSpawner::new(bad), Err(Error::Config(_))));

        let inverted = settings(vec![ObjectResource::new("a").with_slope_range(40.0, 10.0)]);
        assert!(ObjectSpawner::new(inverted).is_err());

        let mut zero = settings(vec![]);
        zero.min_distance = 0;
        assert!(ObjectSpawner::new(zero).is_err());
    }

    #[test]
    fn test_flat_ground_rejects_steep_only_type() {
        let ground = FlatGround { height: 5.0, normal: Vec3::Y };
        let mut spawner =
            ObjectSpawner::new(settings(vec![ObjectResource::new("cliff_moss").with_slope_range(10.0, 90.0)])).unwrap();
        let placed = spawner.spawn_objects(Vec3::ZERO, FAR, &ground);
        assert!(placed.is_empty());
        assert_eq!(spawner.in_use(), 0);
    }

    #[test]
    fn test_flat_ground_within_height_range_places_everywhere() {
        let ground = FlatGround { height: 5.0, normal: Vec3::Y };
        let mut spawner =
            ObjectSpawner::new(settings(vec![ObjectResource::new("tree").with_height_range(0.0, 0.1)])).unwrap();
        let placed = spawner.spawn_objects(Vec3::ZERO, FAR, &ground);

        // 8 x 8 sub-grid, probability 1 accepts every column
        assert_eq!(placed.len(), 64);
        assert_eq!(spawner.in_use(), 64);
        for object in &placed {
            assert_eq!(object.position.y, 5.0);
            assert!((0.0..360.0).contains(&object.yaw));
            let instance = spawner.instance(object).unwrap();
            assert!(instance.active);
            assert_eq!(instance.position, object.position);
        }
    }

    #[test]
    fn test_height_sea_level_and_observer_filters() {
        let ground = FlatGround { height: 5.0, normal: Vec3::Y };

        let mut too_low = ObjectSpawner::new(settings(vec![ObjectResource::new("t").with_height_range(0.5, 1.0)])).unwrap();
        assert!(too_low.spawn_objects(Vec3::ZERO, FAR, &ground).is_empty());

        let mut underwater = settings(vec![ObjectResource::new("t")]);
        underwater.sea_level = 5.0;
        let mut underwater = ObjectSpawner::new(underwater).unwrap();
        assert!(underwater.spawn_objects(Vec3::ZERO, FAR, &ground).is_empty());

        // Observer standing in the chunk suppresses nearby columns
        let mut near = ObjectSpawner::new(settings(vec![ObjectResource::new("t")])).unwrap();
        let all = near.spawn_objects(Vec3::ZERO, FAR, &ground).len();
        let mut near2 = ObjectSpawner::new(settings(vec![ObjectResource::new("t")])).unwrap();
        let some = near2.spawn_objects(Vec3::ZERO, Vec3::new(8.0, 16.0, 8.0), &ground).len();
        assert!(some < all);
    }

    #[test]
    fn test_ray_length_limited_to_chunk() {
        // Ground more than chunk_size - 1 below the chunk top is not found
        let ground = FlatGround { height: 0.5, normal: Vec3::Y };
        let mut spawner = ObjectSpawner::new(settings(vec![ObjectResource::new("t")])).unwrap();
        assert!(spawner.spawn_objects(Vec3::ZERO, FAR, &ground).is_empty());
    }

    #[test]
    fn test_columns_share_world_grid_across_chunks() {
        let ground = FlatGround { height: 5.0, normal: Vec3::Y };
        let mut s = settings(vec![ObjectResource::new("t")]);
        s.min_distance = 10;
        let mut spawner = ObjectSpawner::new(s).unwrap();

        let mut xs = Vec::new();
        for origin_x in [-32.0f32, -16.0, 0.0, 16.0, 32.0] {
            let origin = Vec3::new(origin_x, 0.0, -16.0);
            for object in spawner.spawn_objects(origin, FAR, &ground) {
                let p = object.position;
                assert_eq!(p.x.rem_euclid(10.0), 0.0, "x {} off grid", p.x);
                assert_eq!(p.z.rem_euclid(10.0), 0.0, "z {} off grid", p.z);
                assert!(p.x >= origin.x && p.x < origin.x + 16.0, "x {} outside chunk at {}", p.x, origin.x);
                assert!(p.z >= origin.z && p.z < origin.z + 16.0, "z {} outside chunk at {}", p.z, origin.z);
                xs.push(p.x as i32);
            }
        }
        xs.sort_unstable();
        xs.dedup();
        assert_eq!(xs, vec![-30, -20, -10, 0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_placement_is_deterministic_and_released() {
        let ground = FlatGround { height: 20.0, normal: Vec3::new(0.0, 1.0, 0.2).normalize() };
        let make = || {
            let mut s = settings(vec![ObjectResource::new("a"), ObjectResource::new("b")]);
            s.spawn_probability = 0.5;
            ObjectSpawner::new(s).unwrap()
        };
        let mut a = make();
        let mut b = make();
        let origin = Vec3::new(16.0, 16.0, -32.0);
        let mut placed_a = a.spawn_objects(origin, FAR, &ground);
        let placed_b = b.spawn_objects(origin, FAR, &ground);
        assert_eq!(placed_a, placed_b);

        a.destroy_objects(&mut placed_a);
        assert!(placed_a.is_empty());
        assert_eq!(a.in_use(), 0);
    }
}
