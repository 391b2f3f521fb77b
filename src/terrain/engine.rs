//! Terrain engine: wires density, extraction, streaming and placement
//!
//! A [`TerrainEngine`] owns every main-thread structure (mesh sink, collider
//! set, object spawners, chunk grid). `generate_terrain` rebuilds all of
//! them from the current [`EngineConfig`]; streaming worlds are then driven
//! by calling [`update`](TerrainEngine::update) once per tick.

use std::sync::Arc;

use glam::Vec3;
use rand::Rng;
use tokio::sync::oneshot;

use super::config::EngineConfig;
use crate::chunk::{ChunkContext, ColliderSet, LayerMask, MeshSink, SurfaceQuery};
use crate::core::{Error, Result};
use crate::density::{Density, NoiseSource, TerrainDensity};
use crate::placement::{ObjectSpawnSettings, ObjectSpawner};
use crate::streaming::{BuildDispatcher, ChunkGrid};

/// Height above the surface at which a spawned observer is placed
pub const SPAWN_CLEARANCE: f32 = 2.0;

/// Totals over every loaded chunk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TerrainStats {
    pub chunks: usize,
    /// Chunks with a non-empty mesh
    pub meshed_chunks: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub objects: usize,
}

pub struct TerrainEngine {
    config: EngineConfig,
    sink: Box<dyn MeshSink>,
    colliders: ColliderSet,
    spawners: Vec<ObjectSpawner>,
    grid: Option<ChunkGrid>,
    running: bool,
    ready: bool,
    ready_listeners: Vec<oneshot::Sender<()>>,
    center: Vec3,
}

impl TerrainEngine {
    pub fn new(config: EngineConfig, sink: Box<dyn MeshSink>) -> Self {
        Self {
            config,
            sink,
            colliders: ColliderSet::new(),
            spawners: Vec::new(),
            grid: None,
            running: false,
            ready: false,
            ready_listeners: Vec::new(),
            center: Vec3::ZERO,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Changes take effect on the next `generate_terrain`
    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    /// Whether a streaming world is being driven by `update`
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn grid(&self) -> Option<&ChunkGrid> {
        self.grid.as_ref()
    }

    pub fn spawners(&self) -> &[ObjectSpawner] {
        &self.spawners
    }

    /// Surface-query backend over every built chunk
    pub fn surface(&self) -> &ColliderSet {
        &self.colliders
    }

    /// (Re)generate the world.
    ///
    /// Streaming worlds need the observer position and start running;
    /// static worlds ignore it and are fully built before this returns.
    /// Any previous world is torn down first.
    pub fn generate_terrain(&mut self, observer: Option<Vec3>) -> Result<()> {
        self.config.validate()?;
        let infinite = self.config.terrain.infinite;
        let center = match (infinite, observer) {
            (true, Some(observer)) => observer,
            (true, None) => {
                return Err(Error::Config("streaming terrain needs an observer position".into()));
            }
            (false, _) => Vec3::ZERO,
        };

        self.init_noise();
        self.destroy_pools();
        self.init_generators()?;
        self.center = center;

        let terrain = &self.config.terrain;
        log::info!(
            "Generating {} terrain: {} chunks of {}, {} extraction, seed {}",
            if infinite { "streaming" } else { "static" },
            terrain.chunk_pool_size(),
            terrain.chunk_size,
            terrain.algorithm,
            terrain.noise.seed
        );

        if infinite {
            self.running = true;
        } else if let Some(grid) = self.grid.as_mut() {
            let mut ctx = ChunkContext {
                sink: self.sink.as_mut(),
                colliders: &mut self.colliders,
                spawners: &mut self.spawners,
                observer: center,
            };
            grid.generate_static(&mut ctx);
            self.poll_ready();
        }
        Ok(())
    }

    fn init_noise(&mut self) {
        if self.config.terrain.random_seed {
            let seed: u32 = rand::rng().random();
            self.config.terrain.noise.seed = seed;
            log::info!("Using random terrain seed {}", seed);
        }
    }

    fn init_generators(&mut self) -> Result<()> {
        let terrain = &self.config.terrain;

        for family in [&self.config.trees, &self.config.objects] {
            if family.resources.iter().all(|r| r.name.is_empty()) {
                continue;
            }
            let settings = ObjectSpawnSettings {
                chunk_size: terrain.chunk_size,
                view_distance: terrain.view_distance,
                max_height: terrain.max_height,
                sea_level: terrain.sea_level,
                noise: crate::density::NoiseSettings {
                    seed: terrain.noise.seed,
                    ..family.noise.clone()
                },
                ..family.clone()
            };
            self.spawners.push(ObjectSpawner::new(settings)?);
        }

        let noise = NoiseSource::new(&terrain.noise);
        let density = TerrainDensity::new(
            noise,
            terrain.noise.amplitude,
            1.0 / terrain.chunk_size as f64,
            terrain.density_mode,
        );
        let density = Arc::new(Density::from(density));

        let dispatcher = BuildDispatcher::new(terrain.dispatch, terrain.worker_threads)?;
        let mut grid = ChunkGrid::new(terrain.grid_settings(), density, dispatcher)?;
        grid.create_pool(terrain.chunk_pool_size());
        self.grid = Some(grid);

        if terrain.water {
            self.colliders.set_water_level(Some(terrain.sea_level));
        }
        Ok(())
    }

    /// Tear down every chunk, placed object and collider and stop streaming
    pub fn destroy_pools(&mut self) {
        self.running = false;
        self.ready = false;
        if let Some(mut grid) = self.grid.take() {
            let mut ctx = ChunkContext {
                sink: self.sink.as_mut(),
                colliders: &mut self.colliders,
                spawners: &mut self.spawners,
                observer: self.center,
            };
            grid.destroy_all(&mut ctx);
        }
        self.spawners.clear();
        self.colliders.clear();
    }

    /// One streaming tick around `observer`. No-op unless running.
    pub fn update(&mut self, observer: Vec3) {
        if !self.running {
            return;
        }
        let Some(grid) = self.grid.as_mut() else { return };
        self.center = observer;
        let mut ctx = ChunkContext {
            sink: self.sink.as_mut(),
            colliders: &mut self.colliders,
            spawners: &mut self.spawners,
            observer,
        };
        grid.update(observer, &mut ctx);
        self.poll_ready();
    }

    fn poll_ready(&mut self) {
        if self.ready {
            return;
        }
        self.ready = self.grid.as_mut().is_some_and(ChunkGrid::is_base_terrain_ready);
        if self.ready {
            for listener in self.ready_listeners.drain(..) {
                let _ = listener.send(());
            }
        }
    }

    /// Whether every chunk around the observer has been built at least once
    pub fn is_base_terrain_ready(&self) -> bool {
        self.ready
    }

    /// Completes once the base terrain is ready; immediately if it already is
    pub fn terrain_ready(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if self.ready {
            let _ = tx.send(());
        } else {
            self.ready_listeners.push(tx);
        }
        rx
    }

    /// Standing position above the surface at column `(x, z)`, terrain or
    /// water, whichever is higher
    pub fn spawn_point(&self, x: f32, z: f32) -> Result<Vec3> {
        let origin = Vec3::new(x, self.config.terrain.max_height + 1.0, z);
        self.colliders
            .raycast_down(origin, f32::INFINITY, LayerMask::TERRAIN | LayerMask::WATER)
            .map(|hit| hit.point + Vec3::Y * SPAWN_CLEARANCE)
            .ok_or_else(|| Error::TerrainNotReady(format!("no surface below ({x}, {z})")))
    }

    /// Spawn point for the observer: the world centre for static terrain,
    /// the last observer position for streaming terrain
    pub fn default_spawn_point(&self) -> Result<Vec3> {
        let terrain = &self.config.terrain;
        if terrain.infinite {
            self.spawn_point(self.center.x, self.center.z)
        } else {
            self.spawn_point(terrain.world_size[0] / 2.0, terrain.world_size[1] / 2.0)
        }
    }

    pub fn stats(&self) -> TerrainStats {
        let Some(grid) = self.grid.as_ref() else {
            return TerrainStats::default();
        };
        grid.chunks().fold(TerrainStats::default(), |mut stats, chunk| {
            stats.chunks += 1;
            if !chunk.mesh().is_empty() {
                stats.meshed_chunks += 1;
            }
            stats.vertices += chunk.mesh().vertex_count();
            stats.triangles += chunk.mesh().triangle_count();
            stats.objects += chunk.objects().count();
            stats
        })
    }
}

impl std::fmt::Debug for TerrainEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainEngine")
            .field("running", &self.running)
            .field("ready", &self.ready)
            .field("grid", &self.grid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::NullSink;
    use crate::placement::ObjectResource;
    use crate::streaming::DispatchMode;

    fn small_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        let terrain = &mut config.terrain;
        terrain.chunk_size = 8;
        terrain.max_height = 16.0;
        terrain.view_distance = 16.0;
        terrain.world_size = [16.0, 16.0];
        terrain.noise.seed = 42;
        terrain.noise.amplitude = 4.0;
        terrain.sea_level = -100.0;
        terrain.dispatch = DispatchMode::Inline;
        terrain.max_chunks_per_tick = 8;
        config.trees.resources = vec![ObjectResource::new(""), ObjectResource::new("pine")];
        config.trees.min_distance = 2;
        config.trees.spawn_probability = 1.0;
        config.trees.pool_size = 16;
        config
    }

    fn engine(config: EngineConfig) -> TerrainEngine {
        TerrainEngine::new(config, Box::new(NullSink))
    }

    #[test]
    fn test_static_generation_is_ready() {
        let mut engine = engine(small_config());
        let mut ready = engine.terrain_ready();
        engine.generate_terrain(None).unwrap();

        assert!(!engine.is_running());
        assert!(engine.is_base_terrain_ready());
        assert!(ready.try_recv().is_ok());

        let stats = engine.stats();
        assert_eq!(stats.chunks, 8);
        assert!(stats.meshed_chunks > 0);
        assert!(stats.triangles > 0);
        assert_eq!(stats.vertices, stats.triangles * 3);

        let spawn = engine.default_spawn_point().unwrap();
        assert_eq!((spawn.x, spawn.z), (8.0, 8.0));
        let ground = spawn.y - SPAWN_CLEARANCE;
        assert!((-4.0..=4.0).contains(&ground), "ground at {ground}");

        // Subscribing after the fact completes immediately
        assert!(engine.terrain_ready().try_recv().is_ok());
    }

    #[test]
    fn test_spawners_inherit_terrain_settings() {
        let mut engine = engine(small_config());
        engine.generate_terrain(None).unwrap();

        // Objects family has no named resources, trees keep only "pine"
        assert_eq!(engine.spawners().len(), 1);
        let spawner = &engine.spawners()[0];
        assert_eq!(spawner.resources().len(), 1);
        assert_eq!(spawner.settings().chunk_size, 8);
        assert_eq!(spawner.settings().max_height, 16.0);
        assert_eq!(spawner.settings().noise.seed, 42);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let mut a = engine(small_config());
        let mut b = engine(small_config());
        a.generate_terrain(None).unwrap();
        b.generate_terrain(None).unwrap();
        assert_eq!(a.stats(), b.stats());
    }

    #[test]
    fn test_streaming_requires_observer() {
        let mut config = small_config();
        config.terrain.infinite = true;
        let mut engine = engine(config);
        assert!(matches!(engine.generate_terrain(None), Err(Error::Config(_))));
        assert!(engine.grid().is_none());
    }

    #[test]
    fn test_streaming_fires_ready_once() {
        let mut config = small_config();
        config.terrain.infinite = true;
        let mut engine = engine(config);
        let mut ready = engine.terrain_ready();

        let observer = Vec3::new(4.0, 0.0, 4.0);
        engine.generate_terrain(Some(observer)).unwrap();
        assert!(engine.is_running());
        assert!(!engine.is_base_terrain_ready());

        for _ in 0..32 {
            engine.update(observer);
        }
        assert!(engine.is_base_terrain_ready());
        assert!(ready.try_recv().is_ok());
        assert!(engine.spawn_point(observer.x, observer.z).is_ok());
    }

    #[test]
    fn test_spawn_point_before_generation_fails() {
        let engine = engine(small_config());
        assert!(matches!(engine.spawn_point(0.0, 0.0), Err(Error::TerrainNotReady(_))));
    }

    #[test]
    fn test_water_plane_catches_spawn() {
        let mut config = small_config();
        config.terrain.water = true;
        config.terrain.sea_level = 6.0;
        let mut engine = engine(config);
        engine.generate_terrain(None).unwrap();
        let spawn = engine.spawn_point(8.0, 8.0).unwrap();
        assert!((spawn.y - (6.0 + SPAWN_CLEARANCE)).abs() < 1e-5);
    }

    #[test]
    fn test_destroy_pools_tears_everything_down() {
        let mut engine = engine(small_config());
        engine.generate_terrain(None).unwrap();
        assert!(!engine.surface().is_empty());

        engine.destroy_pools();
        assert!(engine.grid().is_none());
        assert!(engine.surface().is_empty());
        assert!(engine.spawners().is_empty());
        assert_eq!(engine.stats(), TerrainStats::default());
    }

    #[test]
    fn test_destroy_pools_clears_ready() {
        let mut engine = engine(small_config());
        engine.generate_terrain(None).unwrap();
        assert!(engine.is_base_terrain_ready());
        assert!(engine.spawn_point(8.0, 8.0).is_ok());

        engine.destroy_pools();
        assert!(!engine.is_base_terrain_ready());
        assert!(matches!(engine.spawn_point(8.0, 8.0), Err(Error::TerrainNotReady(_))));

        let mut ready = engine.terrain_ready();
        assert!(ready.try_recv().is_err());
        engine.generate_terrain(None).unwrap();
        assert!(engine.is_base_terrain_ready());
        assert!(ready.try_recv().is_ok());
    }
}
