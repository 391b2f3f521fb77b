//! Chunk state machine: create, build, apply, destroy

use std::sync::Arc;

use glam::Vec3;

use super::sink::MeshSink;
use super::surface::ColliderSet;
use super::ChunkCoord;
use crate::density::Density;
use crate::math::Aabb;
use crate::mesh::{mesh_builder, IsosurfaceAlgorithm, MeshBuilder, MeshData};
use crate::placement::{ObjectSpawner, PlacedObject};

/// Lifecycle state of a chunk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChunkState {
    /// Pooled container that has never been assigned a coordinate
    #[default]
    Empty,
    /// Assigned and waiting for its mesh
    Waiting,
    /// Mesh applied (possibly empty for an airless chunk)
    Ready,
    /// Torn down; late build results are rejected
    Destroyed,
}

/// Identifies one build request. Only the newest ticket of a live chunk is
/// accepted when its result comes back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BuildTicket {
    pub coord: ChunkCoord,
    pub generation: u64,
}

/// Main-thread collaborators a chunk touches when applying or tearing down
/// its mesh
pub struct ChunkContext<'a> {
    pub sink: &'a mut dyn MeshSink,
    pub colliders: &'a mut ColliderSet,
    pub spawners: &'a mut [ObjectSpawner],
    /// Position placement keeps clear of
    pub observer: Vec3,
}

/// One cell of the streaming grid
#[derive(Debug, Default)]
pub struct Chunk {
    coord: ChunkCoord,
    chunk_size: u32,
    bounds: Aabb,
    state: ChunkState,
    generation: u64,
    mesh: MeshData,
    /// Placed objects, one list per spawner
    objects: Vec<Vec<PlacedObject>>,
}

impl Chunk {
    /// Assign the chunk to `coord`. Any build issued before this call is
    /// invalidated.
    pub fn create(&mut self, coord: ChunkCoord, chunk_size: u32) {
        self.coord = coord;
        self.chunk_size = chunk_size;
        self.bounds = coord.bounds(chunk_size);
        self.state = ChunkState::Waiting;
        self.generation += 1;
        self.mesh.clear();
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ChunkState::Ready
    }

    /// World-space minimum corner
    pub fn origin(&self) -> Vec3 {
        self.bounds.min
    }

    /// Current mesh, empty until the chunk is Ready
    pub fn mesh(&self) -> &MeshData {
        &self.mesh
    }

    /// Placed objects across all spawners
    pub fn objects(&self) -> impl Iterator<Item = &PlacedObject> {
        self.objects.iter().flatten()
    }

    /// Start a new build. Any earlier ticket becomes stale.
    pub fn begin_build(&mut self) -> BuildTicket {
        self.generation += 1;
        self.state = ChunkState::Waiting;
        BuildTicket {
            coord: self.coord,
            generation: self.generation,
        }
    }

    /// Extractor for this chunk's volume
    pub fn mesh_builder(
        &self,
        algorithm: IsosurfaceAlgorithm,
        density: Arc<Density>,
    ) -> Box<dyn MeshBuilder> {
        mesh_builder(algorithm, density, self.origin(), self.chunk_size)
    }

    /// Whether a finished build may be applied
    pub fn accepts(&self, ticket: &BuildTicket) -> bool {
        self.state != ChunkState::Destroyed
            && self.state != ChunkState::Empty
            && ticket.coord == self.coord
            && ticket.generation == self.generation
    }

    /// Apply extracted geometry and move to Ready.
    ///
    /// An empty mesh leaves the chunk airless: nothing is published and no
    /// objects are placed. Otherwise the buffers are refilled in place, handed
    /// to the sink and collider set, and placement runs against the new
    /// surface.
    pub fn generate_mesh(&mut self, data: &MeshData, ctx: &mut ChunkContext<'_>) {
        self.release_objects(&mut *ctx.spawners);
        self.state = ChunkState::Ready;

        if data.is_empty() {
            if !self.mesh.is_empty() {
                ctx.sink.clear(self.coord);
                ctx.colliders.remove(self.coord);
            }
            self.mesh.clear();
            return;
        }

        self.mesh.copy_from(data);
        let origin = self.origin();
        ctx.sink.apply(self.coord, origin, &self.mesh);
        ctx.colliders.insert(self.coord, origin, &self.mesh);

        self.objects.resize_with(ctx.spawners.len(), Vec::new);
        for (spawner, objects) in ctx.spawners.iter_mut().zip(self.objects.iter_mut()) {
            *objects = spawner.spawn_objects(origin, ctx.observer, &*ctx.colliders);
        }
    }

    /// Tear down: unpublish the mesh, release placed objects and move to
    /// Destroyed. Safe to call more than once.
    pub fn destroy(&mut self, ctx: &mut ChunkContext<'_>) {
        if matches!(self.state, ChunkState::Destroyed | ChunkState::Empty) {
            return;
        }
        if !self.mesh.is_empty() {
            ctx.sink.clear(self.coord);
            ctx.colliders.remove(self.coord);
        }
        self.release_objects(&mut *ctx.spawners);
        self.mesh.clear();
        self.state = ChunkState::Destroyed;
    }

    fn release_objects(&mut self, spawners: &mut [ObjectSpawner]) {
        for (spawner, objects) in spawners.iter_mut().zip(self.objects.iter_mut()) {
            spawner.destroy_objects(objects);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::sink::MemorySink;
    use crate::chunk::surface::{LayerMask, SurfaceQuery};
    use crate::placement::{ObjectResource, ObjectSpawnSettings};

    fn ground_mesh(height: f32) -> MeshData {
        let density = Arc::new(Density::Plane { point: Vec3::new(0.0, height, 0.0), normal: Vec3::Y });
        let mut chunk = Chunk::default();
        chunk.create(ChunkCoord::new(0, 0, 0), 16);
        chunk.mesh_builder(IsosurfaceAlgorithm::MarchingCubes, density).generate()
    }

    fn spawner() -> ObjectSpawner {
        ObjectSpawner::new(ObjectSpawnSettings {
            resources: vec![ObjectResource::new("rock")],
            min_distance: 4,
            spawn_probability: 1.0,
            pool_size: 8,
            chunk_size: 16,
            sea_level: -10.0,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_stale_ticket_rejected() {
        let mut chunk = Chunk::default();
        let never = BuildTicket { coord: ChunkCoord::default(), generation: 0 };
        assert!(!chunk.accepts(&never));

        chunk.create(ChunkCoord::new(1, 0, 0), 16);
        let first = chunk.begin_build();
        let second = chunk.begin_build();
        assert!(!chunk.accepts(&first));
        assert!(chunk.accepts(&second));

        // Reassigning the container invalidates the in-flight build
        chunk.create(ChunkCoord::new(1, 0, 0), 16);
        assert!(!chunk.accepts(&second));
    }

    #[test]
    fn test_generate_mesh_publishes_and_places() {
        let mut sink = MemorySink::new();
        let mut colliders = ColliderSet::new();
        let mut spawners = vec![spawner()];
        let mut ctx = ChunkContext {
            sink: &mut sink,
            colliders: &mut colliders,
            spawners: &mut spawners,
            observer: Vec3::splat(1000.0),
        };

        let mut chunk = Chunk::default();
        chunk.create(ChunkCoord::new(0, 0, 0), 16);
        let ticket = chunk.begin_build();
        assert!(chunk.accepts(&ticket));
        chunk.generate_mesh(&ground_mesh(6.5), &mut ctx);

        assert!(chunk.is_ready());
        assert!(!chunk.mesh().is_empty());
        assert!(ctx.colliders.contains(chunk.coord()));
        let hit = ctx
            .colliders
            .raycast_down(Vec3::new(3.3, 15.0, 7.7), 15.0, LayerMask::TERRAIN)
            .unwrap();
        assert!((hit.point.y - 6.5).abs() < 1e-4);

        // 4 x 4 sub-grid on flat ground
        assert_eq!(chunk.objects().count(), 16);
        drop(ctx);
        assert_eq!(sink.len(), 1);
        assert_eq!(spawners[0].in_use(), 16);
    }

    #[test]
    fn test_rebuild_replaces_objects() {
        let mut sink = MemorySink::new();
        let mut colliders = ColliderSet::new();
        let mut spawners = vec![spawner()];
        let mut ctx = ChunkContext {
            sink: &mut sink,
            colliders: &mut colliders,
            spawners: &mut spawners,
            observer: Vec3::splat(1000.0),
        };

        let mut chunk = Chunk::default();
        chunk.create(ChunkCoord::new(0, 0, 0), 16);
        chunk.generate_mesh(&ground_mesh(6.5), &mut ctx);
        chunk.generate_mesh(&ground_mesh(3.5), &mut ctx);
        assert_eq!(chunk.objects().count(), 16);
        assert!(chunk.objects().all(|o| (o.position.y - 3.5).abs() < 1e-4));
        assert_eq!(ctx.spawners[0].in_use(), 16);
    }

    #[test]
    fn test_empty_mesh_leaves_chunk_airless() {
        let mut sink = MemorySink::new();
        let mut colliders = ColliderSet::new();
        let mut spawners = vec![spawner()];
        let mut ctx = ChunkContext {
            sink: &mut sink,
            colliders: &mut colliders,
            spawners: &mut spawners,
            observer: Vec3::splat(1000.0),
        };

        let mut chunk = Chunk::default();
        chunk.create(ChunkCoord::new(0, 2, 0), 16);
        chunk.generate_mesh(&MeshData::new(), &mut ctx);
        assert!(chunk.is_ready());
        assert!(chunk.mesh().is_empty());
        assert_eq!(chunk.objects().count(), 0);
        assert!(ctx.colliders.is_empty());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut sink = MemorySink::new();
        let mut colliders = ColliderSet::new();
        let mut spawners = vec![spawner()];
        let mut ctx = ChunkContext {
            sink: &mut sink,
            colliders: &mut colliders,
            spawners: &mut spawners,
            observer: Vec3::splat(1000.0),
        };

        let mut chunk = Chunk::default();
        chunk.create(ChunkCoord::new(0, 0, 0), 16);
        let ticket = chunk.begin_build();
        chunk.generate_mesh(&ground_mesh(6.5), &mut ctx);

        chunk.destroy(&mut ctx);
        chunk.destroy(&mut ctx);
        assert_eq!(chunk.state(), ChunkState::Destroyed);
        assert!(!chunk.accepts(&ticket));
        assert!(ctx.colliders.is_empty());
        assert_eq!(ctx.spawners[0].in_use(), 0);
        drop(ctx);
        assert!(sink.is_empty());
    }
}
