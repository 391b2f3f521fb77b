//! Chunk grid around an observer
//!
//! Each tick the grid admits every lattice coordinate within view distance,
//! recycles chunks that drifted beyond `view_distance + chunk_size`, and
//! builds at most `max_chunks_per_tick` queued chunks. Finished builds come
//! back through the [`BuildDispatcher`] and are applied on the owning thread.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use glam::{Vec2, Vec3};
use rayon::prelude::*;

use super::dispatch::{BuildDispatcher, CompletedBuild, DispatchMode};
use super::pool::{ObjectPool, PoolHandle};
use crate::chunk::{Chunk, ChunkContext, ChunkCoord};
use crate::core::{Error, Result};
use crate::density::Density;
use crate::mesh::{IsosurfaceAlgorithm, MeshBuilder};

/// Grid extent and per-tick budget
#[derive(Clone, Debug, PartialEq)]
pub struct GridSettings {
    pub chunk_size: u32,
    /// Load radius around the observer, world units
    pub view_distance: f32,
    pub max_height: f32,
    /// Static mode footprint (x, z), world units
    pub world_size: Vec2,
    pub max_chunks_per_tick: usize,
    pub algorithm: IsosurfaceAlgorithm,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            view_distance: 64.0,
            max_height: 64.0,
            world_size: Vec2::new(64.0, 64.0),
            max_chunks_per_tick: 4,
            algorithm: IsosurfaceAlgorithm::default(),
        }
    }
}

impl GridSettings {
    /// Chunk layers spanned by `max_height`
    pub fn vertical_chunks(&self) -> i32 {
        (self.max_height / self.chunk_size as f32) as i32
    }

    /// Containers to pre-allocate for streaming around an observer
    pub fn streaming_pool_size(&self) -> usize {
        let across = (self.view_distance / self.chunk_size as f32) as usize * 2;
        across * across * self.vertical_chunks().max(0) as usize * 2
    }

    /// Containers to pre-allocate for a fixed-size world
    pub fn static_pool_size(&self) -> usize {
        let cs = self.chunk_size as f32;
        let x = (self.world_size.x / cs) as usize;
        let z = (self.world_size.y / cs) as usize;
        x * z * self.vertical_chunks().max(0) as usize * 2
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be positive".into()));
        }
        if self.view_distance <= 0.0 {
            return Err(Error::Config("view distance must be positive".into()));
        }
        if self.max_chunks_per_tick == 0 {
            return Err(Error::Config("max chunks per tick must be at least 1".into()));
        }
        Ok(())
    }
}

/// A chunk waiting for its build to be issued
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingBuild {
    pub coord: ChunkCoord,
    pub handle: PoolHandle,
}

/// Pending-build FIFO shared between the tick thread and anyone scheduling
/// rebuilds
#[derive(Clone, Debug, Default)]
pub struct BuildQueue {
    inner: Arc<Mutex<VecDeque<PendingBuild>>>,
}

impl BuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the deque half-updated
    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingBuild>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, build: PendingBuild) {
        self.lock().push_back(build);
    }

    pub fn pop(&self) -> Option<PendingBuild> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Tracks loaded chunks and drives their builds
pub struct ChunkGrid {
    settings: GridSettings,
    density: Arc<Density>,
    chunks: ObjectPool<Chunk>,
    loaded: HashMap<ChunkCoord, PoolHandle>,
    queue: BuildQueue,
    dispatcher: BuildDispatcher,
    base_ready: bool,
}

impl ChunkGrid {
    pub fn new(settings: GridSettings, density: Arc<Density>, dispatcher: BuildDispatcher) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            density,
            chunks: ObjectPool::new("chunks"),
            loaded: HashMap::new(),
            queue: BuildQueue::new(),
            dispatcher,
            base_ready: false,
        })
    }

    /// Pre-allocate `size` chunk containers
    pub fn create_pool(&mut self, size: usize) {
        self.chunks.create_pool(size);
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    pub fn queue(&self) -> &BuildQueue {
        &self.queue
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Builds running on workers
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Chunk containers ever created
    pub fn pool_created(&self) -> usize {
        self.chunks.created()
    }

    pub fn is_loaded(&self, coord: ChunkCoord) -> bool {
        self.loaded.contains_key(&coord)
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        let handle = self.loaded.get(&coord)?;
        self.chunks.get_ref(*handle)
    }

    /// Every tracked chunk, in no particular order
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.loaded.values().filter_map(|h| self.chunks.get_ref(*h))
    }

    /// One streaming tick: apply finished builds, load, unload, then issue
    /// up to `max_chunks_per_tick` builds
    pub fn update(&mut self, observer: Vec3, ctx: &mut ChunkContext<'_>) {
        ctx.observer = observer;
        self.apply_completed(ctx);
        self.load_pass(observer);
        let unload_radius = self.settings.view_distance + self.settings.chunk_size as f32;
        self.unload_pass(observer, unload_radius, ctx);
        self.build_from_queue(ctx);
    }

    /// Admit every untracked coordinate whose origin lies within view
    /// distance. Returns the number of chunks placed.
    pub fn load_pass(&mut self, observer: Vec3) -> usize {
        let cs = self.settings.chunk_size as f32;
        let view = self.settings.view_distance;
        let vertical = self.settings.vertical_chunks();

        let min_x = ((observer.x - view) / cs).floor() as i32;
        let max_x = ((observer.x + view) / cs).ceil() as i32;
        let min_z = ((observer.z - view) / cs).floor() as i32;
        let max_z = ((observer.z + view) / cs).ceil() as i32;

        let mut placed = 0;
        for x in min_x..=max_x {
            for y in -vertical..vertical {
                for z in min_z..=max_z {
                    let coord = ChunkCoord::new(x, y, z);
                    if self.loaded.contains_key(&coord) {
                        continue;
                    }
                    if coord.world_origin(self.settings.chunk_size).distance(observer) < view {
                        let handle = self.place_chunk(coord);
                        self.queue.push(PendingBuild { coord, handle });
                        placed += 1;
                    }
                }
            }
        }
        if placed > 0 {
            log::debug!("Load pass placed {} chunks ({} loaded)", placed, self.loaded.len());
        }
        placed
    }

    /// Tear down and recycle every chunk whose origin is farther than
    /// `radius` from the observer. Returns the number removed.
    pub fn unload_pass(&mut self, observer: Vec3, radius: f32, ctx: &mut ChunkContext<'_>) -> usize {
        let cs = self.settings.chunk_size;
        let far: Vec<ChunkCoord> = self
            .loaded
            .keys()
            .filter(|c| c.world_origin(cs).distance(observer) > radius)
            .copied()
            .collect();

        for coord in &far {
            self.release_chunk(*coord, ctx);
        }
        if !far.is_empty() {
            log::debug!("Unload pass recycled {} chunks", far.len());
        }
        far.len()
    }

    fn place_chunk(&mut self, coord: ChunkCoord) -> PoolHandle {
        let handle = self.chunks.get();
        if let Some(chunk) = self.chunks.get_mut(handle) {
            chunk.create(coord, self.settings.chunk_size);
        }
        self.loaded.insert(coord, handle);
        handle
    }

    fn release_chunk(&mut self, coord: ChunkCoord, ctx: &mut ChunkContext<'_>) {
        let Some(handle) = self.loaded.remove(&coord) else { return };
        if let Some(chunk) = self.chunks.get_mut(handle) {
            chunk.destroy(ctx);
        }
        if let Err(e) = self.chunks.reuse(handle) {
            log::warn!("Failed to recycle chunk {}: {}", coord, e);
        }
    }

    /// Issue builds for up to `max_chunks_per_tick` queued chunks. Entries
    /// whose chunk was unloaded since queueing are skipped without counting.
    pub fn build_from_queue(&mut self, ctx: &mut ChunkContext<'_>) -> usize {
        let mut issued = 0;
        while issued < self.settings.max_chunks_per_tick {
            let Some(pending) = self.queue.pop() else { break };
            if self.loaded.get(&pending.coord) != Some(&pending.handle) {
                continue;
            }
            let Some(chunk) = self.chunks.get_mut(pending.handle) else { continue };

            let ticket = chunk.begin_build();
            let builder = chunk.mesh_builder(self.settings.algorithm, Arc::clone(&self.density));
            if let Some(done) = self.dispatcher.dispatch(pending.coord, pending.handle, ticket, builder) {
                self.apply_build(done, ctx);
            }
            issued += 1;
        }
        issued
    }

    /// Apply every finished worker build. Returns the number applied.
    pub fn apply_completed(&mut self, ctx: &mut ChunkContext<'_>) -> usize {
        let mut applied = 0;
        for done in self.dispatcher.drain() {
            if self.apply_build(done, ctx) {
                applied += 1;
            }
        }
        applied
    }

    /// Block until every worker build has come back, applying each
    pub fn finish_in_flight(&mut self, ctx: &mut ChunkContext<'_>) -> usize {
        let mut applied = 0;
        while let Some(done) = self.dispatcher.wait() {
            if self.apply_build(done, ctx) {
                applied += 1;
            }
        }
        applied
    }

    /// Apply one finished build. Results for recycled or rebuilt chunks are
    /// discarded and `false` is returned.
    pub fn apply_build(&mut self, done: CompletedBuild, ctx: &mut ChunkContext<'_>) -> bool {
        let Some(chunk) = self.chunks.get_mut(done.handle) else {
            log::debug!("Discarding build for chunk {}: container recycled", done.coord);
            return false;
        };
        if !chunk.accepts(&done.ticket) {
            log::debug!("Discarding stale build for chunk {}", done.coord);
            return false;
        }
        chunk.generate_mesh(&done.data, ctx);
        true
    }

    /// Build the whole fixed-size world at once: `[0, world_x/cs)` by
    /// `[-v/2, v/2)` by `[0, world_z/cs)` chunks with `v = max_height/cs`.
    pub fn generate_static(&mut self, ctx: &mut ChunkContext<'_>) -> usize {
        let start = Instant::now();
        let cs = self.settings.chunk_size as f32;
        let max_x = (self.settings.world_size.x / cs) as i32;
        let max_z = (self.settings.world_size.y / cs) as i32;
        let vertical = self.settings.vertical_chunks();

        let mut jobs = Vec::new();
        for x in 0..max_x {
            for y in -(vertical / 2)..vertical / 2 {
                for z in 0..max_z {
                    let coord = ChunkCoord::new(x, y, z);
                    if self.loaded.contains_key(&coord) {
                        continue;
                    }
                    let handle = self.place_chunk(coord);
                    if let Some(chunk) = self.chunks.get_mut(handle) {
                        let ticket = chunk.begin_build();
                        let builder = chunk.mesh_builder(self.settings.algorithm, Arc::clone(&self.density));
                        jobs.push((coord, handle, ticket, builder));
                    }
                }
            }
        }

        let run = |(coord, handle, ticket, builder): (_, _, _, Box<dyn MeshBuilder>)| {
            CompletedBuild { coord, handle, ticket, data: builder.generate() }
        };
        let completed: Vec<CompletedBuild> = match self.dispatcher.mode() {
            DispatchMode::Inline => jobs.into_iter().map(run).collect(),
            DispatchMode::Threaded => jobs.into_par_iter().map(run).collect(),
        };

        let built = completed.len();
        for done in completed {
            self.apply_build(done, ctx);
        }
        log::info!("Generation took {} ms ({} chunks)", start.elapsed().as_millis(), built);
        built
    }

    /// True once every tracked chunk has been Ready at the same time. Stays
    /// true afterwards, even as new chunks stream in.
    pub fn is_base_terrain_ready(&mut self) -> bool {
        if self.base_ready {
            return true;
        }
        if self.loaded.is_empty() {
            return false;
        }
        if self.chunks().all(Chunk::is_ready) {
            self.base_ready = true;
            log::info!("Base terrain ready ({} chunks)", self.loaded.len());
        }
        self.base_ready
    }

    /// Tear down every tracked chunk and forget queued builds
    pub fn destroy_all(&mut self, ctx: &mut ChunkContext<'_>) {
        let coords: Vec<ChunkCoord> = self.loaded.keys().copied().collect();
        for coord in coords {
            self.release_chunk(coord, ctx);
        }
        self.queue.clear();
        self.base_ready = false;
    }
}

impl std::fmt::Debug for ChunkGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkGrid")
            .field("settings", &self.settings)
            .field("loaded", &self.loaded.len())
            .field("pending", &self.queue.len())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{BuildTicket, ChunkState, ColliderSet, MemorySink};

    fn settings() -> GridSettings {
        GridSettings {
            chunk_size: 8,
            view_distance: 16.0,
            max_height: 16.0,
            world_size: Vec2::new(16.0, 16.0),
            max_chunks_per_tick: 4,
            algorithm: IsosurfaceAlgorithm::MarchingCubes,
        }
    }

    fn ground() -> Arc<Density> {
        Arc::new(Density::Plane { point: Vec3::new(0.0, 3.5, 0.0), normal: Vec3::Y })
    }

    fn inline_grid() -> ChunkGrid {
        ChunkGrid::new(settings(), ground(), BuildDispatcher::inline()).unwrap()
    }

    struct Harness {
        sink: MemorySink,
        colliders: ColliderSet,
    }

    impl Harness {
        fn new() -> Self {
            Self { sink: MemorySink::new(), colliders: ColliderSet::new() }
        }

        fn ctx(&mut self) -> ChunkContext<'_> {
            ChunkContext {
                sink: &mut self.sink,
                colliders: &mut self.colliders,
                spawners: &mut [],
                observer: Vec3::ZERO,
            }
        }
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let bad = GridSettings { chunk_size: 0, ..settings() };
        assert!(matches!(
            ChunkGrid::new(bad, ground(), BuildDispatcher::inline()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_pool_sizes() {
        let s = settings();
        assert_eq!(s.vertical_chunks(), 2);
        // (16/8*2)^2 * (2*2)
        assert_eq!(s.streaming_pool_size(), 64);
        // 2 * 2 * 4
        assert_eq!(s.static_pool_size(), 16);
    }

    #[test]
    fn test_load_pass_is_idempotent() {
        let mut grid = inline_grid();
        let observer = Vec3::new(4.0, 0.0, 4.0);
        let first = grid.load_pass(observer);
        assert!(first > 0);
        assert_eq!(grid.loaded_count(), first);
        assert_eq!(grid.load_pass(observer), 0);
        assert_eq!(grid.loaded_count(), first);

        // Sphere, not box: every origin is inside the view distance
        for chunk in grid.chunks() {
            assert!(chunk.origin().distance(observer) < 16.0);
            assert!((-2..2).contains(&chunk.coord().y));
        }
    }

    #[test]
    fn test_unload_with_large_radius_removes_nothing() {
        let mut harness = Harness::new();
        let mut grid = inline_grid();
        grid.load_pass(Vec3::ZERO);
        let loaded = grid.loaded_count();
        assert_eq!(grid.unload_pass(Vec3::ZERO, 1.0e6, &mut harness.ctx()), 0);
        assert_eq!(grid.loaded_count(), loaded);
    }

    #[test]
    fn test_build_budget_per_tick() {
        let mut harness = Harness::new();
        let mut grid = inline_grid();
        let placed = grid.load_pass(Vec3::ZERO);
        assert!(placed > 4);

        assert_eq!(grid.build_from_queue(&mut harness.ctx()), 4);
        assert_eq!(grid.pending_count(), placed - 4);
        assert_eq!(grid.chunks().filter(|c| c.is_ready()).count(), 4);
        assert!(!grid.is_base_terrain_ready());
    }

    #[test]
    fn test_streaming_reaches_base_ready_and_recycles() {
        let mut harness = Harness::new();
        let mut grid = inline_grid();
        let observer = Vec3::new(4.0, 0.0, 4.0);
        for _ in 0..64 {
            grid.update(observer, &mut harness.ctx());
        }
        assert_eq!(grid.pending_count(), 0);
        assert!(grid.is_base_terrain_ready());
        assert!(grid.is_loaded(ChunkCoord::new(0, 0, 0)));
        let near_meshes = harness.sink.len();
        assert!(near_meshes > 0);

        // Move away: the old neighbourhood is torn down and unpublished
        let far = Vec3::new(400.0, 0.0, 4.0);
        for _ in 0..64 {
            grid.update(far, &mut harness.ctx());
        }
        assert!(grid.chunks().all(|c| c.origin().distance(far) <= 16.0 + 8.0));
        assert!(!grid.is_loaded(ChunkCoord::new(0, 0, 0)));
        assert!(harness.sink.get(ChunkCoord::new(0, 0, 0)).is_none());
        assert_eq!(harness.sink.len(), near_meshes);
        // Latched even though new chunks streamed in
        assert!(grid.is_base_terrain_ready());
    }

    #[test]
    fn test_stale_build_discarded() {
        let mut harness = Harness::new();
        let mut grid = inline_grid();
        grid.load_pass(Vec3::ZERO);
        let coord = ChunkCoord::new(0, 0, 0);
        let handle = grid.loaded[&coord];

        let stale = CompletedBuild {
            coord,
            handle,
            ticket: BuildTicket { coord, generation: 0 },
            data: Default::default(),
        };
        assert!(!grid.apply_build(stale, &mut harness.ctx()));
        assert_eq!(grid.chunk(coord).map(Chunk::state), Some(ChunkState::Waiting));

        // A handle that no longer refers to a live container
        grid.unload_pass(Vec3::ZERO, -1.0, &mut harness.ctx());
        let recycled = CompletedBuild {
            coord,
            handle,
            ticket: BuildTicket { coord, generation: 1 },
            data: Default::default(),
        };
        assert!(!grid.apply_build(recycled, &mut harness.ctx()));
    }

    #[test]
    fn test_unloaded_queue_entries_skipped() {
        let mut harness = Harness::new();
        let mut grid = inline_grid();
        grid.load_pass(Vec3::ZERO);
        grid.unload_pass(Vec3::ZERO, -1.0, &mut harness.ctx());
        assert_eq!(grid.loaded_count(), 0);
        assert_eq!(grid.build_from_queue(&mut harness.ctx()), 0);
        assert!(grid.queue().is_empty());
    }

    #[test]
    fn test_threaded_builds_apply_on_drain() {
        let mut harness = Harness::new();
        let dispatcher = BuildDispatcher::new(DispatchMode::Threaded, 2).unwrap();
        let mut grid = ChunkGrid::new(settings(), ground(), dispatcher).unwrap();
        grid.load_pass(Vec3::ZERO);
        let issued = grid.build_from_queue(&mut harness.ctx());
        assert_eq!(issued, 4);
        assert_eq!(grid.finish_in_flight(&mut harness.ctx()), 4);
        assert_eq!(grid.in_flight(), 0);
        assert_eq!(grid.chunks().filter(|c| c.is_ready()).count(), 4);
    }

    #[test]
    fn test_generate_static_builds_everything() {
        let mut harness = Harness::new();
        let dispatcher = BuildDispatcher::new(DispatchMode::Threaded, 2).unwrap();
        let mut grid = ChunkGrid::new(settings(), ground(), dispatcher).unwrap();
        grid.create_pool(grid.settings().static_pool_size());

        // 2 x 2 footprint, y in [-1, 1)
        assert_eq!(grid.generate_static(&mut harness.ctx()), 8);
        assert_eq!(grid.loaded_count(), 8);
        assert!(grid.is_base_terrain_ready());
        // The plane at y = 3.5 crosses only the y = 0 layer
        assert_eq!(harness.sink.len(), 4);
        assert!(grid.pool_created() <= 16);

        grid.destroy_all(&mut harness.ctx());
        assert_eq!(grid.loaded_count(), 0);
        assert!(harness.sink.is_empty());
        assert!(harness.colliders.is_empty());
    }
}
