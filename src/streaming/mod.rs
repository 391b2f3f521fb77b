//! Chunk streaming around an observer

pub mod pool;
pub mod dispatch;
pub mod grid;

pub use pool::{MultiObjectPool, ObjectPool, PoolHandle, TypedHandle};
pub use dispatch::{BuildDispatcher, CompletedBuild, DispatchMode};
pub use grid::{BuildQueue, ChunkGrid, GridSettings, PendingBuild};
