//! Off-thread chunk extraction with main-thread completion
//!
//! Extraction runs on a dedicated rayon pool. Workers never touch chunk,
//! pool or collider state: they send the finished [`MeshData`] back over a
//! bounded tokio channel, and the owner drains it once per tick. A full
//! channel blocks the worker, not the owner. A builder that panics is
//! reported back as a failed build so the in-flight count stays exact.

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::pool::PoolHandle;
use crate::chunk::{BuildTicket, ChunkCoord};
use crate::core::{Error, Result};
use crate::mesh::{MeshBuilder, MeshData};

/// Completions buffered before workers start waiting on the owner
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Where extraction runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// On the calling thread, result applied immediately
    Inline,
    /// On the worker pool, result applied when drained
    #[default]
    Threaded,
}

/// A finished extraction on its way back to the owning thread
#[derive(Debug)]
pub struct CompletedBuild {
    pub coord: ChunkCoord,
    /// Chunk container the build was issued for
    pub handle: PoolHandle,
    pub ticket: BuildTicket,
    pub data: MeshData,
}

/// Worker outcome; `Err` carries the chunk whose builder panicked
type BuildOutcome = std::result::Result<CompletedBuild, ChunkCoord>;

/// Runs mesh builders inline or on worker threads
pub struct BuildDispatcher {
    mode: DispatchMode,
    workers: Option<rayon::ThreadPool>,
    result_tx: mpsc::Sender<BuildOutcome>,
    result_rx: mpsc::Receiver<BuildOutcome>,
    in_flight: usize,
}

impl BuildDispatcher {
    /// Create a dispatcher. `workers == 0` lets rayon pick one thread per core.
    pub fn new(mode: DispatchMode, workers: usize) -> Result<Self> {
        let pool = match mode {
            DispatchMode::Inline => None,
            DispatchMode::Threaded => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("chunk-build-{i}"))
                    .build()
                    .map_err(|e| Error::Config(format!("failed to start build workers: {e}")))?,
            ),
        };
        let (result_tx, result_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        log::debug!("Build dispatcher started in {:?} mode", mode);

        Ok(Self {
            mode,
            workers: pool,
            result_tx,
            result_rx,
            in_flight: 0,
        })
    }

    /// Dispatcher that always extracts on the calling thread
    pub fn inline() -> Self {
        let (result_tx, result_rx) = mpsc::channel(1);
        Self {
            mode: DispatchMode::Inline,
            workers: None,
            result_tx,
            result_rx,
            in_flight: 0,
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Builds dispatched to workers and not yet drained
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Run one build.
    ///
    /// Inline mode returns the result straight away. Threaded mode returns
    /// `None`; the result shows up in a later [`drain`](Self::drain).
    pub fn dispatch(
        &mut self,
        coord: ChunkCoord,
        handle: PoolHandle,
        ticket: BuildTicket,
        builder: Box<dyn MeshBuilder>,
    ) -> Option<CompletedBuild> {
        let Some(workers) = &self.workers else {
            return Some(CompletedBuild {
                coord,
                handle,
                ticket,
                data: builder.generate(),
            });
        };

        let tx = self.result_tx.clone();
        self.in_flight += 1;
        workers.spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| builder.generate()))
                .map(|data| CompletedBuild {
                    coord,
                    handle,
                    ticket,
                    data,
                })
                .map_err(|_| coord);
            if tx.blocking_send(outcome).is_err() {
                log::debug!("Build result for chunk {coord} dropped: dispatcher gone");
            }
        });
        None
    }

    /// Collect every finished build without blocking. Failed builds are
    /// logged and left out.
    pub fn drain(&mut self) -> Vec<CompletedBuild> {
        let mut completed = Vec::new();
        while let Ok(outcome) = self.result_rx.try_recv() {
            if let Some(result) = self.settle(outcome) {
                completed.push(result);
            }
        }
        completed
    }

    /// Block until the next build finishes. Returns `None` once nothing is
    /// in flight.
    pub fn wait(&mut self) -> Option<CompletedBuild> {
        while self.in_flight > 0 {
            let outcome = self.result_rx.blocking_recv()?;
            if let Some(result) = self.settle(outcome) {
                return Some(result);
            }
        }
        None
    }

    fn settle(&mut self, outcome: BuildOutcome) -> Option<CompletedBuild> {
        self.in_flight = self.in_flight.saturating_sub(1);
        match outcome {
            Ok(result) => Some(result),
            Err(coord) => {
                log::error!("Mesh build for chunk {coord} panicked; chunk stays unbuilt");
                None
            }
        }
    }
}

impl std::fmt::Debug for BuildDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildDispatcher")
            .field("mode", &self.mode)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}
