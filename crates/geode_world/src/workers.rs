//! # Background Workers
//!
//! ```text
//!   tick ──request──> [bounded job queue] ──> worker 1..N ──> ChunkStore::load
//!                                                   │
//!                                                   └──> [outcome channel] ──> tick
//!
//!   BackgroundFlusher ──every interval──> ChunkStore::flush_dirty
//! ```
//!
//! `request` never blocks the caller: a full queue refuses the job and the
//! scheduler asks again on a later tick.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use geode_procedural::ChunkCoord;
use parking_lot::Mutex;

use crate::error::{WorldError, WorldResult};
use crate::store::ChunkStore;

/// Result of one background load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Requested chunk.
    pub coord: ChunkCoord,
    /// `Ok` once the chunk is resident.
    pub result: WorldResult<()>,
}

/// Bounded pool of generation threads feeding the chunk store.
pub struct GenerationPool {
    jobs: Option<Sender<ChunkCoord>>,
    outcomes: Receiver<LoadOutcome>,
    queued: Arc<Mutex<HashSet<ChunkCoord>>>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl GenerationPool {
    /// Starts `threads` workers (at least one) sharing a queue of
    /// `capacity` pending jobs.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if a worker thread cannot be spawned.
    pub fn new(store: Arc<ChunkStore>, threads: usize, capacity: usize) -> WorldResult<Self> {
        let threads = threads.max(1);
        let (job_tx, job_rx) = bounded::<ChunkCoord>(capacity.max(1));
        let (outcome_tx, outcome_rx) = unbounded();
        let queued = Arc::new(Mutex::new(HashSet::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let store = Arc::clone(&store);
            let jobs = job_rx.clone();
            let outcomes = outcome_tx.clone();
            let queued = Arc::clone(&queued);
            let shutdown = Arc::clone(&shutdown);
            let handle = thread::Builder::new()
                .name(format!("geode-gen-{index}"))
                .spawn(move || Self::worker_loop(&store, &jobs, &outcomes, &queued, &shutdown))
                .map_err(|e| WorldError::InvalidConfig(format!("cannot spawn worker: {e}")))?;
            workers.push(handle);
        }

        tracing::info!(threads, capacity, "generation pool started");
        Ok(Self { jobs: Some(job_tx), outcomes: outcome_rx, queued, shutdown, workers })
    }

    /// Pool sized from the store's configuration.
    ///
    /// # Errors
    ///
    /// As [`Self::new`].
    pub fn from_store_config(store: Arc<ChunkStore>) -> WorldResult<Self> {
        let threads = store.config().resolved_worker_threads();
        let capacity = store.config().job_queue_capacity;
        Self::new(store, threads, capacity)
    }

    fn worker_loop(
        store: &ChunkStore,
        jobs: &Receiver<ChunkCoord>,
        outcomes: &Sender<LoadOutcome>,
        queued: &Mutex<HashSet<ChunkCoord>>,
        shutdown: &AtomicBool,
    ) {
        while let Ok(coord) = jobs.recv() {
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            let result = store.load(coord).map(|_| ());
            if let Err(e) = &result {
                tracing::warn!(%coord, error = %e, "background load failed");
            }
            queued.lock().remove(&coord);
            let _ = outcomes.send(LoadOutcome { coord, result });
        }
    }

    /// Queues a load. Returns `false` if the queue is full or the pool is
    /// shutting down; a coordinate already queued counts as accepted.
    pub fn request(&self, coord: ChunkCoord) -> bool {
        let Some(jobs) = &self.jobs else {
            return false;
        };
        let mut queued = self.queued.lock();
        if queued.contains(&coord) {
            return true;
        }
        match jobs.try_send(coord) {
            Ok(()) => {
                queued.insert(coord);
                true
            }
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }

    /// Completed loads, in completion order.
    #[must_use]
    pub fn outcomes(&self) -> &Receiver<LoadOutcome> {
        &self.outcomes
    }

    /// Takes every completed load without blocking.
    #[must_use]
    pub fn drain_outcomes(&self) -> Vec<LoadOutcome> {
        self.outcomes.try_iter().collect()
    }

    /// Jobs accepted but not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.queued.lock().len()
    }

    /// Worker thread count.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Stops accepting jobs, lets running loads finish and joins workers.
    /// Queued jobs that have not started are dropped.
    pub fn shutdown(&mut self) {
        if self.jobs.is_none() {
            return;
        }
        self.shutdown.store(true, Ordering::Release);
        self.jobs = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        self.queued.lock().clear();
        tracing::info!("generation pool stopped");
    }
}

impl Drop for GenerationPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for GenerationPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPool")
            .field("threads", &self.workers.len())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

/// Flusher counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlusherStats {
    /// Flush passes run, including the final one.
    pub passes: u64,
    /// Chunks written.
    pub chunks_saved: u64,
    /// Chunk saves that failed.
    pub failures: u64,
}

/// Periodically saves dirty chunks on a dedicated thread.
pub struct BackgroundFlusher {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<FlusherStats>>,
}

impl BackgroundFlusher {
    /// Starts flushing `store` every `interval`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the thread cannot be spawned.
    pub fn start(store: Arc<ChunkStore>, interval: Duration) -> WorldResult<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let stats = Arc::new(Mutex::new(FlusherStats::default()));
        let thread_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("geode-flush".to_owned())
            .spawn(move || Self::flush_loop(&store, &stop_rx, interval, &thread_stats))
            .map_err(|e| WorldError::InvalidConfig(format!("cannot spawn flusher: {e}")))?;

        tracing::info!(?interval, "background flusher started");
        Ok(Self { stop: Some(stop_tx), handle: Some(handle), stats })
    }

    fn flush_loop(
        store: &ChunkStore,
        stop: &Receiver<()>,
        interval: Duration,
        stats: &Mutex<FlusherStats>,
    ) {
        loop {
            let last = match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => false,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            };

            let report = store.flush_dirty();
            {
                let mut s = stats.lock();
                s.passes += 1;
                s.chunks_saved += report.saved as u64;
                s.failures += report.failures.len() as u64;
            }
            for (coord, error) in &report.failures {
                tracing::warn!(%coord, %error, "background flush could not save chunk");
            }

            if last {
                break;
            }
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> FlusherStats {
        *self.stats.lock()
    }

    /// Runs a final flush and joins the thread.
    pub fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            tracing::info!("background flusher stopped");
        }
    }
}

impl Drop for BackgroundFlusher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BackgroundFlusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundFlusher").field("stats", &self.stats()).finish_non_exhaustive()
    }
}
