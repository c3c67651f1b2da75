//! # World Facade
//!
//! The API used by rendering, physics and gameplay code: block reads and
//! writes in world coordinates, light queries, and a per-tick streaming
//! step driven by observer positions.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use geode_procedural::{BlockId, BlockPos, ChunkCoord, LocalPos, TerrainGenerator, WorldSeed};
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::config::WorldConfig;
use crate::error::{WorldError, WorldResult};
use crate::events::WorldEvent;
use crate::lighting::{light_at, LightLevel};
use crate::persistence::{MemoryBackend, PersistenceBackend};
use crate::scheduler::{LoadScheduler, Observer};
use crate::store::{ChunkHandle, ChunkStore, FlushReport};
use crate::workers::{BackgroundFlusher, GenerationPool, LoadOutcome};

/// Result of one [`World::tick`].
#[derive(Debug, Default)]
pub struct TickReport {
    /// Background loads that finished since the previous tick.
    pub completed: Vec<LoadOutcome>,
    /// Loads handed to the generation pool.
    pub requested: usize,
    /// Chunks unloaded.
    pub evicted: usize,
    /// Evictions that failed to save; those chunks stay resident.
    pub failures: Vec<(ChunkCoord, WorldError)>,
}

/// A streaming voxel world.
pub struct World {
    config: WorldConfig,
    store: Arc<ChunkStore>,
    clock: Arc<dyn Clock>,
    scheduler: Mutex<LoadScheduler>,
    pool: GenerationPool,
    flusher: Option<BackgroundFlusher>,
    closed: bool,
}

impl World {
    /// Opens a world over `backend` using the wall clock.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate or worker
    /// threads cannot be started.
    pub fn open(config: WorldConfig, backend: Arc<dyn PersistenceBackend>) -> WorldResult<Self> {
        Self::open_with_clock(config, backend, Arc::new(SystemClock))
    }

    /// Opens a world whose chunks live only in memory.
    ///
    /// # Errors
    ///
    /// As [`Self::open`].
    pub fn in_memory(config: WorldConfig) -> WorldResult<Self> {
        Self::open(config, Arc::new(MemoryBackend::new()))
    }

    /// Opens a world with an explicit timestamp source.
    ///
    /// # Errors
    ///
    /// As [`Self::open`].
    pub fn open_with_clock(
        config: WorldConfig,
        backend: Arc<dyn PersistenceBackend>,
        clock: Arc<dyn Clock>,
    ) -> WorldResult<Self> {
        config.validate()?;

        let generator =
            TerrainGenerator::new(config.world_seed(), config.generation.clone(), Arc::new(config.registry()));
        let store = Arc::new(
            ChunkStore::new(generator, backend, config.store.clone()).with_clock(Arc::clone(&clock)),
        );
        let pool = GenerationPool::from_store_config(Arc::clone(&store))?;
        let flusher = match config.store.flush_interval() {
            Some(interval) => Some(BackgroundFlusher::start(Arc::clone(&store), interval)?),
            None => None,
        };

        tracing::info!(seed = config.seed, "world opened");
        Ok(Self {
            scheduler: Mutex::new(LoadScheduler::new(config.scheduler.clone())),
            config,
            store,
            clock,
            pool,
            flusher,
            closed: false,
        })
    }

    /// World seed.
    #[must_use]
    pub const fn seed(&self) -> WorldSeed {
        self.config.world_seed()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Underlying chunk store.
    #[must_use]
    pub const fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    fn ensure_open(&self) -> WorldResult<()> {
        if self.closed {
            Err(WorldError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn locate(pos: BlockPos) -> WorldResult<(ChunkCoord, LocalPos)> {
        pos.to_chunk_local()
            .ok_or(WorldError::InvalidCoordinate { x: pos.x, y: pos.y, z: pos.z })
    }

    /// Block at `pos`, loading its chunk if needed.
    ///
    /// # Errors
    ///
    /// `InvalidCoordinate` for y outside the world; load errors otherwise.
    pub fn get_block(&self, pos: BlockPos) -> WorldResult<BlockId> {
        self.ensure_open()?;
        let (coord, local) = Self::locate(pos)?;
        let handle = self.store.load(coord)?;
        let block = handle.read().block_at_index(local.index());
        Ok(block)
    }

    /// Replaces the block at `pos` and returns the previous one.
    ///
    /// # Errors
    ///
    /// `InvalidCoordinate` for y outside the world (nothing is touched),
    /// `ChunkNotLoaded` when auto-load is off, load errors otherwise.
    pub fn set_block(&self, pos: BlockPos, block: BlockId) -> WorldResult<BlockId> {
        self.ensure_open()?;
        let (coord, local) = Self::locate(pos)?;
        self.store.mutate_block(coord, local, block)
    }

    /// Sky and block light at `pos`.
    ///
    /// # Errors
    ///
    /// As [`Self::get_block`].
    pub fn light_level(&self, pos: BlockPos) -> WorldResult<LightLevel> {
        self.ensure_open()?;
        let (coord, local) = Self::locate(pos)?;
        let handle = self.store.load(coord)?;
        let level = light_at(&handle.read(), local);
        Ok(level)
    }

    /// Coordinates of resident chunks, in no particular order.
    #[must_use]
    pub fn loaded_chunk_coordinates(&self) -> Vec<ChunkCoord> {
        self.store.loaded_coords()
    }

    /// Loads a chunk synchronously.
    ///
    /// # Errors
    ///
    /// As [`ChunkStore::load`].
    pub fn load_chunk(&self, coord: ChunkCoord) -> WorldResult<ChunkHandle> {
        self.ensure_open()?;
        self.store.load(coord)
    }

    /// Unloads a chunk, saving it first if dirty.
    ///
    /// # Errors
    ///
    /// As [`ChunkStore::unload`].
    pub fn unload_chunk(&self, coord: ChunkCoord) -> WorldResult<bool> {
        self.ensure_open()?;
        self.store.unload(coord)
    }

    /// Background loads accepted but not yet finished.
    #[must_use]
    pub fn pending_loads(&self) -> usize {
        self.pool.in_flight()
    }

    /// Saves every dirty chunk now.
    pub fn flush(&self) -> FlushReport {
        self.store.flush_dirty()
    }

    /// Subscribes to world events.
    pub fn subscribe(&self) -> Receiver<WorldEvent> {
        self.store.subscribe()
    }

    /// Streaming step: collects finished background loads, requests the
    /// chunks the observers need and unloads the ones they left behind.
    ///
    /// Never waits for generation. Requests the pool refuses are planned
    /// again on the next tick.
    ///
    /// # Errors
    ///
    /// `ShuttingDown` after [`Self::shutdown`].
    pub fn tick(&self, observers: &[Observer], memory_pressure: f64) -> WorldResult<TickReport> {
        self.ensure_open()?;
        let now = self.clock.now_millis();
        let loaded = self.store.loaded_coords();
        let plan = self.scheduler.lock().plan(observers, &loaded, memory_pressure, now);

        let mut report = TickReport { completed: self.pool.drain_outcomes(), ..TickReport::default() };

        for coord in plan.load {
            if !self.pool.request(coord) {
                break;
            }
            report.requested += 1;
        }

        for coord in plan.evict {
            match self.store.unload(coord) {
                Ok(true) => report.evicted += 1,
                Ok(false) => {}
                Err(e) => report.failures.push((coord, e)),
            }
        }

        if report.requested > 0 || report.evicted > 0 {
            tracing::debug!(
                requested = report.requested,
                evicted = report.evicted,
                resident = self.store.resident_count(),
                "world tick"
            );
        }
        Ok(report)
    }

    /// Stops background workers and writes every dirty chunk. Further
    /// operations fail with `ShuttingDown`.
    pub fn shutdown(&mut self) -> FlushReport {
        if self.closed {
            return FlushReport::default();
        }
        self.closed = true;
        self.pool.shutdown();
        if let Some(mut flusher) = self.flusher.take() {
            flusher.shutdown();
        }
        let report = self.store.flush_dirty();
        for (coord, error) in &report.failures {
            tracing::warn!(%coord, %error, "chunk left unsaved at shutdown");
        }
        tracing::info!(saved = report.saved, "world shut down");
        report
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("seed", &self.config.seed)
            .field("store", &self.store)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
