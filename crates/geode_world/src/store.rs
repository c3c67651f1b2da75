//! # Chunk Store
//!
//! The live chunk cache and its persistence adapter.
//!
//! ## Lifecycle
//!
//! ```text
//!   Unloaded ──load──> Loading ──> Resident(clean) ⇄ Resident(dirty)
//!                                        │                 │
//!                                        └──── unload ─────┴──> Saving ──> Unloaded
//! ```
//!
//! ## Locking
//!
//! - `slots` (one map mutex) is held only for lookups and inserts, never
//!   across generation, lighting, encoding or backend calls.
//! - Each resident chunk has its own `RwLock<Chunk>`, so work on distinct
//!   coordinates never contends.
//! - Each resident chunk has an `io` mutex serializing save and unload of
//!   that coordinate: an unload waits for an in-flight save.
//! - A coordinate in `Loading` has exactly one loader; every other caller
//!   waits on the same pending load and receives the same result.
//! - `slots` may be locked while a chunk lock is held, never the reverse.
//!   Unload marks an entry evicted and drops it from `slots` while holding
//!   both, so no caller sees an evicted entry still mapped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use geode_procedural::{BlockId, BlockPos, Chunk, ChunkCoord, LocalPos, Registry, TerrainGenerator};
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard};

use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::config::StoreConfig;
use crate::error::{WorldError, WorldResult};
use crate::events::{EventBus, LoadOrigin, WorldEvent};
use crate::lighting;
use crate::persistence::{retry_with_backoff, PersistenceBackend};

/// A resident chunk and its per-coordinate synchronization.
#[derive(Debug)]
struct ChunkEntry {
    coord: ChunkCoord,
    chunk: RwLock<Chunk>,
    /// Serializes save and unload of this coordinate.
    io: Mutex<()>,
    /// Bumped on every mutation, under the chunk write lock.
    version: AtomicU64,
    /// Set under the chunk write lock once the entry left the cache.
    evicted: AtomicBool,
}

impl ChunkEntry {
    fn new(chunk: Chunk) -> Self {
        Self {
            coord: chunk.coord(),
            chunk: RwLock::new(chunk),
            io: Mutex::new(()),
            version: AtomicU64::new(0),
            evicted: AtomicBool::new(false),
        }
    }
}

/// Shared handle to a resident chunk.
///
/// Stays readable after the chunk is evicted; it then shows the data as it
/// was when it left the cache.
#[derive(Clone, Debug)]
pub struct ChunkHandle {
    entry: Arc<ChunkEntry>,
}

impl ChunkHandle {
    /// Chunk coordinate.
    #[must_use]
    pub fn coord(&self) -> ChunkCoord {
        self.entry.coord
    }

    /// Read access to the chunk.
    pub fn read(&self) -> RwLockReadGuard<'_, Chunk> {
        self.entry.chunk.read()
    }

    /// Owned copy of the chunk.
    #[must_use]
    pub fn snapshot(&self) -> Chunk {
        self.entry.chunk.read().clone()
    }

    /// Mutation counter.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.entry.version.load(Ordering::Acquire)
    }

    /// Whether the chunk has left the cache.
    #[must_use]
    pub fn is_evicted(&self) -> bool {
        self.entry.evicted.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same resident instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

/// Single-flight load shared by every caller of the same coordinate.
#[derive(Debug, Default)]
struct PendingLoad {
    result: Mutex<Option<WorldResult<Arc<ChunkEntry>>>>,
    condvar: Condvar,
}

impl PendingLoad {
    fn complete(&self, result: WorldResult<Arc<ChunkEntry>>) {
        let mut slot = self.result.lock();
        *slot = Some(result);
        self.condvar.notify_all();
    }

    fn wait(&self) -> WorldResult<Arc<ChunkEntry>> {
        let mut slot = self.result.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            self.condvar.wait(&mut slot);
        }
    }
}

#[derive(Clone, Debug)]
enum Slot {
    Loading(Arc<PendingLoad>),
    Resident(Arc<ChunkEntry>),
}

/// Completes the pending load with an error if the loader unwinds before
/// publishing a result.
struct LoadGuard<'a> {
    store: &'a ChunkStore,
    coord: ChunkCoord,
    pending: Arc<PendingLoad>,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut slots = self.store.slots.lock();
            if matches!(slots.get(&self.coord), Some(Slot::Loading(p)) if Arc::ptr_eq(p, &self.pending)) {
                slots.remove(&self.coord);
            }
        }
        self.pending.complete(Err(WorldError::Generation(format!(
            "load of chunk {} aborted",
            self.coord
        ))));
    }
}

/// Store counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Chunks produced by the terrain generator.
    pub generated: u64,
    /// Chunks decoded from the backend.
    pub loaded: u64,
    /// Successful backend writes.
    pub saved: u64,
    /// Saves that failed after every retry.
    pub save_failures: u64,
    /// Chunks removed from the cache.
    pub evicted: u64,
}

/// Outcome of [`ChunkStore::flush_dirty`].
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Chunks written.
    pub saved: usize,
    /// Chunks that could not be written; they remain dirty.
    pub failures: Vec<(ChunkCoord, WorldError)>,
}

impl FlushReport {
    /// Whether every dirty chunk was written.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The live chunk cache.
pub struct ChunkStore {
    generator: TerrainGenerator,
    backend: Arc<dyn PersistenceBackend>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    slots: Mutex<HashMap<ChunkCoord, Slot>>,
    events: EventBus,
    stats: Mutex<StoreStats>,
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("seed", &self.generator.seed())
            .field("resident", &self.resident_count())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ChunkStore {
    /// Creates an empty store using the wall clock.
    #[must_use]
    pub fn new(
        generator: TerrainGenerator,
        backend: Arc<dyn PersistenceBackend>,
        config: StoreConfig,
    ) -> Self {
        tracing::info!(
            seed = generator.seed().value(),
            auto_load = config.auto_load,
            max_save_attempts = config.max_save_attempts,
            "chunk store created"
        );
        Self {
            generator,
            backend,
            clock: Arc::new(SystemClock),
            config,
            slots: Mutex::new(HashMap::new()),
            events: EventBus::new(),
            stats: Mutex::new(StoreStats::default()),
        }
    }

    /// Replaces the timestamp source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Store settings.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Terrain generator used for chunks the backend does not have.
    #[must_use]
    pub const fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    fn registry(&self) -> &dyn Registry {
        self.generator.registry().as_ref()
    }

    /// Subscribes to store events.
    pub fn subscribe(&self) -> Receiver<WorldEvent> {
        self.events.subscribe()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        *self.stats.lock()
    }

    /// Returns the resident chunk, reading or generating it if needed.
    ///
    /// Concurrent calls for the same coordinate share one backend read or
    /// generation and all receive the same result.
    ///
    /// # Errors
    ///
    /// `PersistenceRead` when the backend keeps failing, `Corrupted` when
    /// the stored blob does not decode.
    pub fn load(&self, coord: ChunkCoord) -> WorldResult<ChunkHandle> {
        let pending = {
            let mut slots = self.slots.lock();
            match slots.get(&coord) {
                Some(Slot::Resident(entry)) => {
                    return Ok(ChunkHandle { entry: Arc::clone(entry) });
                }
                Some(Slot::Loading(pending)) => {
                    let pending = Arc::clone(pending);
                    drop(slots);
                    return pending.wait().map(|entry| ChunkHandle { entry });
                }
                None => {
                    let pending = Arc::new(PendingLoad::default());
                    slots.insert(coord, Slot::Loading(Arc::clone(&pending)));
                    pending
                }
            }
        };

        let mut guard = LoadGuard { store: self, coord, pending, armed: true };
        let fetched = self.fetch(coord).map(|(chunk, origin)| (Arc::new(ChunkEntry::new(chunk)), origin));

        {
            let mut slots = self.slots.lock();
            match &fetched {
                Ok((entry, _)) => slots.insert(coord, Slot::Resident(Arc::clone(entry))),
                Err(_) => slots.remove(&coord),
            };
        }
        guard.armed = false;

        let shared = fetched.as_ref().map(|(entry, _)| Arc::clone(entry)).map_err(Clone::clone);
        guard.pending.complete(shared.clone());

        if let Ok((_, origin)) = fetched {
            self.events.publish(&WorldEvent::ChunkLoaded { coord, origin });
        }
        shared.map(|entry| ChunkHandle { entry })
    }

    /// Backend read, falling back to generation plus lighting.
    fn fetch(&self, coord: ChunkCoord) -> WorldResult<(Chunk, LoadOrigin)> {
        let key = coord.storage_key();
        let attempts = self.config.max_read_attempts;
        let blob = retry_with_backoff("chunk read", attempts, self.config.backoff_base(), || {
            self.backend.read(&key)
        })
        .map_err(|e| WorldError::PersistenceRead { coord, attempts, reason: e.to_string() })?;

        if let Some(bytes) = blob {
            let chunk = codec::decode(&bytes)
                .map_err(|e| WorldError::Corrupted { coord, reason: e.to_string() })?;
            if chunk.coord() != coord {
                return Err(WorldError::Corrupted {
                    coord,
                    reason: format!("blob holds chunk {}", chunk.coord()),
                });
            }
            self.stats.lock().loaded += 1;
            tracing::debug!(%coord, bytes = bytes.len(), "chunk loaded from backend");
            return Ok((chunk, LoadOrigin::Persisted));
        }

        let mut chunk = self.generator.generate(coord);
        lighting::compute_lighting(&mut chunk, self.registry());
        self.stats.lock().generated += 1;
        tracing::debug!(%coord, biome = ?chunk.biome(), "chunk generated");
        Ok((chunk, LoadOrigin::Generated))
    }

    /// Resident entry, waiting out an in-flight load. `None` if absent or
    /// the load failed.
    fn settled_entry(&self, coord: ChunkCoord) -> Option<Arc<ChunkEntry>> {
        let slot = self.slots.lock().get(&coord).cloned();
        match slot? {
            Slot::Resident(entry) => Some(entry),
            Slot::Loading(pending) => pending.wait().ok(),
        }
    }

    /// Evicts a chunk, saving it first if dirty.
    ///
    /// Waits for an in-flight load or save of the same coordinate. Returns
    /// whether a chunk was evicted; unloading a non-resident coordinate is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// `PersistenceWrite` if the final save fails. The chunk then stays
    /// resident and dirty.
    pub fn unload(&self, coord: ChunkCoord) -> WorldResult<bool> {
        loop {
            let Some(entry) = self.settled_entry(coord) else {
                return Ok(false);
            };
            let _io = entry.io.lock();
            if entry.evicted.load(Ordering::Acquire) {
                continue;
            }

            loop {
                let dirty = entry.chunk.read().is_dirty();
                if dirty {
                    if let Err(e) = self.save_locked(&entry) {
                        tracing::warn!(%coord, error = %e, "unload aborted, chunk kept resident");
                        return Err(e);
                    }
                }
                let chunk = entry.chunk.write();
                if chunk.is_dirty() {
                    continue;
                }
                let mut slots = self.slots.lock();
                entry.evicted.store(true, Ordering::Release);
                if matches!(slots.get(&coord), Some(Slot::Resident(e)) if Arc::ptr_eq(e, &entry)) {
                    slots.remove(&coord);
                }
                drop(slots);
                drop(chunk);
                break;
            }

            self.stats.lock().evicted += 1;
            tracing::debug!(%coord, "chunk unloaded");
            self.events.publish(&WorldEvent::ChunkUnloaded(coord));
            return Ok(true);
        }
    }

    /// Writes a resident chunk if it is dirty. Returns whether a write
    /// happened.
    ///
    /// # Errors
    ///
    /// `PersistenceWrite` after the retry budget is exhausted.
    pub fn save(&self, coord: ChunkCoord) -> WorldResult<bool> {
        let Some(entry) = self.resident_entry(coord) else {
            return Ok(false);
        };
        let _io = entry.io.lock();
        if entry.evicted.load(Ordering::Acquire) || !entry.chunk.read().is_dirty() {
            return Ok(false);
        }
        self.save_locked(&entry).map(|()| true)
    }

    /// Saves every dirty resident chunk.
    pub fn flush_dirty(&self) -> FlushReport {
        let entries: Vec<Arc<ChunkEntry>> = self
            .slots
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Resident(entry) => Some(Arc::clone(entry)),
                Slot::Loading(_) => None,
            })
            .collect();

        let mut report = FlushReport::default();
        for entry in entries {
            let _io = entry.io.lock();
            if entry.evicted.load(Ordering::Acquire) || !entry.chunk.read().is_dirty() {
                continue;
            }
            match self.save_locked(&entry) {
                Ok(()) => report.saved += 1,
                Err(e) => report.failures.push((entry.coord, e)),
            }
        }
        if report.saved > 0 || !report.is_clean() {
            tracing::debug!(saved = report.saved, failed = report.failures.len(), "dirty flush finished");
        }
        report
    }

    /// Encodes and writes one chunk. Caller holds `entry.io`.
    fn save_locked(&self, entry: &ChunkEntry) -> WorldResult<()> {
        let coord = entry.coord;
        let (blob, version) = {
            let chunk = entry.chunk.read();
            (codec::encode_saved(&chunk), entry.version.load(Ordering::Acquire))
        };

        let key = coord.storage_key();
        let attempts = self.config.max_save_attempts;
        let written = retry_with_backoff("chunk write", attempts, self.config.backoff_base(), || {
            self.backend.write(&key, &blob)
        });

        match written {
            Ok(()) => {
                {
                    let mut chunk = entry.chunk.write();
                    if entry.version.load(Ordering::Acquire) == version {
                        chunk.mark_clean();
                    }
                }
                self.stats.lock().saved += 1;
                tracing::debug!(%coord, bytes = blob.len(), "chunk saved");
                self.events.publish(&WorldEvent::ChunkSaved(coord));
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                self.stats.lock().save_failures += 1;
                self.events.publish(&WorldEvent::SaveFailed { coord, reason: reason.clone() });
                Err(WorldError::PersistenceWrite { coord, attempts, reason })
            }
        }
    }

    fn resident_entry(&self, coord: ChunkCoord) -> Option<Arc<ChunkEntry>> {
        match self.slots.lock().get(&coord) {
            Some(Slot::Resident(entry)) => Some(Arc::clone(entry)),
            _ => None,
        }
    }

    /// Replaces one block, updating heightmap and lighting, and marks the
    /// chunk dirty. Returns the previous block.
    ///
    /// Loads the chunk first when `auto_load` is on. Writing the block
    /// already present changes nothing.
    ///
    /// # Errors
    ///
    /// `ChunkOutOfRange` when the block has no `i32` world position,
    /// `ChunkNotLoaded` when the chunk is absent and `auto_load` is off;
    /// any [`Self::load`] error otherwise.
    pub fn mutate_block(&self, coord: ChunkCoord, local: LocalPos, block: BlockId) -> WorldResult<BlockId> {
        let pos = BlockPos::from_chunk_local(coord, local).ok_or(WorldError::ChunkOutOfRange(coord))?;
        // An evicted entry is already unmapped, so each retry sees a fresh slot
        loop {
            let entry = match self.resident_entry(coord) {
                Some(entry) => entry,
                None if self.config.auto_load => self.load(coord)?.entry,
                None => match self.settled_entry(coord) {
                    Some(entry) => entry,
                    None => return Err(WorldError::ChunkNotLoaded(coord)),
                },
            };

            let mut chunk = entry.chunk.write();
            if entry.evicted.load(Ordering::Acquire) {
                continue;
            }
            let old = chunk.set_block(local.x, local.y, local.z, block);
            if old == block {
                return Ok(old);
            }
            lighting::propagate_from(&mut chunk, self.registry(), local);
            chunk.mark_dirty(self.clock.now_millis());
            entry.version.fetch_add(1, Ordering::AcqRel);
            drop(chunk);

            self.events.publish(&WorldEvent::BlockChanged { pos, old, new: block });
            return Ok(old);
        }
    }

    /// Runs `f` on a resident chunk without loading it.
    pub fn with_chunk<R>(&self, coord: ChunkCoord, f: impl FnOnce(&Chunk) -> R) -> Option<R> {
        let entry = self.resident_entry(coord)?;
        let chunk = entry.chunk.read();
        Some(f(&chunk))
    }

    /// Whether the chunk is resident (not merely loading).
    #[must_use]
    pub fn is_resident(&self, coord: ChunkCoord) -> bool {
        matches!(self.slots.lock().get(&coord), Some(Slot::Resident(_)))
    }

    /// Number of resident chunks.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.slots.lock().values().filter(|s| matches!(s, Slot::Resident(_))).count()
    }

    /// Coordinates of resident chunks, in no particular order.
    #[must_use]
    pub fn loaded_coords(&self) -> Vec<ChunkCoord> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Resident(_)))
            .map(|(coord, _)| *coord)
            .collect()
    }

    /// Handles to every resident chunk, in no particular order.
    #[must_use]
    pub fn loaded(&self) -> Vec<ChunkHandle> {
        self.slots
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Resident(entry) => Some(ChunkHandle { entry: Arc::clone(entry) }),
                Slot::Loading(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::MemoryBackend;
    use geode_procedural::{GenerationParams, StaticRegistry, WorldSeed, CHUNK_HEIGHT};

    fn store_with(backend: Arc<MemoryBackend>, config: StoreConfig) -> ChunkStore {
        let generator = TerrainGenerator::new(
            WorldSeed::new(42),
            GenerationParams::default(),
            Arc::new(StaticRegistry::new()),
        );
        ChunkStore::new(generator, backend, config)
    }

    fn fast_config() -> StoreConfig {
        StoreConfig { backoff_base_ms: 0, ..StoreConfig::default() }
    }

    fn top_air() -> LocalPos {
        LocalPos::new(3, CHUNK_HEIGHT - 2, 4).unwrap()
    }

    #[test]
    fn test_load_generates_then_caches() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), fast_config());
        let coord = ChunkCoord::new(0, 0);

        let first = store.load(coord).unwrap();
        let second = store.load(coord).unwrap();

        assert!(first.same_instance(&second));
        assert_eq!(store.stats().generated, 1);
        assert_eq!(backend.read_count(), 1);
        assert!(!first.read().is_dirty());
        assert!(store.is_resident(coord));
    }

    #[test]
    fn test_mutation_marks_dirty_and_relights() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = store_with(Arc::new(MemoryBackend::new()), fast_config()).with_clock(clock.clone());
        let coord = ChunkCoord::new(1, -1);
        let handle = store.load(coord).unwrap();
        let pos = top_air();

        clock.advance(5);
        let old = store.mutate_block(coord, pos, BlockId::GLOWSTONE).unwrap();

        assert_eq!(old, BlockId::AIR);
        let chunk = handle.read();
        assert!(chunk.is_dirty());
        assert_eq!(chunk.last_modified(), 1_005);
        assert_eq!(chunk.height(pos.x, pos.z), pos.y);
        assert_eq!(chunk.block_light(pos.x, pos.y, pos.z), 15);
        assert_eq!(handle.version(), 1);
    }

    #[test]
    fn test_same_block_write_is_noop() {
        let store = store_with(Arc::new(MemoryBackend::new()), fast_config());
        let coord = ChunkCoord::new(0, 0);
        let handle = store.load(coord).unwrap();
        let pos = top_air();

        store.mutate_block(coord, pos, BlockId::AIR).unwrap();
        assert!(!handle.read().is_dirty());
        assert_eq!(handle.version(), 0);
    }

    #[test]
    fn test_unload_persists_and_reload_reads_back() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), fast_config());
        let coord = ChunkCoord::new(5, 5);
        let pos = LocalPos::new(0, 300, 0).unwrap();

        store.mutate_block(coord, pos, BlockId::STONE).unwrap();
        let before = store.load(coord).unwrap().snapshot();
        assert!(store.unload(coord).unwrap());
        assert!(!store.is_resident(coord));
        assert!(backend.contains(&coord.storage_key()));

        let after = store.load(coord).unwrap();
        assert_eq!(after.read().blocks(), before.blocks());
        assert_eq!(after.read().block(0, 300, 0), BlockId::STONE);
        assert!(!after.read().is_dirty());
        assert_eq!(store.stats().loaded, 1);
        assert_eq!(store.stats().generated, 1);
    }

    #[test]
    fn test_clean_unload_skips_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), fast_config());
        store.load(ChunkCoord::new(0, 0)).unwrap();

        assert!(store.unload(ChunkCoord::new(0, 0)).unwrap());
        assert_eq!(backend.write_count(), 0);
        assert!(!store.unload(ChunkCoord::new(0, 0)).unwrap());
    }

    #[test]
    fn test_failed_unload_keeps_chunk_dirty() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), fast_config());
        let coord = ChunkCoord::new(2, 3);
        let events = store.subscribe();
        store.mutate_block(coord, LocalPos::new(1, 1, 1).unwrap(), BlockId::GLOWSTONE).unwrap();

        backend.fail_next_writes(3);
        let err = store.unload(coord).unwrap_err();

        assert!(matches!(err, WorldError::PersistenceWrite { attempts: 3, .. }));
        assert!(store.is_resident(coord));
        assert!(store.with_chunk(coord, Chunk::is_dirty).unwrap());
        assert_eq!(store.stats().save_failures, 1);
        assert!(events.try_iter().any(|e| matches!(e, WorldEvent::SaveFailed { .. })));

        assert!(store.unload(coord).unwrap());
    }

    #[test]
    fn test_auto_load_off_rejects_mutation() {
        let config = StoreConfig { auto_load: false, ..fast_config() };
        let store = store_with(Arc::new(MemoryBackend::new()), config);
        let coord = ChunkCoord::new(9, 9);

        let err = store.mutate_block(coord, LocalPos::new(0, 0, 0).unwrap(), BlockId::AIR).unwrap_err();
        assert_eq!(err, WorldError::ChunkNotLoaded(coord));
        assert!(!store.is_resident(coord));
    }

    #[test]
    fn test_corrupted_blob_is_reported() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw("0:0", b"garbage".to_vec());
        let store = store_with(backend, fast_config());

        let err = store.load(ChunkCoord::new(0, 0)).unwrap_err();
        assert!(matches!(err, WorldError::Corrupted { .. }));
        assert!(!store.is_resident(ChunkCoord::new(0, 0)));
    }

    #[test]
    fn test_read_failures_are_retried() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next_reads(2);
        let store = store_with(backend.clone(), fast_config());

        assert!(store.load(ChunkCoord::new(0, 0)).is_ok());
        assert_eq!(backend.read_count(), 3);

        backend.fail_next_reads(10);
        let err = store.load(ChunkCoord::new(1, 0)).unwrap_err();
        assert!(matches!(err, WorldError::PersistenceRead { attempts: 3, .. }));
    }

    #[test]
    fn test_flush_dirty_saves_everything() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), fast_config());
        for x in 0..3 {
            store.mutate_block(ChunkCoord::new(x, 0), LocalPos::new(0, 200, 0).unwrap(), BlockId::DIRT).unwrap();
        }
        store.load(ChunkCoord::new(7, 7)).unwrap();

        let report = store.flush_dirty();
        assert_eq!(report.saved, 3);
        assert!(report.is_clean());
        assert_eq!(backend.len(), 3);
        assert!(store.loaded().iter().all(|h| !h.read().is_dirty()));
        assert_eq!(store.flush_dirty().saved, 0);
    }

    #[test]
    fn test_events_follow_lifecycle() {
        let store = store_with(Arc::new(MemoryBackend::new()), fast_config());
        let events = store.subscribe();
        let coord = ChunkCoord::new(0, 1);
        let pos = LocalPos::new(2, 250, 2).unwrap();

        store.mutate_block(coord, pos, BlockId::TORCH).unwrap();
        store.unload(coord).unwrap();

        let seen: Vec<WorldEvent> = events.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                WorldEvent::ChunkLoaded { coord, origin: LoadOrigin::Generated },
                WorldEvent::BlockChanged {
                    pos: BlockPos::from_chunk_local(coord, pos).unwrap(),
                    old: BlockId::AIR,
                    new: BlockId::TORCH,
                },
                WorldEvent::ChunkSaved(coord),
                WorldEvent::ChunkUnloaded(coord),
            ]
        );
    }

    #[test]
    fn test_mutation_past_block_range_is_rejected() {
        let store = store_with(Arc::new(MemoryBackend::new()), fast_config());
        let far = ChunkCoord::new(i32::MAX / 16 + 1, 0);

        // Loading works; only block addressing is out of range
        let handle = store.load(far).unwrap();
        assert_eq!(handle.coord(), far);
        assert_eq!(
            store.mutate_block(far, top_air(), BlockId::STONE),
            Err(WorldError::ChunkOutOfRange(far))
        );
        assert!(!handle.read().is_dirty());
        assert_eq!(handle.version(), 0);

        let edge = ChunkCoord::new(i32::MAX / 16, i32::MIN / 16);
        store.mutate_block(edge, top_air(), BlockId::STONE).unwrap();
        assert_eq!(store.with_chunk(edge, |c| c.block(3, CHUNK_HEIGHT - 2, 4)), Some(BlockId::STONE));
    }

    #[test]
    fn test_evicted_entries_are_never_mapped() {
        let store = Arc::new(store_with(Arc::new(MemoryBackend::new()), fast_config()));
        let coord = ChunkCoord::new(2, -2);
        let pos = top_air();

        let unloader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    store.unload(coord).unwrap();
                    std::thread::yield_now();
                }
            })
        };

        for i in 0..400 {
            let block = if i % 2 == 0 { BlockId::DIRT } else { BlockId::SAND };
            store.mutate_block(coord, pos, block).unwrap();

            let slots = store.slots.lock();
            if let Some(Slot::Resident(entry)) = slots.get(&coord) {
                assert!(!entry.evicted.load(Ordering::Acquire), "evicted chunk {coord} still mapped");
            }
        }
        unloader.join().unwrap();

        let handle = store.load(coord).unwrap();
        assert_eq!(handle.read().block(pos.x, pos.y, pos.z), BlockId::SAND);
    }
}
