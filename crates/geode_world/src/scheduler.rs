//! # Load-Policy Scheduler
//!
//! Decides which chunks to request and which to evict. Pure coordinate
//! math plus a pending queue; it never touches the store or the backend.
//!
//! Distances are Euclidean in chunk units, measured between chunk
//! coordinates. Orderings are total so equal inputs always produce equal
//! outputs.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use geode_procedural::{ChunkCoord, CHUNK_SIZE};

use crate::config::SchedulerConfig;

/// A viewpoint that keeps chunks loaded.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Observer {
    /// World position in blocks.
    pub position: [f64; 3],
    /// Velocity in blocks per second.
    pub velocity: [f64; 3],
}

impl Observer {
    /// Stationary observer.
    #[must_use]
    pub const fn at(x: f64, y: f64, z: f64) -> Self {
        Self { position: [x, y, z], velocity: [0.0; 3] }
    }

    /// Same observer moving with `velocity`.
    #[must_use]
    pub const fn moving(self, vx: f64, vy: f64, vz: f64) -> Self {
        Self { velocity: [vx, vy, vz], ..self }
    }

    /// Chunk containing the observer.
    #[must_use]
    pub fn chunk(&self) -> ChunkCoord {
        chunk_of(self.position[0], self.position[2])
    }

    /// Position extrapolated `horizon_secs` ahead.
    #[must_use]
    pub fn predicted(&self, horizon_secs: f64) -> Self {
        let [x, y, z] = self.position;
        let [vx, vy, vz] = self.velocity;
        Self {
            position: [x + vx * horizon_secs, y + vy * horizon_secs, z + vz * horizon_secs],
            velocity: self.velocity,
        }
    }
}

fn chunk_of(x: f64, z: f64) -> ChunkCoord {
    let size = CHUNK_SIZE as f64;
    let clamp = |v: f64| {
        let c = (v / size).floor();
        if c.is_nan() {
            0
        } else {
            c.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
        }
    };
    ChunkCoord::new(clamp(x), clamp(z))
}

/// Every chunk within `view_radius` of `center`.
fn disc(center: ChunkCoord, view_radius: u32) -> Vec<(ChunkCoord, i64)> {
    let r = i64::from(view_radius);
    let r_sq = r * r;
    let mut out = Vec::new();
    for dz in -r..=r {
        for dx in -r..=r {
            let d_sq = dx * dx + dz * dz;
            if d_sq > r_sq {
                continue;
            }
            let (Ok(x), Ok(z)) = (
                i32::try_from(i64::from(center.x) + dx),
                i32::try_from(i64::from(center.z) + dz),
            ) else {
                continue;
            };
            out.push((ChunkCoord::new(x, z), d_sq));
        }
    }
    out
}

/// Chunks within `view_radius` of the observer's chunk, nearest first,
/// ties broken by `(x, z)`.
#[must_use]
pub fn visible_chunks(observer: &Observer, view_radius: u32) -> Vec<ChunkCoord> {
    let mut chunks = disc(observer.chunk(), view_radius);
    chunks.sort_unstable_by(|(a, da), (b, db)| da.cmp(db).then_with(|| a.cmp(b)));
    chunks.into_iter().map(|(coord, _)| coord).collect()
}

/// Chunks within `view_radius` of where the observer will be after
/// `horizon_secs`. Nearest first; among equally distant chunks those
/// lying further along the direction of travel come first.
#[must_use]
pub fn predictive_chunks(observer: &Observer, horizon_secs: f64, view_radius: u32) -> Vec<ChunkCoord> {
    let center = observer.predicted(horizon_secs).chunk();
    let [vx, _, vz] = observer.velocity;
    let along = |c: ChunkCoord| {
        let dx = f64::from(c.x) - f64::from(center.x);
        let dz = f64::from(c.z) - f64::from(center.z);
        dx * vx + dz * vz
    };

    let mut chunks = disc(center, view_radius);
    chunks.sort_unstable_by(|(a, da), (b, db)| {
        da.cmp(db)
            .then_with(|| along(*b).total_cmp(&along(*a)))
            .then_with(|| a.cmp(b))
    });
    chunks.into_iter().map(|(coord, _)| coord).collect()
}

/// Retention radius for the given memory pressure.
///
/// Pressure is clamped to `[0, 1]`; NaN counts as full pressure.
#[must_use]
pub fn retention_radius(base_unload_distance: f64, memory_pressure: f64) -> f64 {
    let pressure = if memory_pressure.is_nan() { 1.0 } else { memory_pressure.clamp(0.0, 1.0) };
    base_unload_distance * (1.0 - pressure).max(0.5)
}

/// Loaded chunks farther than the retention radius from every observer.
/// With no observers every loaded chunk is a candidate.
#[must_use]
pub fn chunks_to_evict(
    loaded: &[ChunkCoord],
    observers: &[Observer],
    base_unload_distance: f64,
    memory_pressure: f64,
) -> BTreeSet<ChunkCoord> {
    let radius = retention_radius(base_unload_distance, memory_pressure);
    let radius_sq = radius * radius;
    let centers: Vec<ChunkCoord> = observers.iter().map(Observer::chunk).collect();

    loaded
        .iter()
        .copied()
        .filter(|coord| {
            centers.iter().all(|&center| coord.distance_sq(center) as f64 > radius_sq)
        })
        .collect()
}

/// A queued chunk request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    /// Chunk to load.
    pub coord: ChunkCoord,
    /// Higher is more urgent.
    pub priority: i64,
    /// Clock time the request was first made.
    pub requested_at: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct QueuedRequest {
    request: LoadRequest,
    seq: u64,
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.request.requested_at.cmp(&self.request.requested_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// What the caller should do this tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadPlan {
    /// Chunks to request, most urgent first.
    pub load: Vec<ChunkCoord>,
    /// Chunks to unload.
    pub evict: BTreeSet<ChunkCoord>,
}

/// Pending request queue with deduplication.
///
/// Stale heap entries (cancelled or superseded by a better priority) are
/// skipped lazily on pop, and swept out once they outnumber live requests.
#[derive(Debug)]
pub struct LoadScheduler {
    config: SchedulerConfig,
    heap: BinaryHeap<QueuedRequest>,
    /// Live request per coordinate and the sequence number of its heap entry.
    pending: HashMap<ChunkCoord, (LoadRequest, u64)>,
    next_seq: u64,
}

impl LoadScheduler {
    /// Stale entries tolerated before a sweep, on top of one per live request.
    const STALE_SLACK: usize = 64;

    /// Empty scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config, heap: BinaryHeap::new(), pending: HashMap::new(), next_seq: 0 }
    }

    /// Settings.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queues a request. A coordinate already pending keeps one entry with
    /// the better priority and its original request time. Returns whether
    /// the queue changed.
    pub fn enqueue(&mut self, request: LoadRequest) -> bool {
        let request = match self.pending.get(&request.coord) {
            Some((existing, _)) if existing.priority >= request.priority => return false,
            Some((existing, _)) => LoadRequest { requested_at: existing.requested_at, ..request },
            None => request,
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(request.coord, (request, seq));
        self.heap.push(QueuedRequest { request, seq });
        self.compact();
        true
    }

    /// Drops heap entries that no longer match a live request.
    fn compact(&mut self) {
        if self.heap.len() <= 2 * self.pending.len() + Self::STALE_SLACK {
            return;
        }
        let pending = &self.pending;
        self.heap.retain(|entry| {
            matches!(pending.get(&entry.request.coord), Some((_, seq)) if *seq == entry.seq)
        });
    }

    /// Most urgent pending request.
    pub fn pop(&mut self) -> Option<LoadRequest> {
        while let Some(entry) = self.heap.pop() {
            let live = matches!(
                self.pending.get(&entry.request.coord),
                Some((_, seq)) if *seq == entry.seq
            );
            if live {
                self.pending.remove(&entry.request.coord);
                return Some(entry.request);
            }
        }
        None
    }

    /// Drops a pending request. Returns whether one existed.
    pub fn cancel(&mut self, coord: ChunkCoord) -> bool {
        let removed = self.pending.remove(&coord).is_some();
        if removed {
            self.compact();
        }
        removed
    }

    /// Whether `coord` is queued.
    #[must_use]
    pub fn is_pending(&self, coord: ChunkCoord) -> bool {
        self.pending.contains_key(&coord)
    }

    /// Number of live requests.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Pops up to `max_requests_per_tick` requests, discarding those for
    /// which `is_resident` holds.
    pub fn next_batch(&mut self, is_resident: impl Fn(ChunkCoord) -> bool) -> Vec<ChunkCoord> {
        let mut batch = Vec::with_capacity(self.config.max_requests_per_tick);
        while batch.len() < self.config.max_requests_per_tick {
            let Some(request) = self.pop() else {
                break;
            };
            if !is_resident(request.coord) {
                batch.push(request.coord);
            }
        }
        batch
    }

    /// Queues every visible and predicted chunk not yet loaded, cancels
    /// requests nobody wants any more and computes the eviction set.
    pub fn plan(
        &mut self,
        observers: &[Observer],
        loaded: &[ChunkCoord],
        memory_pressure: f64,
        now: u64,
    ) -> LoadPlan {
        let resident: HashSet<ChunkCoord> = loaded.iter().copied().collect();
        let mut wanted = HashSet::new();

        for observer in observers {
            let here = observer.chunk();
            let visible = visible_chunks(observer, self.config.view_radius);
            let ahead = predictive_chunks(
                observer,
                self.config.prediction_horizon_secs,
                self.config.view_radius,
            );
            for coord in visible.into_iter().chain(ahead) {
                wanted.insert(coord);
                if resident.contains(&coord) {
                    continue;
                }
                self.enqueue(LoadRequest { coord, priority: -coord.distance_sq(here), requested_at: now });
            }
        }

        let stale: Vec<ChunkCoord> =
            self.pending.keys().copied().filter(|c| !wanted.contains(c)).collect();
        for coord in stale {
            self.cancel(coord);
        }

        LoadPlan {
            load: self.next_batch(|c| resident.contains(&c)),
            evict: chunks_to_evict(loaded, observers, self.config.base_unload_distance, memory_pressure),
        }
    }
}
