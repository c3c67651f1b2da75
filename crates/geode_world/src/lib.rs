//! # Geode World
//!
//! Chunk residency, lighting, persistence and streaming on top of
//! `geode_procedural`.
//!
//! ## Architecture
//!
//! ```text
//!   World ──tick──> LoadScheduler ──plan──> GenerationPool ──> ChunkStore
//!     │                                                          │   │
//!     └──get/set/light────────────────────────────────────────────┘   │
//!                                                                     ├──> TerrainGenerator + lighting
//!   BackgroundFlusher ──flush_dirty──> ChunkStore ──codec──> PersistenceBackend
//! ```
//!
//! ## Guarantees
//!
//! - At most one load or generation per coordinate is in flight.
//! - A chunk that fails to save stays resident and dirty.
//! - Block edits relight the chunk before the call returns.
//! - Positions outside `[0, CHUNK_HEIGHT)` are rejected before any chunk
//!   is touched.
//!
//! ## Example
//!
//! ```rust
//! use geode_procedural::{BlockId, BlockPos};
//! use geode_world::{World, WorldConfig};
//!
//! let world = World::in_memory(WorldConfig::with_seed(12345)).unwrap();
//! let pos = BlockPos::new(10, 200, -3);
//!
//! world.set_block(pos, BlockId::GLOWSTONE).unwrap();
//! assert_eq!(world.get_block(pos).unwrap(), BlockId::GLOWSTONE);
//! assert_eq!(world.light_level(pos).unwrap().block, 15);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::module_name_repetitions
)]

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod lighting;
pub mod persistence;
pub mod scheduler;
pub mod store;
pub mod workers;
pub mod world;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SchedulerConfig, StoreConfig, WorldConfig};
pub use error::{BackendError, CodecError, ConfigError, WorldError, WorldResult};
pub use events::{EventBus, LoadOrigin, WorldEvent};
pub use lighting::{
    compute_block_light, compute_lighting, compute_skylight, light_at, propagate_from, LightLevel,
};
pub use persistence::{retry_with_backoff, FileBackend, MemoryBackend, PersistenceBackend};
pub use scheduler::{
    chunks_to_evict, predictive_chunks, retention_radius, visible_chunks, LoadPlan, LoadRequest,
    LoadScheduler, Observer,
};
pub use store::{ChunkHandle, ChunkStore, FlushReport, StoreStats};
pub use workers::{BackgroundFlusher, FlusherStats, GenerationPool, LoadOutcome};
pub use world::{TickReport, World};
