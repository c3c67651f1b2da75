//! # Geode Procedural Generation
//!
//! Deterministic world generation for infinite, reproducible worlds.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: Same seed always produces the same world
//! 2. **Chunked**: World is generated in fixed-size vertical columns
//! 3. **Streamable**: Chunks can be generated/discarded independently
//! 4. **Pure**: No I/O, no global state, no locking
//!
//! ## Core Components
//!
//! - `SimplexNoise`: 2D/3D noise generation
//! - `Chunk`: Dense block, light, heightmap and biome arrays
//! - `BiomeClassifier`: Determines terrain types from noise values
//! - `TerrainGenerator`: Produces world chunks from noise
//! - `Registry`: Block light attributes and biome palettes
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use geode_procedural::{ChunkCoord, GenerationParams, StaticRegistry, TerrainGenerator, WorldSeed};
//!
//! let generator = TerrainGenerator::new(
//!     WorldSeed::new(12345),
//!     GenerationParams::default(),
//!     Arc::new(StaticRegistry::new()),
//! );
//!
//! let chunk = generator.generate(ChunkCoord::new(0, 0));
//! assert!(chunk.block(0, 0, 0).is_solid());
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
    clippy::cast_precision_loss
)]

pub mod biome;
pub mod chunk;
pub mod noise;
pub mod params;
pub mod registry;
pub mod terrain;

pub use biome::{Biome, BiomeClassifier, BiomePalette, Climate, Decoration, OreChance};
pub use chunk::{
    block_index, column_index, index_to_local, BlockId, BlockPos, Chunk, ChunkCoord, ChunkParts,
    LocalPos, ShapeMismatch, BLOCKS_PER_CHUNK, CHUNK_HEIGHT, CHUNK_SIZE, COLUMNS_PER_CHUNK, MAX_LIGHT,
};
pub use noise::{SimplexNoise, WorldSeed};
pub use params::GenerationParams;
pub use registry::{BlockOverride, BlockProperties, Registry, StaticRegistry};
pub use terrain::TerrainGenerator;
