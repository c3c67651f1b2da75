//! # World Error Types
//!
//! All errors that can occur in the world engine.

use geode_procedural::{ChunkCoord, ShapeMismatch};
use thiserror::Error;

/// Errors surfaced by the world engine.
///
/// `Clone` so a single in-flight load can hand the same result to every
/// waiting caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// Generation or lighting failed. Indicates a configuration defect.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Reading a chunk from the backend failed after every retry.
    #[error("reading chunk {coord} failed after {attempts} attempts: {reason}")]
    PersistenceRead {
        /// Chunk being read.
        coord: ChunkCoord,
        /// Attempts made.
        attempts: u32,
        /// Last backend error.
        reason: String,
    },

    /// Writing a chunk to the backend failed after every retry.
    ///
    /// The chunk stays resident and dirty.
    #[error("saving chunk {coord} failed after {attempts} attempts: {reason}")]
    PersistenceWrite {
        /// Chunk being saved.
        coord: ChunkCoord,
        /// Attempts made.
        attempts: u32,
        /// Last backend error.
        reason: String,
    },

    /// A mutation targeted a chunk that is not resident and auto-load is off.
    #[error("chunk {0} is not loaded")]
    ChunkNotLoaded(ChunkCoord),

    /// Position outside the world height bounds.
    #[error("invalid coordinate ({x}, {y}, {z}): y outside world height")]
    InvalidCoordinate {
        /// World X.
        x: i32,
        /// World Y.
        y: i32,
        /// World Z.
        z: i32,
    },

    /// The chunk lies past the `i32` block range, so its blocks have no
    /// world position to report.
    #[error("chunk {0} is outside the addressable block range")]
    ChunkOutOfRange(ChunkCoord),

    /// A persisted blob could not be decoded.
    #[error("chunk {coord} is corrupted: {reason}")]
    Corrupted {
        /// Chunk whose blob failed to decode.
        coord: ChunkCoord,
        /// Decoder error.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The component has been shut down.
    #[error("world is shutting down")]
    ShuttingDown,
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;

/// Errors raised by a persistence backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend refused or could not service the request.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while decoding a chunk blob.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Blob does not start with the chunk magic.
    #[error("bad magic")]
    BadMagic,

    /// Blob was written by an unknown format version.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    /// Blob was written with different chunk dimensions.
    #[error("dimension mismatch: blob is {size}x{height}")]
    DimensionMismatch {
        /// Horizontal size in the blob.
        size: u16,
        /// Height in the blob.
        height: u16,
    },

    /// Blob ends before the declared data.
    #[error("truncated blob: {0}")]
    Truncated(&'static str),

    /// Payload checksum does not match.
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Stored CRC32.
        stored: u32,
        /// Recomputed CRC32.
        computed: u32,
    },

    /// LZ4 payload could not be decompressed.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// Unknown biome discriminant.
    #[error("unknown biome id {0}")]
    UnknownBiome(u8),

    /// Header biome disagrees with the chunk's biome array.
    #[error("header biome {header} does not match payload biome {payload}")]
    BiomeMismatch {
        /// Biome id in the header.
        header: u8,
        /// Biome id of the first column in the payload.
        payload: u8,
    },

    /// Decoded arrays have the wrong shape.
    #[error("bad shape: {0}")]
    Shape(#[from] ShapeMismatch),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for the schema.
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for WorldError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
