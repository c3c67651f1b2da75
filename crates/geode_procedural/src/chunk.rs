//! # Chunk Data Model
//!
//! World data is organized into fixed-size vertical columns ("chunks") for:
//! - Memory efficiency (only load nearby chunks)
//! - Fast streaming (generate/discard on demand)
//! - Independent persistence (one blob per chunk)
//!
//! ## Layout
//!
//! Chunks are 16x16x384 blocks (width x depth x height). Every per-block
//! array is dense and shares the same index:
//!
//! ```text
//! index = ly * S * S + lz * S + lx
//! ```
//!
//! Per-column arrays (heightmap, biome) use `lz * S + lx`. The arrays are
//! allocated once at construction and are never resized independently.

use bytemuck::{Pod, Zeroable};

use crate::biome::Biome;

/// Chunk width/depth in blocks (S).
pub const CHUNK_SIZE: usize = 16;

/// Chunk height in blocks (H).
pub const CHUNK_HEIGHT: usize = 384;

/// Number of columns per chunk.
pub const COLUMNS_PER_CHUNK: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Total blocks per chunk.
pub const BLOCKS_PER_CHUNK: usize = COLUMNS_PER_CHUNK * CHUNK_HEIGHT;

/// Maximum value of either light channel.
pub const MAX_LIGHT: u8 = 15;

/// Converts local coordinates to a block index.
///
/// Out-of-range input is a programming error.
#[inline]
#[must_use]
pub const fn block_index(lx: usize, ly: usize, lz: usize) -> usize {
    debug_assert!(lx < CHUNK_SIZE && ly < CHUNK_HEIGHT && lz < CHUNK_SIZE);
    ly * COLUMNS_PER_CHUNK + lz * CHUNK_SIZE + lx
}

/// Converts a column position to a heightmap/biome index.
#[inline]
#[must_use]
pub const fn column_index(lx: usize, lz: usize) -> usize {
    debug_assert!(lx < CHUNK_SIZE && lz < CHUNK_SIZE);
    lz * CHUNK_SIZE + lx
}

/// Inverse of [`block_index`].
#[inline]
#[must_use]
pub const fn index_to_local(index: usize) -> LocalPos {
    debug_assert!(index < BLOCKS_PER_CHUNK);
    LocalPos {
        x: index % CHUNK_SIZE,
        y: index / COLUMNS_PER_CHUNK,
        z: (index / CHUNK_SIZE) % CHUNK_SIZE,
    }
}

/// Block type identifier.
///
/// The numeric catalog below is the built-in one; light attributes come
/// from a [`crate::Registry`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct BlockId(pub u16);

impl BlockId {
    /// Air block (empty).
    pub const AIR: Self = Self(0);
    /// Stone block.
    pub const STONE: Self = Self(1);
    /// Dirt block.
    pub const DIRT: Self = Self(2);
    /// Grass block.
    pub const GRASS: Self = Self(3);
    /// Sand block.
    pub const SAND: Self = Self(4);
    /// Sandstone block.
    pub const SANDSTONE: Self = Self(5);
    /// Snow block.
    pub const SNOW: Self = Self(6);
    /// Gravel block.
    pub const GRAVEL: Self = Self(7);
    /// Bedrock block.
    pub const BEDROCK: Self = Self(8);
    /// Water (fluid).
    pub const WATER: Self = Self(9);
    /// Lava (fluid, emissive).
    pub const LAVA: Self = Self(10);
    /// Wood/Log block.
    pub const WOOD: Self = Self(11);
    /// Leaves block.
    pub const LEAVES: Self = Self(12);
    /// Cactus block.
    pub const CACTUS: Self = Self(13);
    /// Coal ore.
    pub const COAL_ORE: Self = Self(14);
    /// Iron ore.
    pub const IRON_ORE: Self = Self(15);
    /// Gold ore.
    pub const GOLD_ORE: Self = Self(16);
    /// Diamond ore.
    pub const DIAMOND_ORE: Self = Self(17);
    /// Glowstone (emissive, opaque).
    pub const GLOWSTONE: Self = Self(18);
    /// Torch (emissive, transparent).
    pub const TORCH: Self = Self(19);
    /// Ice block.
    pub const ICE: Self = Self(20);

    /// Number of ids in the built-in catalog.
    pub const BUILTIN_COUNT: usize = 21;

    /// Creates a block id from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns true if this is an air block.
    #[inline]
    #[must_use]
    pub const fn is_air(self) -> bool {
        self.0 == Self::AIR.0
    }

    /// Returns true if this block counts toward the heightmap.
    ///
    /// Air and fluids are not solid.
    #[inline]
    #[must_use]
    pub const fn is_solid(self) -> bool {
        !matches!(self, Self::AIR | Self::WATER | Self::LAVA)
    }
}

/// Chunk coordinate (identifies a column of the world grid).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkCoord {
    /// X coordinate (in chunks, not blocks).
    pub x: i32,
    /// Z coordinate (in chunks, not blocks).
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Converts world block coordinates to chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn from_block_pos(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_x.div_euclid(CHUNK_SIZE as i32),
            z: block_z.div_euclid(CHUNK_SIZE as i32),
        }
    }

    /// Returns the world X coordinate of the chunk's origin (corner).
    ///
    /// Widened to `i64`: chunks near the `i32` limits have origins that
    /// no `i32` block coordinate can hold.
    #[inline]
    #[must_use]
    pub const fn world_x(self) -> i64 {
        self.x as i64 * CHUNK_SIZE as i64
    }

    /// Returns the world Z coordinate of the chunk's origin.
    #[inline]
    #[must_use]
    pub const fn world_z(self) -> i64 {
        self.z as i64 * CHUNK_SIZE as i64
    }

    /// Stable persistence key, `"{x}:{z}"`.
    #[must_use]
    pub fn storage_key(self) -> String {
        format!("{}:{}", self.x, self.z)
    }

    /// Parses a key produced by [`Self::storage_key`].
    #[must_use]
    pub fn from_storage_key(key: &str) -> Option<Self> {
        let (x, z) = key.split_once(':')?;
        Some(Self::new(x.parse().ok()?, z.parse().ok()?))
    }

    /// Squared Euclidean distance in chunk units.
    #[inline]
    #[must_use]
    pub const fn distance_sq(self, other: Self) -> i64 {
        let dx = self.x as i64 - other.x as i64;
        let dz = self.z as i64 - other.z as i64;
        dx * dx + dz * dz
    }

    /// Deterministic 64-bit mix of the coordinate, for seeding per-chunk RNGs.
    #[inline]
    #[must_use]
    pub const fn hash64(self) -> u64 {
        crate::noise::mix64(((self.x as u32 as u64) << 32) | self.z as u32 as u64)
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.x, self.z)
    }
}

/// Block position inside a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LocalPos {
    /// Local X (0..S).
    pub x: usize,
    /// Y level (0..H).
    pub y: usize,
    /// Local Z (0..S).
    pub z: usize,
}

impl LocalPos {
    /// Creates a local position, or `None` when any component is out of range.
    #[inline]
    #[must_use]
    pub const fn new(x: usize, y: usize, z: usize) -> Option<Self> {
        if x < CHUNK_SIZE && y < CHUNK_HEIGHT && z < CHUNK_SIZE {
            Some(Self { x, y, z })
        } else {
            None
        }
    }

    /// Block index of this position.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        block_index(self.x, self.y, self.z)
    }
}

/// Absolute block position in the world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlockPos {
    /// World X.
    pub x: i32,
    /// World Y (valid range `0..H`).
    pub y: i32,
    /// World Z.
    pub z: i32,
}

impl BlockPos {
    /// Creates a world position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns true if Y is inside the world height bounds.
    #[inline]
    #[must_use]
    pub const fn in_height_bounds(self) -> bool {
        self.y >= 0 && (self.y as usize) < CHUNK_HEIGHT
    }

    /// Chunk containing this position.
    #[inline]
    #[must_use]
    pub const fn chunk(self) -> ChunkCoord {
        ChunkCoord::from_block_pos(self.x, self.z)
    }

    /// Splits into chunk coordinate and local position.
    ///
    /// Returns `None` when Y is outside the world height bounds.
    #[must_use]
    pub const fn to_chunk_local(self) -> Option<(ChunkCoord, LocalPos)> {
        if !self.in_height_bounds() {
            return None;
        }
        let local = LocalPos {
            x: self.x.rem_euclid(CHUNK_SIZE as i32) as usize,
            y: self.y as usize,
            z: self.z.rem_euclid(CHUNK_SIZE as i32) as usize,
        };
        Some((self.chunk(), local))
    }

    /// Rebuilds a world position from chunk coordinate and local position.
    ///
    /// Returns `None` when the block lies outside the `i32` block range,
    /// i.e. for chunks past `i32::MIN / 16` or `i32::MAX / 16`.
    #[must_use]
    pub fn from_chunk_local(coord: ChunkCoord, local: LocalPos) -> Option<Self> {
        let x = i32::try_from(coord.world_x() + local.x as i64).ok()?;
        let z = i32::try_from(coord.world_z() + local.z as i64).ok()?;
        Some(Self { x, y: local.y as i32, z })
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Raw arrays of a chunk, used by codecs to build or take apart a [`Chunk`].
#[derive(Clone, Debug)]
pub struct ChunkParts {
    /// Chunk position.
    pub coord: ChunkCoord,
    /// Block ids, `BLOCKS_PER_CHUNK` entries.
    pub blocks: Vec<BlockId>,
    /// Per-block auxiliary byte, `BLOCKS_PER_CHUNK` entries.
    pub metadata: Vec<u8>,
    /// Highest solid Y per column, `COLUMNS_PER_CHUNK` entries.
    pub heightmap: Vec<u16>,
    /// Skylight per block (0-15), `BLOCKS_PER_CHUNK` entries.
    pub skylight: Vec<u8>,
    /// Block light per block (0-15), `BLOCKS_PER_CHUNK` entries.
    pub block_light: Vec<u8>,
    /// Biome per column, `COLUMNS_PER_CHUNK` entries.
    pub biomes: Vec<Biome>,
    /// Unsaved-mutation flag.
    pub dirty: bool,
    /// Last modification time (milliseconds, caller-defined epoch).
    pub last_modified: u64,
}

/// Reason a [`ChunkParts`] could not become a [`Chunk`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeMismatch {
    /// Name of the offending array.
    pub array: &'static str,
    /// Expected length.
    pub expected: usize,
    /// Actual length.
    pub actual: usize,
}

impl std::fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} has {} entries, expected {}",
            self.array, self.actual, self.expected
        )
    }
}

impl std::error::Error for ShapeMismatch {}

/// A chunk of world data.
///
/// Owns a 16x16x384 grid of blocks plus the parallel metadata, light,
/// heightmap and biome arrays.
#[derive(Clone)]
pub struct Chunk {
    coord: ChunkCoord,
    blocks: Box<[BlockId]>,
    metadata: Box<[u8]>,
    heightmap: Box<[u16]>,
    skylight: Box<[u8]>,
    block_light: Box<[u8]>,
    biomes: Box<[Biome]>,
    dirty: bool,
    last_modified: u64,
}

impl Chunk {
    /// Creates a new empty (all air, unlit) chunk at the given coordinates.
    #[must_use]
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            blocks: vec![BlockId::AIR; BLOCKS_PER_CHUNK].into_boxed_slice(),
            metadata: vec![0; BLOCKS_PER_CHUNK].into_boxed_slice(),
            heightmap: vec![0; COLUMNS_PER_CHUNK].into_boxed_slice(),
            skylight: vec![0; BLOCKS_PER_CHUNK].into_boxed_slice(),
            block_light: vec![0; BLOCKS_PER_CHUNK].into_boxed_slice(),
            biomes: vec![Biome::Plains; COLUMNS_PER_CHUNK].into_boxed_slice(),
            dirty: false,
            last_modified: 0,
        }
    }

    /// Builds a chunk from raw arrays, validating every length.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeMismatch`] if any array has the wrong length.
    pub fn from_parts(parts: ChunkParts) -> Result<Self, ShapeMismatch> {
        fn check(array: &'static str, actual: usize, expected: usize) -> Result<(), ShapeMismatch> {
            if actual == expected {
                Ok(())
            } else {
                Err(ShapeMismatch { array, expected, actual })
            }
        }

        check("blocks", parts.blocks.len(), BLOCKS_PER_CHUNK)?;
        check("metadata", parts.metadata.len(), BLOCKS_PER_CHUNK)?;
        check("heightmap", parts.heightmap.len(), COLUMNS_PER_CHUNK)?;
        check("skylight", parts.skylight.len(), BLOCKS_PER_CHUNK)?;
        check("block_light", parts.block_light.len(), BLOCKS_PER_CHUNK)?;
        check("biomes", parts.biomes.len(), COLUMNS_PER_CHUNK)?;

        Ok(Self {
            coord: parts.coord,
            blocks: parts.blocks.into_boxed_slice(),
            metadata: parts.metadata.into_boxed_slice(),
            heightmap: parts.heightmap.into_boxed_slice(),
            skylight: parts.skylight.into_boxed_slice(),
            block_light: parts.block_light.into_boxed_slice(),
            biomes: parts.biomes.into_boxed_slice(),
            dirty: parts.dirty,
            last_modified: parts.last_modified,
        })
    }

    /// Takes the chunk apart into its raw arrays.
    #[must_use]
    pub fn into_parts(self) -> ChunkParts {
        ChunkParts {
            coord: self.coord,
            blocks: self.blocks.into_vec(),
            metadata: self.metadata.into_vec(),
            heightmap: self.heightmap.into_vec(),
            skylight: self.skylight.into_vec(),
            block_light: self.block_light.into_vec(),
            biomes: self.biomes.into_vec(),
            dirty: self.dirty,
            last_modified: self.last_modified,
        }
    }

    /// Chunk position in the world.
    #[inline]
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Gets a block at local coordinates.
    #[inline]
    #[must_use]
    pub fn block(&self, x: usize, y: usize, z: usize) -> BlockId {
        self.blocks[block_index(x, y, z)]
    }

    /// Gets a block by index.
    #[inline]
    #[must_use]
    pub fn block_at_index(&self, index: usize) -> BlockId {
        self.blocks[index]
    }

    /// Sets a block at local coordinates and keeps the heightmap current.
    ///
    /// Does not touch lighting or the dirty flag; callers that mutate a live
    /// chunk go through the chunk store, which handles both.
    ///
    /// Returns the previous block.
    pub fn set_block(&mut self, x: usize, y: usize, z: usize, block: BlockId) -> BlockId {
        let index = block_index(x, y, z);
        let old = std::mem::replace(&mut self.blocks[index], block);

        let column = column_index(x, z);
        let height = usize::from(self.heightmap[column]);
        if block.is_solid() {
            if y > height {
                self.heightmap[column] = y as u16;
            }
        } else if y == height {
            self.recompute_height(x, z);
        }

        old
    }

    /// All block ids in index order.
    #[inline]
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Per-block auxiliary byte.
    #[inline]
    #[must_use]
    pub fn metadata(&self, x: usize, y: usize, z: usize) -> u8 {
        self.metadata[block_index(x, y, z)]
    }

    /// Sets the per-block auxiliary byte.
    #[inline]
    pub fn set_metadata(&mut self, x: usize, y: usize, z: usize, value: u8) {
        self.metadata[block_index(x, y, z)] = value;
    }

    /// Metadata array in index order.
    #[inline]
    #[must_use]
    pub fn metadata_slice(&self) -> &[u8] {
        &self.metadata
    }

    /// Gets the height (highest solid Y) at a local column.
    #[inline]
    #[must_use]
    pub fn height(&self, x: usize, z: usize) -> usize {
        usize::from(self.heightmap[column_index(x, z)])
    }

    /// Heightmap in column order.
    #[inline]
    #[must_use]
    pub fn heightmap(&self) -> &[u16] {
        &self.heightmap
    }

    /// Rescans one column for its highest solid block (0 if none).
    pub fn recompute_height(&mut self, x: usize, z: usize) {
        let top = (0..CHUNK_HEIGHT)
            .rev()
            .find(|&y| self.blocks[block_index(x, y, z)].is_solid())
            .unwrap_or(0);
        self.heightmap[column_index(x, z)] = top as u16;
    }

    /// Rescans every column.
    pub fn recompute_heightmap(&mut self) {
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                self.recompute_height(x, z);
            }
        }
    }

    /// Biome of the chunk (biome is per chunk; the column array is uniform
    /// for generated chunks).
    #[inline]
    #[must_use]
    pub fn biome(&self) -> Biome {
        self.biomes[0]
    }

    /// Gets the biome at a local column.
    #[inline]
    #[must_use]
    pub fn biome_at(&self, x: usize, z: usize) -> Biome {
        self.biomes[column_index(x, z)]
    }

    /// Biome array in column order.
    #[inline]
    #[must_use]
    pub fn biomes(&self) -> &[Biome] {
        &self.biomes
    }

    /// Sets the biome for every column.
    pub fn set_biome(&mut self, biome: Biome) {
        self.biomes.fill(biome);
    }

    /// Skylight at local coordinates.
    #[inline]
    #[must_use]
    pub fn skylight(&self, x: usize, y: usize, z: usize) -> u8 {
        self.skylight[block_index(x, y, z)]
    }

    /// Block light at local coordinates.
    #[inline]
    #[must_use]
    pub fn block_light(&self, x: usize, y: usize, z: usize) -> u8 {
        self.block_light[block_index(x, y, z)]
    }

    /// Skylight array in index order.
    #[inline]
    #[must_use]
    pub fn skylight_slice(&self) -> &[u8] {
        &self.skylight
    }

    /// Block light array in index order.
    #[inline]
    #[must_use]
    pub fn block_light_slice(&self) -> &[u8] {
        &self.block_light
    }

    /// Block ids (read) together with mutable light channels, for lighting passes.
    #[inline]
    pub fn light_view_mut(&mut self) -> (&[BlockId], &mut [u8], &mut [u8]) {
        (&self.blocks, &mut self.skylight, &mut self.block_light)
    }

    /// Whether this chunk has unsaved mutations.
    #[inline]
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the chunk as mutated at `timestamp`.
    #[inline]
    pub fn mark_dirty(&mut self, timestamp: u64) {
        self.dirty = true;
        self.last_modified = timestamp;
    }

    /// Clears the dirty flag after a successful persist.
    #[inline]
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Last modification time.
    #[inline]
    #[must_use]
    pub const fn last_modified(&self) -> u64 {
        self.last_modified
    }

    /// Counts blocks matching a predicate.
    #[must_use]
    pub fn count_blocks(&self, predicate: impl Fn(BlockId) -> bool) -> usize {
        self.blocks.iter().filter(|&&b| predicate(b)).count()
    }
}

/// Equality ignores `last_modified`, which is ephemeral.
impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.coord == other.coord
            && self.dirty == other.dirty
            && self.blocks == other.blocks
            && self.metadata == other.metadata
            && self.heightmap == other.heightmap
            && self.skylight == other.skylight
            && self.block_light == other.block_light
            && self.biomes == other.biomes
    }
}

impl Eq for Chunk {}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("coord", &self.coord)
            .field("biome", &self.biome())
            .field("dirty", &self.dirty)
            .field("last_modified", &self.last_modified)
            .field("solid_blocks", &self.count_blocks(BlockId::is_solid))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_coord_from_block() {
        assert_eq!(ChunkCoord::from_block_pos(0, 0), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_block_pos(15, 15), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_block_pos(16, 16), ChunkCoord::new(1, 1));
        assert_eq!(ChunkCoord::from_block_pos(-1, -1), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::from_block_pos(-16, -16), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::from_block_pos(-17, -17), ChunkCoord::new(-2, -2));
    }

    #[test]
    fn test_coordinate_inverse() {
        for x in -40..40 {
            for z in (-40..40).step_by(3) {
                for y in [0, 1, 63, 200, CHUNK_HEIGHT as i32 - 1] {
                    let pos = BlockPos::new(x * 7 - 3, y, z * 5 + 1);
                    let (coord, local) = pos.to_chunk_local().expect("in bounds");
                    assert!(local.x < CHUNK_SIZE && local.z < CHUNK_SIZE);
                    assert_eq!(BlockPos::from_chunk_local(coord, local), Some(pos));
                }
            }
        }
    }

    #[test]
    fn test_coordinate_inverse_at_block_range_limits() {
        for pos in [
            BlockPos::new(i32::MAX, 0, i32::MIN),
            BlockPos::new(i32::MIN, 383, i32::MAX),
            BlockPos::new(i32::MAX - 15, 10, i32::MIN + 15),
        ] {
            let (coord, local) = pos.to_chunk_local().expect("in bounds");
            assert_eq!(BlockPos::from_chunk_local(coord, local), Some(pos));
        }

        let top = LocalPos::new(15, 0, 15).expect("in range");
        let edge = ChunkCoord::new(i32::MAX / 16, i32::MIN / 16);
        assert!(BlockPos::from_chunk_local(edge, top).is_some());
        assert_eq!(edge.world_x(), i64::from(i32::MAX / 16) * 16);

        let beyond = ChunkCoord::new(i32::MAX / 16 + 1, 0);
        assert!(BlockPos::from_chunk_local(beyond, top).is_none());
        assert_eq!(ChunkCoord::new(i32::MIN, i32::MAX).world_z(), i64::from(i32::MAX) * 16);
    }

    #[test]
    fn test_out_of_height_bounds_has_no_local() {
        assert!(BlockPos::new(0, -1, 0).to_chunk_local().is_none());
        assert!(BlockPos::new(0, CHUNK_HEIGHT as i32, 0).to_chunk_local().is_none());
        assert!(LocalPos::new(CHUNK_SIZE, 0, 0).is_none());
        assert!(LocalPos::new(0, CHUNK_HEIGHT, 0).is_none());
    }

    #[test]
    fn test_block_index_layout() {
        assert_eq!(block_index(0, 0, 0), 0);
        assert_eq!(block_index(1, 0, 0), 1);
        assert_eq!(block_index(0, 0, 1), CHUNK_SIZE);
        assert_eq!(block_index(0, 1, 0), CHUNK_SIZE * CHUNK_SIZE);
        assert_eq!(
            block_index(CHUNK_SIZE - 1, CHUNK_HEIGHT - 1, CHUNK_SIZE - 1),
            BLOCKS_PER_CHUNK - 1
        );
        for index in [0, 17, 4095, 70_000, BLOCKS_PER_CHUNK - 1] {
            assert_eq!(index_to_local(index).index(), index);
        }
    }

    #[test]
    fn test_storage_key_roundtrip() {
        let coord = ChunkCoord::new(-12, 40);
        assert_eq!(coord.storage_key(), "-12:40");
        assert_eq!(ChunkCoord::from_storage_key("-12:40"), Some(coord));
        assert_eq!(ChunkCoord::from_storage_key("garbage"), None);
    }

    #[test]
    fn test_new_chunk_shapes() {
        let chunk = Chunk::new(ChunkCoord::new(3, 4));
        assert_eq!(chunk.blocks().len(), BLOCKS_PER_CHUNK);
        assert_eq!(chunk.metadata_slice().len(), BLOCKS_PER_CHUNK);
        assert_eq!(chunk.skylight_slice().len(), BLOCKS_PER_CHUNK);
        assert_eq!(chunk.block_light_slice().len(), BLOCKS_PER_CHUNK);
        assert_eq!(chunk.heightmap().len(), COLUMNS_PER_CHUNK);
        assert_eq!(chunk.biomes().len(), COLUMNS_PER_CHUNK);
        assert!(!chunk.is_dirty());
    }

    #[test]
    fn test_heightmap_tracks_set_block() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        for y in 0..=10 {
            chunk.set_block(2, y, 3, BlockId::STONE);
        }
        assert_eq!(chunk.height(2, 3), 10);

        chunk.set_block(2, 50, 3, BlockId::DIRT);
        assert_eq!(chunk.height(2, 3), 50);

        // Removing the top block drops back to the next solid block
        chunk.set_block(2, 50, 3, BlockId::AIR);
        assert_eq!(chunk.height(2, 3), 10);

        // Fluids do not count
        chunk.set_block(2, 11, 3, BlockId::WATER);
        assert_eq!(chunk.height(2, 3), 10);

        // Digging below the top leaves the height alone
        let old = chunk.set_block(2, 5, 3, BlockId::AIR);
        assert_eq!(old, BlockId::STONE);
        assert_eq!(chunk.height(2, 3), 10);
    }

    #[test]
    fn test_solid_block_at_zero_in_empty_column() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        chunk.set_block(0, 0, 0, BlockId::BEDROCK);
        assert_eq!(chunk.height(0, 0), 0);
        chunk.set_block(0, 3, 0, BlockId::STONE);
        assert_eq!(chunk.height(0, 0), 3);
    }

    #[test]
    fn test_equality_ignores_timestamp() {
        let mut a = Chunk::new(ChunkCoord::new(1, 1));
        let mut b = a.clone();
        a.mark_dirty(10);
        b.mark_dirty(99);
        assert_eq!(a, b);

        b.set_metadata(0, 0, 0, 7);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_parts_rejects_bad_shapes() {
        let mut parts = Chunk::new(ChunkCoord::new(0, 0)).into_parts();
        parts.heightmap.pop();
        let err = Chunk::from_parts(parts).expect_err("short heightmap");
        assert_eq!(err.array, "heightmap");
        assert_eq!(err.expected, COLUMNS_PER_CHUNK);
    }
}
