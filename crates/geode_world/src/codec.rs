//! # Chunk Codec
//!
//! Binary blob format stored in the persistence backend.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "GEOC"
//! 4       2     format version (LE)
//! 6       4     chunk x (LE)
//! 10      4     chunk z (LE)
//! 14      2     chunk size S (LE)
//! 16      2     chunk height H (LE)
//! 18      1     biome id (must match the first payload column)
//! 19      1     flags (bit 0 = dirty)
//! 20      8     last modified, ms (LE)
//! 28      4     compressed payload length N (LE)
//! 32      N     LZ4 payload (size-prepended)
//! 32+N    4     CRC32 of the payload (LE)
//! ```
//!
//! The decompressed payload holds, in order: block ids (u16, host order,
//! little-endian on every supported target), metadata bytes, heightmap
//! (u16), biome ids, then skylight and block light packed two nibbles per
//! byte (low nibble = even index).

use geode_procedural::{
    Biome, BlockId, Chunk, ChunkCoord, ChunkParts, BLOCKS_PER_CHUNK, CHUNK_HEIGHT, CHUNK_SIZE,
    COLUMNS_PER_CHUNK,
};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::error::CodecError;

/// Blob magic.
pub const MAGIC: [u8; 4] = *b"GEOC";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 32;
const FLAG_DIRTY: u8 = 1;

const BLOCK_BYTES: usize = BLOCKS_PER_CHUNK * 2;
const HEIGHTMAP_BYTES: usize = COLUMNS_PER_CHUNK * 2;
const NIBBLE_BYTES: usize = BLOCKS_PER_CHUNK / 2;
const PAYLOAD_LEN: usize =
    BLOCK_BYTES + BLOCKS_PER_CHUNK + HEIGHTMAP_BYTES + COLUMNS_PER_CHUNK + 2 * NIBBLE_BYTES;

/// Serializes a chunk.
#[must_use]
pub fn encode(chunk: &Chunk) -> Vec<u8> {
    encode_with_flag(chunk, chunk.is_dirty())
}

/// Serializes a chunk as it will read back after a successful save
/// (dirty flag cleared).
#[must_use]
pub fn encode_saved(chunk: &Chunk) -> Vec<u8> {
    encode_with_flag(chunk, false)
}

fn encode_with_flag(chunk: &Chunk, dirty: bool) -> Vec<u8> {
    let mut payload = Vec::with_capacity(PAYLOAD_LEN);
    payload.extend_from_slice(bytemuck::cast_slice::<BlockId, u8>(chunk.blocks()));
    payload.extend_from_slice(chunk.metadata_slice());
    payload.extend_from_slice(bytemuck::cast_slice::<u16, u8>(chunk.heightmap()));
    payload.extend(chunk.biomes().iter().map(|&b| b as u8));
    pack_nibbles(chunk.skylight_slice(), &mut payload);
    pack_nibbles(chunk.block_light_slice(), &mut payload);
    debug_assert_eq!(payload.len(), PAYLOAD_LEN);

    let compressed = compress_prepend_size(&payload);
    let crc = crc32fast::hash(&compressed);
    let coord = chunk.coord();

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len() + 4);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&coord.x.to_le_bytes());
    out.extend_from_slice(&coord.z.to_le_bytes());
    out.extend_from_slice(&(CHUNK_SIZE as u16).to_le_bytes());
    out.extend_from_slice(&(CHUNK_HEIGHT as u16).to_le_bytes());
    out.push(chunk.biome() as u8);
    out.push(if dirty { FLAG_DIRTY } else { 0 });
    out.extend_from_slice(&chunk.last_modified().to_le_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    out.extend_from_slice(&compressed);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Deserializes a chunk, validating header, checksum and array lengths.
///
/// # Errors
///
/// Returns a [`CodecError`] describing the first defect found.
pub fn decode(bytes: &[u8]) -> Result<Chunk, CodecError> {
    let mut reader = Reader { bytes };

    if reader.take(4, "magic")? != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = reader.u16("version")?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let coord = ChunkCoord::new(reader.i32("x")?, reader.i32("z")?);
    let size = reader.u16("size")?;
    let height = reader.u16("height")?;
    if usize::from(size) != CHUNK_SIZE || usize::from(height) != CHUNK_HEIGHT {
        return Err(CodecError::DimensionMismatch { size, height });
    }
    let biome_id = reader.take(1, "biome")?[0];
    let biome = Biome::from_u8(biome_id).ok_or(CodecError::UnknownBiome(biome_id))?;
    let flags = reader.take(1, "flags")?[0];
    let last_modified = reader.u64("last_modified")?;
    let payload_len = reader.u32("payload length")? as usize;
    let compressed = reader.take(payload_len, "payload")?;
    let stored = reader.u32("checksum")?;

    let computed = crc32fast::hash(compressed);
    if stored != computed {
        return Err(CodecError::ChecksumMismatch { stored, computed });
    }

    let payload =
        decompress_size_prepended(compressed).map_err(|e| CodecError::Decompress(e.to_string()))?;
    if payload.len() != PAYLOAD_LEN {
        return Err(CodecError::Truncated("decompressed payload"));
    }

    let (blocks, rest) = payload.split_at(BLOCK_BYTES);
    let (metadata, rest) = rest.split_at(BLOCKS_PER_CHUNK);
    let (heightmap, rest) = rest.split_at(HEIGHTMAP_BYTES);
    let (biomes, rest) = rest.split_at(COLUMNS_PER_CHUNK);
    let (skylight, block_light) = rest.split_at(NIBBLE_BYTES);

    let biomes = biomes
        .iter()
        .map(|&b| Biome::from_u8(b).ok_or(CodecError::UnknownBiome(b)))
        .collect::<Result<Vec<_>, _>>()?;
    if biomes[0] != biome {
        return Err(CodecError::BiomeMismatch { header: biome_id, payload: biomes[0] as u8 });
    }

    let parts = ChunkParts {
        coord,
        blocks: bytemuck::pod_collect_to_vec::<u8, BlockId>(blocks),
        metadata: metadata.to_vec(),
        heightmap: bytemuck::pod_collect_to_vec::<u8, u16>(heightmap),
        skylight: unpack_nibbles(skylight),
        block_light: unpack_nibbles(block_light),
        biomes,
        dirty: flags & FLAG_DIRTY != 0,
        last_modified,
    };

    Ok(Chunk::from_parts(parts)?)
}

fn pack_nibbles(values: &[u8], out: &mut Vec<u8>) {
    out.extend(values.chunks_exact(2).map(|pair| (pair[0] & 0x0F) | (pair[1] << 4)));
}

fn unpack_nibbles(packed: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(packed.len() * 2);
    for &byte in packed {
        out.push(byte & 0x0F);
        out.push(byte >> 4);
    }
    out
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], CodecError> {
        if self.bytes.len() < len {
            return Err(CodecError::Truncated(what));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, CodecError> {
        self.array(what).map(u16::from_le_bytes)
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, CodecError> {
        self.array(what).map(u32::from_le_bytes)
    }

    fn i32(&mut self, what: &'static str) -> Result<i32, CodecError> {
        self.array(what).map(i32::from_le_bytes)
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, CodecError> {
        self.array(what).map(u64::from_le_bytes)
    }
}
