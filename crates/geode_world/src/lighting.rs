//! # Lighting Engine
//!
//! Two independent 4-bit channels per block:
//!
//! - **Skylight**: one top-down pass per column. Starts at 15; transparent
//!   blocks keep the current value, every other block subtracts its opacity.
//! - **Block light**: FIFO flood fill from every emissive block. A neighbour
//!   receives `level - 1 - opacity` and is enqueued only when that raises its
//!   stored value, so the light array doubles as the visited set.
//!
//! Light is chunk-local: it never crosses a chunk border.
//!
//! After a single block edit, [`propagate_from`] repairs both channels
//! without touching the rest of the chunk.

use std::collections::VecDeque;

use geode_procedural::{
    block_index, index_to_local, BlockId, Chunk, LocalPos, Registry, BLOCKS_PER_CHUNK, CHUNK_HEIGHT,
    CHUNK_SIZE, COLUMNS_PER_CHUNK, MAX_LIGHT,
};

/// Light at one block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LightLevel {
    /// Skylight (0-15).
    pub sky: u8,
    /// Block light (0-15).
    pub block: u8,
}

impl LightLevel {
    /// Brighter of the two channels.
    #[must_use]
    pub const fn combined(self) -> u8 {
        if self.sky > self.block {
            self.sky
        } else {
            self.block
        }
    }
}

/// Reads both channels at a local position.
#[must_use]
pub fn light_at(chunk: &Chunk, pos: LocalPos) -> LightLevel {
    LightLevel {
        sky: chunk.skylight(pos.x, pos.y, pos.z),
        block: chunk.block_light(pos.x, pos.y, pos.z),
    }
}

/// Computes both channels for a freshly generated or decoded chunk.
pub fn compute_lighting(chunk: &mut Chunk, registry: &dyn Registry) {
    compute_skylight(chunk, registry);
    compute_block_light(chunk, registry);
}

/// Recomputes skylight for every column.
pub fn compute_skylight(chunk: &mut Chunk, registry: &dyn Registry) {
    let (blocks, skylight, _) = chunk.light_view_mut();
    for column in 0..COLUMNS_PER_CHUNK {
        skylight_column(blocks, skylight, registry, column % CHUNK_SIZE, column / CHUNK_SIZE);
    }
}

/// Recomputes block light from scratch.
pub fn compute_block_light(chunk: &mut Chunk, registry: &dyn Registry) {
    let (blocks, _, light) = chunk.light_view_mut();
    light.fill(0);

    let mut queue = VecDeque::new();
    for (index, &block) in blocks.iter().enumerate() {
        let luminance = registry.block(block).luminance.min(MAX_LIGHT);
        if luminance > 0 {
            light[index] = luminance;
            queue.push_back(index);
        }
    }

    flood(blocks, light, registry, queue);
}

/// Repairs lighting after the block at `pos` changed.
///
/// Block light is removed outward from `pos` (every cell that could have
/// been lit through it is cleared), then refilled from the surviving
/// boundary, any emissive cells found on the way, and the new block itself.
/// Skylight is recomputed for the one affected column.
///
/// The result equals a full [`compute_lighting`] of the edited chunk.
pub fn propagate_from(chunk: &mut Chunk, registry: &dyn Registry, pos: LocalPos) {
    let (blocks, skylight, light) = chunk.light_view_mut();
    skylight_column(blocks, skylight, registry, pos.x, pos.z);

    let origin = pos.index();
    let mut relight = VecDeque::new();

    let old_level = light[origin];
    if old_level > 0 {
        let mut darken = VecDeque::new();
        light[origin] = 0;
        darken.push_back((origin, old_level));

        while let Some((index, level)) = darken.pop_front() {
            for_each_neighbor(index, |neighbor| {
                let neighbor_level = light[neighbor];
                if neighbor_level == 0 {
                    return;
                }
                if neighbor_level < level {
                    light[neighbor] = 0;
                    darken.push_back((neighbor, neighbor_level));
                    let luminance = registry.block(blocks[neighbor]).luminance.min(MAX_LIGHT);
                    if luminance > 0 {
                        light[neighbor] = luminance;
                        relight.push_back(neighbor);
                    }
                } else {
                    relight.push_back(neighbor);
                }
            });
        }
    }

    let luminance = registry.block(blocks[origin]).luminance.min(MAX_LIGHT);
    if luminance > light[origin] {
        light[origin] = luminance;
    }
    if light[origin] > 0 {
        relight.push_back(origin);
    }
    for_each_neighbor(origin, |neighbor| {
        if light[neighbor] > 0 {
            relight.push_back(neighbor);
        }
    });

    flood(blocks, light, registry, relight);
}

fn skylight_column(
    blocks: &[BlockId],
    skylight: &mut [u8],
    registry: &dyn Registry,
    x: usize,
    z: usize,
) {
    let mut level = MAX_LIGHT;
    for y in (0..CHUNK_HEIGHT).rev() {
        let index = block_index(x, y, z);
        let props = registry.block(blocks[index]);
        if !props.transparent {
            level = level.saturating_sub(props.opacity);
        }
        skylight[index] = level;
    }
}

/// Breadth-first relaxation until no cell can be raised.
fn flood(blocks: &[BlockId], light: &mut [u8], registry: &dyn Registry, mut queue: VecDeque<usize>) {
    while let Some(index) = queue.pop_front() {
        let level = light[index];
        if level <= 1 {
            continue;
        }
        for_each_neighbor(index, |neighbor| {
            let opacity = registry.block(blocks[neighbor]).opacity;
            let candidate = level.saturating_sub(1).saturating_sub(opacity);
            if candidate > light[neighbor] {
                light[neighbor] = candidate;
                queue.push_back(neighbor);
            }
        });
    }
}

/// Visits the in-chunk 6-connected neighbours of a block index.
#[inline]
fn for_each_neighbor(index: usize, mut f: impl FnMut(usize)) {
    const LAYER: usize = CHUNK_SIZE * CHUNK_SIZE;
    debug_assert!(index < BLOCKS_PER_CHUNK);

    let LocalPos { x, y, z } = index_to_local(index);
    if x > 0 {
        f(index - 1);
    }
    if x + 1 < CHUNK_SIZE {
        f(index + 1);
    }
    if z > 0 {
        f(index - CHUNK_SIZE);
    }
    if z + 1 < CHUNK_SIZE {
        f(index + CHUNK_SIZE);
    }
    if y > 0 {
        f(index - LAYER);
    }
    if y + 1 < CHUNK_HEIGHT {
        f(index + LAYER);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geode_procedural::{ChunkCoord, StaticRegistry};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn solid_chunk(block: BlockId) -> Chunk {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        for y in 0..CHUNK_HEIGHT {
            for z in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    chunk.set_block(x, y, z, block);
                }
            }
        }
        chunk
    }

    fn manhattan(a: (usize, usize, usize), b: (usize, usize, usize)) -> usize {
        a.0.abs_diff(b.0) + a.1.abs_diff(b.1) + a.2.abs_diff(b.2)
    }

    #[test]
    fn test_open_sky_is_full_bright() {
        let registry = StaticRegistry::new();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        compute_lighting(&mut chunk, &registry);
        assert!(chunk.skylight_slice().iter().all(|&l| l == MAX_LIGHT));
        assert!(chunk.block_light_slice().iter().all(|&l| l == 0));
    }

    #[test]
    fn test_skylight_blocked_by_opaque_roof() {
        let registry = StaticRegistry::new();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        chunk.set_block(3, 100, 3, BlockId::STONE);
        compute_skylight(&mut chunk, &registry);

        assert_eq!(chunk.skylight(3, 101, 3), MAX_LIGHT);
        assert_eq!(chunk.skylight(3, 100, 3), 0);
        assert_eq!(chunk.skylight(3, 50, 3), 0);
        assert_eq!(chunk.skylight(4, 50, 3), MAX_LIGHT);
    }

    #[test]
    fn test_skylight_attenuates_through_water() {
        let registry = StaticRegistry::new();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        for y in 60..64 {
            chunk.set_block(0, y, 0, BlockId::WATER);
        }
        compute_skylight(&mut chunk, &registry);

        assert_eq!(chunk.skylight(0, 63, 0), 13);
        assert_eq!(chunk.skylight(0, 60, 0), 7);
        assert_eq!(chunk.skylight(0, 10, 0), 7);
    }

    #[test]
    fn test_skylight_monotone_down_columns() {
        let registry = StaticRegistry::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        let palette = [BlockId::AIR, BlockId::WATER, BlockId::LEAVES, BlockId::STONE, BlockId::TORCH];
        for _ in 0..20_000 {
            let (x, y, z) = (rng.gen_range(0..CHUNK_SIZE), rng.gen_range(0..CHUNK_HEIGHT), rng.gen_range(0..CHUNK_SIZE));
            chunk.set_block(x, y, z, palette[rng.gen_range(0..palette.len())]);
        }
        compute_lighting(&mut chunk, &registry);

        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                for y in 1..CHUNK_HEIGHT {
                    assert!(chunk.skylight(x, y - 1, z) <= chunk.skylight(x, y, z));
                }
            }
        }
        assert!(chunk.block_light_slice().iter().all(|&l| l <= MAX_LIGHT));
    }

    #[test]
    fn test_torch_in_sealed_cavity() {
        let registry = StaticRegistry::new();
        let mut chunk = solid_chunk(BlockId::STONE);

        // 5x5x5 air pocket centred on (8, 100, 8)
        let centre = (8usize, 100usize, 8usize);
        for y in 98..=102 {
            for z in 6..=10 {
                for x in 6..=10 {
                    chunk.set_block(x, y, z, BlockId::AIR);
                }
            }
        }
        chunk.set_block(centre.0, centre.1, centre.2, BlockId::TORCH);
        compute_block_light(&mut chunk, &registry);

        assert_eq!(chunk.block_light(centre.0, centre.1, centre.2), 14);
        for y in 98..=102 {
            for z in 6..=10 {
                for x in 6..=10 {
                    let expected = 14 - manhattan((x, y, z), centre) as u8;
                    assert_eq!(chunk.block_light(x, y, z), expected, "at ({x}, {y}, {z})");
                }
            }
        }

        // Walls stop the light entirely
        assert_eq!(chunk.block_light(5, 100, 8), 0);
        assert_eq!(chunk.block_light(8, 103, 8), 0);
        assert_eq!(chunk.block_light(0, 0, 0), 0);
    }

    #[test]
    fn test_light_reaches_zero_past_radius() {
        let registry = StaticRegistry::new();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        chunk.set_block(0, 200, 0, BlockId::TORCH);
        compute_block_light(&mut chunk, &registry);

        for d in 0..14 {
            assert_eq!(chunk.block_light(0, 200 + d, 0), 14 - d as u8);
        }
        assert_eq!(chunk.block_light(0, 214, 0), 0);
        assert_eq!(chunk.block_light(15, 200, 15), 0);
    }

    #[test]
    fn test_nearest_source_wins() {
        let registry = StaticRegistry::new();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        chunk.set_block(2, 50, 2, BlockId::TORCH);
        chunk.set_block(12, 50, 2, BlockId::GLOWSTONE);
        compute_block_light(&mut chunk, &registry);

        // Midpoint is 5 from the torch and 5 from the glowstone
        assert_eq!(chunk.block_light(7, 50, 2), 10);
        assert_eq!(chunk.block_light(11, 50, 2), 14);
        assert_eq!(chunk.block_light(3, 50, 2), 13);
    }

    fn assert_matches_full(chunk: &Chunk, registry: &StaticRegistry, context: &str) {
        let mut fresh = chunk.clone();
        compute_lighting(&mut fresh, registry);
        for index in 0..BLOCKS_PER_CHUNK {
            let pos = index_to_local(index);
            assert_eq!(
                light_at(chunk, pos),
                light_at(&fresh, pos),
                "{context}: mismatch at {pos:?}"
            );
        }
    }

    #[test]
    fn test_incremental_remove_and_place() {
        let registry = StaticRegistry::new();
        let mut chunk = solid_chunk(BlockId::STONE);
        for y in 90..110 {
            for z in 2..14 {
                for x in 2..14 {
                    chunk.set_block(x, y, z, BlockId::AIR);
                }
            }
        }
        chunk.set_block(4, 95, 4, BlockId::TORCH);
        chunk.set_block(11, 104, 11, BlockId::GLOWSTONE);
        compute_lighting(&mut chunk, &registry);

        // Remove a source
        chunk.set_block(4, 95, 4, BlockId::AIR);
        propagate_from(&mut chunk, &registry, LocalPos::new(4, 95, 4).unwrap());
        assert_matches_full(&chunk, &registry, "remove torch");

        // Add a wall between
        for y in 90..110 {
            for z in 2..14 {
                chunk.set_block(8, y, z, BlockId::STONE);
                propagate_from(&mut chunk, &registry, LocalPos::new(8, y, z).unwrap());
            }
        }
        assert_matches_full(&chunk, &registry, "build wall");

        // Punch a hole in it
        chunk.set_block(8, 100, 8, BlockId::AIR);
        propagate_from(&mut chunk, &registry, LocalPos::new(8, 100, 8).unwrap());
        assert_matches_full(&chunk, &registry, "open hole");

        // Place a new source
        chunk.set_block(3, 92, 3, BlockId::TORCH);
        propagate_from(&mut chunk, &registry, LocalPos::new(3, 92, 3).unwrap());
        assert_matches_full(&chunk, &registry, "place torch");
    }

    #[test]
    fn test_incremental_matches_full_on_random_edits() {
        let registry = StaticRegistry::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0x1157);
        let palette = [
            BlockId::AIR,
            BlockId::STONE,
            BlockId::WATER,
            BlockId::LEAVES,
            BlockId::TORCH,
            BlockId::GLOWSTONE,
        ];

        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        for y in 0..40 {
            for z in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    let block = if rng.gen_bool(0.6) { BlockId::STONE } else { BlockId::AIR };
                    chunk.set_block(x, y, z, block);
                }
            }
        }
        compute_lighting(&mut chunk, &registry);

        for step in 0..300 {
            let pos = LocalPos::new(
                rng.gen_range(0..CHUNK_SIZE),
                rng.gen_range(0..40),
                rng.gen_range(0..CHUNK_SIZE),
            )
            .unwrap();
            let block = palette[rng.gen_range(0..palette.len())];
            chunk.set_block(pos.x, pos.y, pos.z, block);
            propagate_from(&mut chunk, &registry, pos);

            if step % 25 == 0 {
                assert_matches_full(&chunk, &registry, &format!("step {step}"));
            }
        }
        assert_matches_full(&chunk, &registry, "final");
    }

    #[test]
    fn test_neighbors_stay_in_chunk() {
        let mut count = 0;
        for_each_neighbor(block_index(0, 0, 0), |_| count += 1);
        assert_eq!(count, 3);

        count = 0;
        for_each_neighbor(block_index(5, 5, 5), |_| count += 1);
        assert_eq!(count, 6);

        let mut seen = Vec::new();
        for_each_neighbor(block_index(CHUNK_SIZE - 1, CHUNK_HEIGHT - 1, CHUNK_SIZE - 1), |n| {
            seen.push(n);
        });
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|&n| n < BLOCKS_PER_CHUNK));
    }
}
