//! # Terrain Generator
//!
//! Produces a fully populated [`Chunk`] from `(coord, seed)` alone.
//!
//! ## Passes
//!
//! 1. Heightmap from octaved elevation noise
//! 2. Column fill: bedrock, filler, subsurface, surface, then water to sea level
//! 3. Caves: two 3D noise channels, carve where `|a| + |b|` is small
//! 4. Ores: seeded per-chunk RNG over filler blocks
//! 5. Decorations: trees and cacti from the biome palette
//!
//! Lighting is not computed here; the caller runs it on the result.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::biome::{Biome, BiomeClassifier, BiomePalette, Decoration};
use crate::chunk::{column_index, BlockId, Chunk, ChunkCoord, CHUNK_HEIGHT, CHUNK_SIZE, COLUMNS_PER_CHUNK};
use crate::noise::{SimplexNoise, WorldSeed};
use crate::params::GenerationParams;
use crate::registry::Registry;

/// Chunk generator using procedural noise.
pub struct TerrainGenerator {
    seed: WorldSeed,
    params: GenerationParams,
    registry: Arc<dyn Registry>,
    classifier: BiomeClassifier,
    cave_a: SimplexNoise,
    cave_b: SimplexNoise,
    /// Tree and cactus placement.
    placement_noise: SimplexNoise,
    /// Tree and cactus heights.
    detail_noise: SimplexNoise,
}

impl TerrainGenerator {
    const CAVE_A_CHANNEL: u64 = 100;
    const CAVE_B_CHANNEL: u64 = 101;
    const PLACEMENT_CHANNEL: u64 = 102;
    const DETAIL_CHANNEL: u64 = 103;
    const ORE_CHANNEL: u64 = 104;

    /// Minimum tree height.
    const TREE_MIN_HEIGHT: usize = 4;
    /// Maximum tree height.
    const TREE_MAX_HEIGHT: usize = 6;
    /// Maximum cactus height.
    const CACTUS_MAX_HEIGHT: u32 = 3;

    /// Creates a new generator.
    #[must_use]
    pub fn new(seed: WorldSeed, params: GenerationParams, registry: Arc<dyn Registry>) -> Self {
        Self {
            classifier: BiomeClassifier::new(seed, &params),
            cave_a: SimplexNoise::new(seed.derive(Self::CAVE_A_CHANNEL)),
            cave_b: SimplexNoise::new(seed.derive(Self::CAVE_B_CHANNEL)),
            placement_noise: SimplexNoise::new(seed.derive(Self::PLACEMENT_CHANNEL)),
            detail_noise: SimplexNoise::new(seed.derive(Self::DETAIL_CHANNEL)),
            seed,
            params,
            registry,
        }
    }

    /// World seed.
    #[must_use]
    pub const fn seed(&self) -> WorldSeed {
        self.seed
    }

    /// Generation parameters.
    #[must_use]
    pub const fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Biome classifier (shares the elevation field with the heightmap).
    #[must_use]
    pub const fn classifier(&self) -> &BiomeClassifier {
        &self.classifier
    }

    /// Block and biome registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Generates a chunk at the given coordinates.
    ///
    /// Pure in `(coord, seed, params)`: repeated calls return equal chunks.
    #[must_use]
    pub fn generate(&self, coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord);

        let biome = self.classifier.classify(coord);
        chunk.set_biome(biome);
        let palette = *self.registry.palette(biome);

        let mut heights = [0usize; COLUMNS_PER_CHUNK];
        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let h = self
                    .classifier
                    .terrain_height(coord.world_x() + lx as i64, coord.world_z() + lz as i64);
                heights[column_index(lx, lz)] = h as usize;
                self.fill_column(&mut chunk, lx, lz, h as usize, &palette, biome);
            }
        }

        if self.params.caves {
            self.carve_caves(&mut chunk, &heights);
        }
        if self.params.ores {
            self.scatter_ores(&mut chunk, &palette);
        }
        if self.params.decorations {
            for decoration in palette.decorations {
                match *decoration {
                    Decoration::Tree { density } => {
                        self.place_trees(&mut chunk, &heights, &palette, density);
                    }
                    Decoration::Cactus { density } => {
                        self.place_cacti(&mut chunk, &heights, &palette, density);
                    }
                }
            }
        }

        chunk.recompute_heightmap();
        chunk
    }

    fn fill_column(
        &self,
        chunk: &mut Chunk,
        lx: usize,
        lz: usize,
        height: usize,
        palette: &BiomePalette,
        biome: Biome,
    ) {
        let depth = usize::from(palette.subsurface_depth);

        chunk.set_block(lx, 0, lz, BlockId::BEDROCK);
        for y in 1..=height {
            let block = if y == height {
                palette.surface
            } else if y + depth >= height {
                palette.subsurface
            } else {
                palette.filler
            };
            chunk.set_block(lx, y, lz, block);
        }

        let sea_level = self.params.sea_level.max(0) as usize;
        for y in height + 1..sea_level.min(CHUNK_HEIGHT) {
            let block = if biome == Biome::Tundra && y + 1 == sea_level {
                BlockId::ICE
            } else {
                BlockId::WATER
            };
            chunk.set_block(lx, y, lz, block);
        }
    }

    fn carve_caves(&self, chunk: &mut Chunk, heights: &[usize; COLUMNS_PER_CHUNK]) {
        let params = &self.params;
        let f = params.cave_frequency;
        let min_depth = params.cave_min_depth as usize;
        let coord = chunk.coord();

        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let top = heights[column_index(lx, lz)].saturating_sub(min_depth);
                let fx = (coord.world_x() + lx as i64) as f64 * f;
                let fz = (coord.world_z() + lz as i64) as f64 * f;

                for y in 1..top {
                    // Squashed vertically for wider, flatter tunnels
                    let fy = y as f64 * f * 2.0;
                    let a = self.cave_a.octaved3d(fx, fy, fz, params.cave_octaves, 0.5, 2.0);
                    if a.abs() >= params.cave_threshold {
                        continue;
                    }
                    let b = self.cave_b.octaved3d(fx, fy, fz, params.cave_octaves, 0.5, 2.0);
                    if a.abs() + b.abs() < params.cave_threshold {
                        let fill = if y as i32 <= params.lava_level {
                            BlockId::LAVA
                        } else {
                            BlockId::AIR
                        };
                        chunk.set_block(lx, y, lz, fill);
                    }
                }
            }
        }
    }

    fn scatter_ores(&self, chunk: &mut Chunk, palette: &BiomePalette) {
        let Some(max_y) = palette.ores.iter().map(|o| usize::from(o.max_y)).max() else {
            return;
        };
        let mut rng =
            ChaCha8Rng::seed_from_u64(self.seed.derive(Self::ORE_CHANNEL).value() ^ chunk.coord().hash64());

        for y in 1..=max_y.min(CHUNK_HEIGHT - 1) {
            for lz in 0..CHUNK_SIZE {
                for lx in 0..CHUNK_SIZE {
                    if chunk.block(lx, y, lz) != palette.filler {
                        continue;
                    }
                    for ore in palette.ores {
                        let p = ore.probability;
                        if y > usize::from(ore.max_y) || p.is_nan() || p <= 0.0 {
                            continue;
                        }
                        if rng.gen_bool(p.min(1.0)) {
                            chunk.set_block(lx, y, lz, ore.block);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Placement threshold for a 0-100 density, against noise in [-1, 1].
    fn placement_threshold(density: u8) -> f64 {
        let chance = 0.02 + f64::from(density.min(100)) / 100.0 * 0.18;
        1.0 - chance
    }

    fn place_trees(
        &self,
        chunk: &mut Chunk,
        heights: &[usize; COLUMNS_PER_CHUNK],
        palette: &BiomePalette,
        density: u8,
    ) {
        let threshold = Self::placement_threshold(density);
        let coord = chunk.coord();

        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let height = heights[column_index(lx, lz)];
                if !self.is_dry_surface(chunk, lx, lz, height, palette) {
                    continue;
                }

                let world_x = (coord.world_x() + lx as i64) as f64;
                let world_z = (coord.world_z() + lz as i64) as f64;
                let value = self.placement_noise.sample(world_x * 0.3, world_z * 0.3);
                if value > threshold {
                    self.grow_tree(chunk, lx, height + 1, lz, world_x, world_z);
                }
            }
        }
    }

    fn place_cacti(
        &self,
        chunk: &mut Chunk,
        heights: &[usize; COLUMNS_PER_CHUNK],
        palette: &BiomePalette,
        density: u8,
    ) {
        let threshold = Self::placement_threshold(density);
        let coord = chunk.coord();

        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let height = heights[column_index(lx, lz)];
                if !self.is_dry_surface(chunk, lx, lz, height, palette) {
                    continue;
                }

                let world_x = (coord.world_x() + lx as i64) as f64;
                let world_z = (coord.world_z() + lz as i64) as f64;
                if self.placement_noise.sample(world_x * 0.7 + 512.0, world_z * 0.7) <= threshold {
                    continue;
                }

                let tall = 1 + self
                    .detail_noise
                    .sample_discrete(world_x * 0.2, world_z * 0.2, Self::CACTUS_MAX_HEIGHT)
                    as usize;
                let top = (height + tall).min(CHUNK_HEIGHT - 1);
                for y in height + 1..=top {
                    if !chunk.block(lx, y, lz).is_air() {
                        break;
                    }
                    chunk.set_block(lx, y, lz, BlockId::CACTUS);
                }
            }
        }
    }

    /// Surface block is the palette surface, above water and open to the sky.
    fn is_dry_surface(
        &self,
        chunk: &Chunk,
        lx: usize,
        lz: usize,
        height: usize,
        palette: &BiomePalette,
    ) -> bool {
        height as i32 >= self.params.sea_level
            && height + 1 < CHUNK_HEIGHT
            && chunk.block(lx, height, lz) == palette.surface
            && chunk.block(lx, height + 1, lz).is_air()
    }

    /// Grows a single tree with its trunk base at `base_y`.
    ///
    /// Leaves outside the chunk are clipped.
    fn grow_tree(
        &self,
        chunk: &mut Chunk,
        local_x: usize,
        base_y: usize,
        local_z: usize,
        world_x: f64,
        world_z: f64,
    ) {
        let span = (Self::TREE_MAX_HEIGHT - Self::TREE_MIN_HEIGHT + 1) as u32;
        let tree_height = Self::TREE_MIN_HEIGHT
            + self.detail_noise.sample_discrete(world_x * 0.1, world_z * 0.1, span) as usize;

        if base_y + tree_height + 3 >= CHUNK_HEIGHT {
            return;
        }

        // Trunk must not overlap another tree
        if (base_y..base_y + tree_height).any(|y| !chunk.block(local_x, y, local_z).is_air()) {
            return;
        }

        for y in base_y..base_y + tree_height {
            chunk.set_block(local_x, y, local_z, BlockId::WOOD);
        }

        let leaf_base = base_y + tree_height - 2;
        let leaf_top = base_y + tree_height + 2;
        for y in leaf_base..leaf_top {
            let radius: i32 = if y + 1 == leaf_top { 1 } else { 2 };
            for dz in -radius..=radius {
                for dx in -radius..=radius {
                    if dx * dx + dz * dz > radius * radius + 1 {
                        continue;
                    }
                    let lx = local_x as i32 + dx;
                    let lz = local_z as i32 + dz;
                    if !(0..CHUNK_SIZE as i32).contains(&lx) || !(0..CHUNK_SIZE as i32).contains(&lz) {
                        continue;
                    }
                    let (lx, lz) = (lx as usize, lz as usize);
                    if chunk.block(lx, y, lz).is_air() {
                        chunk.set_block(lx, y, lz, BlockId::LEAVES);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::BLOCKS_PER_CHUNK;
    use crate::registry::StaticRegistry;

    fn generator(seed: u64, params: GenerationParams) -> TerrainGenerator {
        TerrainGenerator::new(WorldSeed::new(seed), params, Arc::new(StaticRegistry::new()))
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = generator(12345, GenerationParams::default());
        let b = generator(12345, GenerationParams::default());
        for coord in [ChunkCoord::new(0, 0), ChunkCoord::new(-3, 7), ChunkCoord::new(100, -100)] {
            assert_eq!(a.generate(coord), b.generate(coord));
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = generator(1, GenerationParams::default()).generate(ChunkCoord::new(0, 0));
        let b = generator(2, GenerationParams::default()).generate(ChunkCoord::new(0, 0));
        assert_ne!(a.blocks(), b.blocks());
    }

    #[test]
    fn test_origin_chunk_shapes() {
        let chunk = generator(12345, GenerationParams::default()).generate(ChunkCoord::new(0, 0));
        assert_eq!(chunk.blocks().len(), BLOCKS_PER_CHUNK);
        assert_eq!(chunk.heightmap().len(), COLUMNS_PER_CHUNK);
        assert!(chunk.heightmap().iter().all(|&h| usize::from(h) < CHUNK_HEIGHT));
        assert!(!chunk.is_dirty());
        // Unlit until the caller runs lighting
        assert!(chunk.skylight_slice().iter().all(|&l| l == 0));
        assert!(chunk.block_light_slice().iter().all(|&l| l == 0));
    }

    #[test]
    fn test_bedrock_floor_and_heightmap_invariant() {
        let generator = generator(99, GenerationParams::default());
        for coord in [ChunkCoord::new(0, 0), ChunkCoord::new(5, -9), ChunkCoord::new(-20, 31)] {
            let chunk = generator.generate(coord);
            for lz in 0..CHUNK_SIZE {
                for lx in 0..CHUNK_SIZE {
                    assert_eq!(chunk.block(lx, 0, lz), BlockId::BEDROCK);
                    let h = chunk.height(lx, lz);
                    assert!(chunk.block(lx, h, lz).is_solid());
                    assert!((h + 1..CHUNK_HEIGHT).all(|y| !chunk.block(lx, y, lz).is_solid()));
                }
            }
        }
    }

    #[test]
    fn test_column_layering() {
        let generator = generator(4242, GenerationParams::bare());
        let sea_level = generator.params().sea_level as usize;

        for coord in [ChunkCoord::new(0, 0), ChunkCoord::new(17, 3), ChunkCoord::new(-8, -40)] {
            let chunk = generator.generate(coord);
            let palette = *StaticRegistry::new().palette(chunk.biome());
            let depth = usize::from(palette.subsurface_depth);

            for lz in 0..CHUNK_SIZE {
                for lx in 0..CHUNK_SIZE {
                    let h = generator
                        .classifier()
                        .terrain_height(coord.world_x() + lx as i64, coord.world_z() + lz as i64)
                        as usize;
                    assert_eq!(chunk.block(lx, h, lz), palette.surface);
                    for y in h.saturating_sub(depth).max(1)..h {
                        assert_eq!(chunk.block(lx, y, lz), palette.subsurface);
                    }
                    for y in 1..h.saturating_sub(depth) {
                        assert_eq!(chunk.block(lx, y, lz), palette.filler);
                    }
                    for y in h + 1..sea_level {
                        assert!(matches!(chunk.block(lx, y, lz), BlockId::WATER | BlockId::ICE));
                    }
                    for y in (h + 1).max(sea_level)..CHUNK_HEIGHT {
                        assert!(chunk.block(lx, y, lz).is_air());
                    }
                }
            }
        }
    }

    #[test]
    fn test_caves_respect_depth_and_lava_level() {
        let params = GenerationParams { ores: false, decorations: false, ..GenerationParams::default() };
        let generator = generator(7, params.clone());
        let mut carved = 0usize;

        for cx in -3..3 {
            for cz in -3..3 {
                let coord = ChunkCoord::new(cx, cz);
                let chunk = generator.generate(coord);
                for lz in 0..CHUNK_SIZE {
                    for lx in 0..CHUNK_SIZE {
                        let surface = generator
                            .classifier()
                            .terrain_height(coord.world_x() + lx as i64, coord.world_z() + lz as i64)
                            as usize;
                        let protected = surface.saturating_sub(params.cave_min_depth as usize);
                        for y in 1..surface {
                            let block = chunk.block(lx, y, lz);
                            if block == BlockId::AIR || block == BlockId::LAVA {
                                assert!(y < protected, "cave at y={y} too close to surface {surface}");
                                carved += 1;
                            }
                            if block == BlockId::LAVA {
                                assert!(y as i32 <= params.lava_level);
                            }
                        }
                    }
                }
            }
        }

        assert!(carved > 0, "expected at least one carved cell");
    }

    #[test]
    fn test_ores_replace_filler_below_max_y() {
        let params = GenerationParams { caves: false, decorations: false, ..GenerationParams::default() };
        let generator = generator(31337, params);
        let mut ores = 0usize;

        for cx in 0..4 {
            let chunk = generator.generate(ChunkCoord::new(cx, 0));
            let palette = *StaticRegistry::new().palette(chunk.biome());
            for (index, block) in chunk.blocks().iter().enumerate() {
                if let Some(ore) = palette.ores.iter().find(|o| o.block == *block) {
                    let y = crate::chunk::index_to_local(index).y;
                    assert!(y <= usize::from(ore.max_y));
                    ores += 1;
                }
            }
        }

        assert!(ores > 0);
    }

    fn generator_with_palette(seed: u64, palette: BiomePalette) -> TerrainGenerator {
        let registry = Biome::ALL
            .into_iter()
            .fold(StaticRegistry::new(), |registry, biome| registry.with_palette(biome, palette));
        let params = GenerationParams { caves: false, ores: false, ..GenerationParams::default() };
        TerrainGenerator::new(WorldSeed::new(seed), params, Arc::new(registry))
    }

    /// First `wanted` chunks with mostly dry land, scanning outward from the origin.
    fn land_chunks(generator: &TerrainGenerator, wanted: usize) -> Vec<Chunk> {
        let sea_level = generator.params().sea_level as usize;
        (0..400)
            .map(|i| ChunkCoord::new(i % 20 * 3 - 30, i / 20 * 3 - 30))
            .map(|coord| generator.generate(coord))
            .filter(|chunk| chunk.heightmap().iter().filter(|&&h| usize::from(h) > sea_level).count() > 128)
            .take(wanted)
            .collect()
    }

    #[test]
    fn test_tree_palette_grows_trees() {
        let palette = BiomePalette {
            decorations: &[Decoration::Tree { density: 100 }],
            ..Biome::Forest.default_palette()
        };
        let generator = generator_with_palette(2024, palette);

        let chunks = land_chunks(&generator, 6);
        assert_eq!(chunks.len(), 6, "not enough land to plant on");

        let wood: usize = chunks.iter().map(|c| c.count_blocks(|b| b == BlockId::WOOD)).sum();
        let leaves: usize = chunks.iter().map(|c| c.count_blocks(|b| b == BlockId::LEAVES)).sum();
        println!("trees: {wood} wood, {leaves} leaves over {} chunks", chunks.len());
        assert!(wood > 0, "tree palette grew no trunks");
        assert!(leaves > 0, "trees have no canopy");
    }

    #[test]
    fn test_cactus_palette_places_cacti_on_sand() {
        let palette = BiomePalette {
            decorations: &[Decoration::Cactus { density: 100 }],
            ..Biome::Desert.default_palette()
        };
        let generator = generator_with_palette(77, palette);

        let chunks = land_chunks(&generator, 6);
        assert_eq!(chunks.len(), 6, "not enough land to plant on");

        let mut cacti = 0usize;
        for chunk in &chunks {
            for (index, block) in chunk.blocks().iter().enumerate() {
                if *block != BlockId::CACTUS {
                    continue;
                }
                cacti += 1;
                let pos = crate::chunk::index_to_local(index);
                let below = chunk.block(pos.x, pos.y - 1, pos.z);
                assert!(matches!(below, BlockId::SAND | BlockId::CACTUS), "cactus standing on {below:?}");
            }
        }
        assert!(cacti > 0, "cactus palette placed nothing");
    }

    #[test]
    fn test_generates_chunks_past_i32_block_range() {
        let generator = generator(1, GenerationParams::default());

        for coord in [
            ChunkCoord::new(i32::MAX / 8, 0),
            ChunkCoord::new(i32::MIN, i32::MAX),
            ChunkCoord::new(i32::MAX, i32::MIN),
        ] {
            let chunk = generator.generate(coord);
            assert_eq!(chunk.coord(), coord);
            assert!(chunk.heightmap().iter().all(|&h| (1..CHUNK_HEIGHT).contains(&usize::from(h))));
            assert_eq!(chunk, generator.generate(coord));
        }
    }

    #[test]
    fn test_heights_follow_world_position_past_i32_range() {
        let generator = generator(5, GenerationParams::bare());
        let classifier = generator.classifier();
        let sea_level = generator.params().sea_level;

        // East starts exactly at block x = 2^31
        let west = ChunkCoord::new(i32::MAX / 16, 3);
        let east = ChunkCoord::new(i32::MAX / 16 + 1, 3);
        assert_eq!(east.world_x(), 1_i64 << 31);
        let chunk = generator.generate(east);

        for lz in 0..CHUNK_SIZE {
            let z = east.world_z() + lz as i64;
            for lx in 0..CHUNK_SIZE {
                let h = classifier.terrain_height(east.world_x() + lx as i64, z);
                if h >= sea_level {
                    assert_eq!(chunk.height(lx, lz), h as usize);
                }
            }

            let a = classifier.terrain_height(west.world_x() + CHUNK_SIZE as i64 - 1, z);
            let b = classifier.terrain_height(east.world_x(), z);
            assert!((a - b).abs() <= 8, "seam at z={z}: {a} vs {b}");
        }
    }
}
