//! # Biome Classification
//!
//! Determines terrain type from noise values.
//!
//! Uses a climate model based on:
//! - Temperature (one noise channel)
//! - Humidity (a second, decorrelated channel)
//! - Elevation (the same noise that shapes the terrain)
//!
//! A chunk has exactly one biome, sampled at the chunk centre.

use serde::{Deserialize, Serialize};

use crate::chunk::{BlockId, ChunkCoord, CHUNK_HEIGHT, CHUNK_SIZE};
use crate::noise::{SimplexNoise, WorldSeed};
use crate::params::GenerationParams;

/// Biome types in the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Biome {
    /// Open water, surface below sea level.
    Ocean = 0,
    /// Plains/grassland.
    Plains = 1,
    /// Temperate forest.
    Forest = 2,
    /// Dense jungle.
    Jungle = 3,
    /// Arid desert.
    Desert = 4,
    /// Cold tundra.
    Tundra = 5,
    /// High mountains.
    Mountains = 6,
}

impl Biome {
    /// Every biome, in discriminant order.
    pub const ALL: [Self; 7] = [
        Self::Ocean,
        Self::Plains,
        Self::Forest,
        Self::Jungle,
        Self::Desert,
        Self::Tundra,
        Self::Mountains,
    ];

    /// Converts from u8, rejecting unknown discriminants.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ocean),
            1 => Some(Self::Plains),
            2 => Some(Self::Forest),
            3 => Some(Self::Jungle),
            4 => Some(Self::Desert),
            5 => Some(Self::Tundra),
            6 => Some(Self::Mountains),
            _ => None,
        }
    }

    /// Built-in block palette for this biome.
    #[must_use]
    pub fn default_palette(self) -> BiomePalette {
        match self {
            Self::Ocean => BiomePalette {
                surface: BlockId::SAND,
                subsurface: BlockId::GRAVEL,
                subsurface_depth: 3,
                filler: BlockId::STONE,
                decorations: &[],
                ores: STANDARD_ORES,
            },
            Self::Plains => BiomePalette {
                decorations: &[Decoration::Tree { density: 5 }],
                ..BiomePalette::GRASSLAND
            },
            Self::Forest => BiomePalette {
                decorations: &[Decoration::Tree { density: 50 }],
                ..BiomePalette::GRASSLAND
            },
            Self::Jungle => BiomePalette {
                decorations: &[Decoration::Tree { density: 80 }],
                ..BiomePalette::GRASSLAND
            },
            Self::Desert => BiomePalette {
                surface: BlockId::SAND,
                subsurface: BlockId::SANDSTONE,
                subsurface_depth: 4,
                filler: BlockId::STONE,
                decorations: &[Decoration::Cactus { density: 10 }],
                ores: DESERT_ORES,
            },
            Self::Tundra => BiomePalette {
                surface: BlockId::SNOW,
                decorations: &[Decoration::Tree { density: 8 }],
                ..BiomePalette::GRASSLAND
            },
            Self::Mountains => BiomePalette {
                surface: BlockId::STONE,
                subsurface: BlockId::STONE,
                subsurface_depth: 1,
                filler: BlockId::STONE,
                decorations: &[],
                ores: MOUNTAIN_ORES,
            },
        }
    }
}

/// A surface feature placed after terrain shaping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decoration {
    /// Trunk and leaf canopy on grass or snow. Density 0-100.
    Tree {
        /// Relative frequency (0-100).
        density: u8,
    },
    /// Cactus column on sand. Density 0-100.
    Cactus {
        /// Relative frequency (0-100).
        density: u8,
    },
}

/// Chance of replacing a filler block with an ore.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OreChance {
    /// Ore block placed.
    pub block: BlockId,
    /// Per-candidate probability.
    pub probability: f64,
    /// Ore never appears above this Y.
    pub max_y: u16,
}

/// Blocks and features that make up one biome.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiomePalette {
    /// Block at the heightmap Y.
    pub surface: BlockId,
    /// Blocks directly beneath the surface.
    pub subsurface: BlockId,
    /// Number of subsurface layers.
    pub subsurface_depth: u8,
    /// Everything below the subsurface down to bedrock.
    pub filler: BlockId,
    /// Surface features, applied in order.
    pub decorations: &'static [Decoration],
    /// Ores, first match wins.
    pub ores: &'static [OreChance],
}

impl BiomePalette {
    const GRASSLAND: Self = Self {
        surface: BlockId::GRASS,
        subsurface: BlockId::DIRT,
        subsurface_depth: 3,
        filler: BlockId::STONE,
        decorations: &[],
        ores: STANDARD_ORES,
    };
}

const STANDARD_ORES: &[OreChance] = &[
    OreChance { block: BlockId::DIAMOND_ORE, probability: 0.0008, max_y: 16 },
    OreChance { block: BlockId::GOLD_ORE, probability: 0.0015, max_y: 32 },
    OreChance { block: BlockId::IRON_ORE, probability: 0.006, max_y: 64 },
    OreChance { block: BlockId::COAL_ORE, probability: 0.012, max_y: 128 },
];

const DESERT_ORES: &[OreChance] = &[
    OreChance { block: BlockId::DIAMOND_ORE, probability: 0.0008, max_y: 16 },
    OreChance { block: BlockId::GOLD_ORE, probability: 0.004, max_y: 48 },
    OreChance { block: BlockId::IRON_ORE, probability: 0.005, max_y: 64 },
    OreChance { block: BlockId::COAL_ORE, probability: 0.008, max_y: 128 },
];

const MOUNTAIN_ORES: &[OreChance] = &[
    OreChance { block: BlockId::DIAMOND_ORE, probability: 0.001, max_y: 16 },
    OreChance { block: BlockId::GOLD_ORE, probability: 0.0015, max_y: 32 },
    OreChance { block: BlockId::IRON_ORE, probability: 0.01, max_y: 160 },
    OreChance { block: BlockId::COAL_ORE, probability: 0.015, max_y: 256 },
];

/// Climate sample at one location.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Climate {
    /// Temperature in [-1, 1].
    pub temperature: f64,
    /// Humidity in [-1, 1].
    pub humidity: f64,
    /// Elevation in [-1, 1].
    pub elevation: f64,
}

/// Biome classifier that determines biome from world coordinates.
///
/// Also owns the elevation field, so terrain height and biome elevation
/// always agree.
pub struct BiomeClassifier {
    temperature_noise: SimplexNoise,
    humidity_noise: SimplexNoise,
    elevation_noise: SimplexNoise,
    params: GenerationParams,
    /// Elevation at which the surface meets sea level.
    ocean_elevation: f64,
}

impl BiomeClassifier {
    /// Seed salt of the temperature channel.
    const TEMPERATURE_CHANNEL: u64 = 1;
    /// Seed salt of the humidity channel.
    const HUMIDITY_CHANNEL: u64 = 2;
    /// Seed salt of the elevation channel.
    const ELEVATION_CHANNEL: u64 = 3;
    /// Spatial offset between the climate channels.
    const HUMIDITY_OFFSET: f64 = 10_000.0;

    /// Creates a new biome classifier from a world seed.
    #[must_use]
    pub fn new(seed: WorldSeed, params: &GenerationParams) -> Self {
        let ocean_elevation = if params.terrain_amplitude > 0.0 {
            (f64::from(params.sea_level) - params.terrain_baseline) / params.terrain_amplitude
        } else {
            f64::NEG_INFINITY
        };

        Self {
            temperature_noise: SimplexNoise::new(seed.derive(Self::TEMPERATURE_CHANNEL)),
            humidity_noise: SimplexNoise::new(seed.derive(Self::HUMIDITY_CHANNEL)),
            elevation_noise: SimplexNoise::new(seed.derive(Self::ELEVATION_CHANNEL)),
            params: params.clone(),
            ocean_elevation,
        }
    }

    /// Classifies the biome of a chunk, sampled at its centre.
    #[must_use]
    pub fn classify(&self, coord: ChunkCoord) -> Biome {
        let half = (CHUNK_SIZE / 2) as i64;
        let x = (coord.world_x() + half) as f64;
        let z = (coord.world_z() + half) as f64;
        self.classify_climate(self.climate(x, z))
    }

    /// Samples all three climate channels at a world column.
    #[must_use]
    pub fn climate(&self, x: f64, z: f64) -> Climate {
        let scale = self.params.climate_frequency;
        Climate {
            temperature: self.temperature_noise.octaved(x * scale, z * scale, 2, 0.5, 2.0),
            humidity: self.humidity_noise.octaved(
                x * scale + Self::HUMIDITY_OFFSET,
                z * scale - Self::HUMIDITY_OFFSET,
                2,
                0.5,
                2.0,
            ),
            elevation: self.elevation(x, z),
        }
    }

    /// Classifies biome from climate values.
    ///
    /// Water and mountains are decided by elevation first; the remaining
    /// rules are evaluated in order, first match wins.
    #[must_use]
    pub fn classify_climate(&self, climate: Climate) -> Biome {
        if climate.elevation < self.ocean_elevation {
            return Biome::Ocean;
        }
        if climate.elevation > self.params.mountain_elevation {
            return Biome::Mountains;
        }

        match (climate.temperature, climate.humidity) {
            (t, _) if t < -0.5 => Biome::Tundra,
            (t, h) if t > 0.5 && h < -0.3 => Biome::Desert,
            (_, h) if h > 0.3 => Biome::Jungle,
            (t, h) if t > 0.0 && h > 0.0 => Biome::Forest,
            _ => Biome::Plains,
        }
    }

    /// Elevation at a world column, in [-1, 1].
    #[must_use]
    pub fn elevation(&self, x: f64, z: f64) -> f64 {
        let params = &self.params;
        let fx = x * params.terrain_frequency;
        let fz = z * params.terrain_frequency;

        let base = self.elevation_noise.octaved(
            fx,
            fz,
            params.terrain_octaves,
            params.terrain_persistence,
            params.terrain_lacunarity,
        );
        if params.ridge_weight <= 0.0 {
            return base;
        }

        // Ridges only lift terrain that is already high
        let ridged = self.elevation_noise.ridged(fx * 1.5, fz * 1.5, 3);
        let lift = ridged * base.max(0.0) * params.ridge_weight;
        (base + lift).clamp(-1.0, 1.0)
    }

    /// Surface Y at a world column, `floor(n * amplitude + baseline)`.
    ///
    /// Clamped to `[1, H - 1]`; Y = 0 is reserved for bedrock.
    #[must_use]
    pub fn terrain_height(&self, x: i64, z: i64) -> i32 {
        let n = self.elevation(x as f64, z as f64);
        let raw = (n * self.params.terrain_amplitude + self.params.terrain_baseline).floor();
        (raw as i32).clamp(1, CHUNK_HEIGHT as i32 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(seed: u64) -> BiomeClassifier {
        BiomeClassifier::new(WorldSeed::new(seed), &GenerationParams::default())
    }

    #[test]
    fn test_biome_determinism() {
        let classifier1 = classifier(42);
        let classifier2 = classifier(42);

        for i in -50..50 {
            let coord = ChunkCoord::new(i * 7, i * -3);
            assert_eq!(
                classifier1.classify(coord),
                classifier2.classify(coord),
                "Biome classification should be deterministic"
            );
        }
    }

    #[test]
    fn test_elevation_range() {
        let classifier = classifier(42);

        for i in 0..1000 {
            let x = (f64::from(i) - 500.0) * 37.0;
            let z = (f64::from(i) * 0.7 - 350.0) * 41.0;

            let elevation = classifier.elevation(x, z);
            assert!((-1.0..=1.0).contains(&elevation), "Elevation {elevation} out of range");
        }
    }

    #[test]
    fn test_climate_rules_in_order() {
        let classifier = classifier(1);
        let land = |temperature, humidity| Climate { temperature, humidity, elevation: 0.1 };

        assert_eq!(classifier.classify_climate(land(-0.8, 0.9)), Biome::Tundra);
        assert_eq!(classifier.classify_climate(land(0.8, -0.6)), Biome::Desert);
        assert_eq!(classifier.classify_climate(land(0.8, 0.6)), Biome::Jungle);
        assert_eq!(classifier.classify_climate(land(-0.2, 0.6)), Biome::Jungle);
        assert_eq!(classifier.classify_climate(land(0.2, 0.2)), Biome::Forest);
        assert_eq!(classifier.classify_climate(land(0.8, -0.1)), Biome::Plains);
        assert_eq!(classifier.classify_climate(land(-0.2, -0.2)), Biome::Plains);
    }

    #[test]
    fn test_elevation_overrides_climate() {
        let classifier = classifier(1);
        let hot_dry = |elevation| Climate { temperature: 0.9, humidity: -0.9, elevation };

        assert_eq!(classifier.classify_climate(hot_dry(-0.9)), Biome::Ocean);
        assert_eq!(classifier.classify_climate(hot_dry(0.9)), Biome::Mountains);
        assert_eq!(classifier.classify_climate(hot_dry(0.1)), Biome::Desert);
    }

    #[test]
    fn test_ocean_matches_sea_level() {
        let params = GenerationParams::default();
        let classifier = classifier(777);

        for i in -40..40 {
            let coord = ChunkCoord::new(i * 5, i * 11);
            let centre_x = coord.world_x() + 8;
            let centre_z = coord.world_z() + 8;
            let below_sea = classifier.terrain_height(centre_x, centre_z) < params.sea_level;
            if classifier.classify(coord) == Biome::Ocean {
                assert!(below_sea, "Ocean chunk {coord} has land at its centre");
            }
        }
    }

    #[test]
    fn test_multiple_biomes_reachable() {
        let classifier = classifier(12345);
        let mut found = std::collections::HashSet::new();

        for x in (-400..400).step_by(8) {
            for z in (-400..400).step_by(8) {
                found.insert(classifier.classify(ChunkCoord::new(x, z)));
            }
        }

        assert!(found.len() >= 3, "Should find multiple biomes, found: {found:?}");
    }

    #[test]
    fn test_terrain_height_bounds() {
        let classifier = classifier(9);
        for i in -500..500 {
            let h = classifier.terrain_height(i * 13, i * -29);
            assert!((1..CHUNK_HEIGHT as i32).contains(&h));
        }
    }

    #[test]
    fn test_from_u8_roundtrip() {
        for biome in Biome::ALL {
            assert_eq!(Biome::from_u8(biome as u8), Some(biome));
        }
        assert_eq!(Biome::from_u8(200), None);
    }
}
