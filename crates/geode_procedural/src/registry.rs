//! Block and biome attribute lookup.
//!
//! Generation, lighting and the store all consult a [`Registry`] rather than
//! hard-coding per-block numbers, so a world can ship its own light values.

use serde::Deserialize;

use crate::biome::{Biome, BiomePalette};
use crate::chunk::{BlockId, MAX_LIGHT};

/// Light attributes of one block type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockProperties {
    /// Light lost when passing through this block (0-15).
    pub opacity: u8,
    /// Light emitted by this block (0-15).
    pub luminance: u8,
    /// Passes skylight through without attenuation.
    pub transparent: bool,
}

impl BlockProperties {
    /// Empty space.
    pub const AIR: Self = Self { opacity: 0, luminance: 0, transparent: true };
    /// Fully opaque, non-emissive. Also the fallback for unknown ids.
    pub const OPAQUE: Self = Self { opacity: MAX_LIGHT, luminance: 0, transparent: false };

    /// Creates properties, clamping both levels to 0-15.
    #[must_use]
    pub fn new(opacity: u8, luminance: u8, transparent: bool) -> Self {
        Self {
            opacity: opacity.min(MAX_LIGHT),
            luminance: luminance.min(MAX_LIGHT),
            transparent,
        }
    }

    /// True if this block is a light source.
    #[inline]
    #[must_use]
    pub const fn is_emissive(self) -> bool {
        self.luminance > 0
    }
}

/// Lookup of block light attributes and biome palettes.
pub trait Registry: Send + Sync {
    /// Light attributes of a block id.
    fn block(&self, id: BlockId) -> BlockProperties;

    /// Block palette of a biome.
    fn palette(&self, biome: Biome) -> &BiomePalette;
}

/// Per-block override, as read from a `[[blocks]]` config table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct BlockOverride {
    /// Numeric block id.
    pub id: u16,
    /// Opacity (clamped to 15).
    #[serde(default = "default_opacity")]
    pub opacity: u8,
    /// Luminance (clamped to 15).
    #[serde(default)]
    pub luminance: u8,
    /// Skylight passes unattenuated.
    #[serde(default)]
    pub transparent: bool,
}

const fn default_opacity() -> u8 {
    MAX_LIGHT
}

/// Built-in registry with optional per-id overrides.
#[derive(Clone, Debug)]
pub struct StaticRegistry {
    blocks: Vec<BlockProperties>,
    palettes: Vec<BiomePalette>,
}

impl Default for StaticRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticRegistry {
    /// Registry with the built-in block catalog and biome palettes.
    #[must_use]
    pub fn new() -> Self {
        let mut blocks = vec![BlockProperties::OPAQUE; BlockId::BUILTIN_COUNT];
        let mut set = |id: BlockId, props: BlockProperties| blocks[usize::from(id.raw())] = props;

        set(BlockId::AIR, BlockProperties::AIR);
        set(BlockId::WATER, BlockProperties::new(2, 0, false));
        set(BlockId::ICE, BlockProperties::new(2, 0, false));
        set(BlockId::LEAVES, BlockProperties::new(1, 0, false));
        set(BlockId::LAVA, BlockProperties::new(15, 15, false));
        set(BlockId::GLOWSTONE, BlockProperties::new(15, 15, false));
        set(BlockId::TORCH, BlockProperties::new(0, 14, true));

        Self {
            blocks,
            palettes: Biome::ALL.iter().map(|b| b.default_palette()).collect(),
        }
    }

    /// Applies overrides on top of the built-in catalog.
    ///
    /// Ids beyond the catalog extend it; gaps default to opaque.
    #[must_use]
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = BlockOverride>,
    {
        for o in overrides {
            let index = usize::from(o.id);
            if index >= self.blocks.len() {
                self.blocks.resize(index + 1, BlockProperties::OPAQUE);
            }
            self.blocks[index] = BlockProperties::new(o.opacity, o.luminance, o.transparent);
        }
        self
    }

    /// Replaces the palette of one biome.
    #[must_use]
    pub fn with_palette(mut self, biome: Biome, palette: BiomePalette) -> Self {
        self.palettes[biome as usize] = palette;
        self
    }
}

impl Registry for StaticRegistry {
    #[inline]
    fn block(&self, id: BlockId) -> BlockProperties {
        self.blocks
            .get(usize::from(id.raw()))
            .copied()
            .unwrap_or(BlockProperties::OPAQUE)
    }

    #[inline]
    fn palette(&self, biome: Biome) -> &BiomePalette {
        &self.palettes[biome as usize]
    }
}
