//! Tunable generation parameters.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Parameters are part of the world identity: changing any of them
//! changes the generated terrain for the same seed.

use serde::{Deserialize, Serialize};

use crate::chunk::CHUNK_HEIGHT;

/// Terrain, cave and decoration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Water fills empty cells below this Y.
    pub sea_level: i32,
    /// Horizontal frequency of the elevation noise (per block).
    pub terrain_frequency: f64,
    /// Height range covered by the elevation noise, in blocks.
    pub terrain_amplitude: f64,
    /// Surface Y where elevation noise is zero.
    pub terrain_baseline: f64,
    /// Octaves of elevation noise.
    pub terrain_octaves: u32,
    /// Amplitude multiplier per octave.
    pub terrain_persistence: f64,
    /// Frequency multiplier per octave.
    pub terrain_lacunarity: f64,
    /// Weight of ridged noise mixed into elevation (0 disables ridges).
    pub ridge_weight: f64,
    /// Horizontal frequency of the temperature and humidity channels.
    pub climate_frequency: f64,
    /// Elevation above which a chunk is classified as mountains.
    pub mountain_elevation: f64,
    /// Whether caves are carved.
    pub caves: bool,
    /// Frequency of the 3D cave channels.
    pub cave_frequency: f64,
    /// Octaves of each cave channel.
    pub cave_octaves: u32,
    /// Carve when `|a| + |b|` falls below this value.
    pub cave_threshold: f64,
    /// Caves stay at least this many blocks below the surface.
    pub cave_min_depth: u32,
    /// Carved cells at or below this Y fill with lava.
    pub lava_level: i32,
    /// Whether ores are scattered.
    pub ores: bool,
    /// Whether trees and cacti are placed.
    pub decorations: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            sea_level: 64,
            terrain_frequency: 0.004,
            terrain_amplitude: 48.0,
            terrain_baseline: 72.0,
            terrain_octaves: 5,
            terrain_persistence: 0.5,
            terrain_lacunarity: 2.0,
            ridge_weight: 0.2,
            climate_frequency: 0.0025,
            mountain_elevation: 0.6,
            caves: true,
            cave_frequency: 0.03,
            cave_octaves: 2,
            cave_threshold: 0.12,
            cave_min_depth: 8,
            lava_level: 10,
            ores: true,
            decorations: true,
        }
    }
}

impl GenerationParams {
    /// Flat preset for tests: no caves, ores or decorations.
    #[must_use]
    pub fn bare() -> Self {
        Self {
            caves: false,
            ores: false,
            decorations: false,
            ..Self::default()
        }
    }

    /// Checks ranges that would otherwise produce degenerate terrain.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        let height = CHUNK_HEIGHT as i32;
        if !(1..height).contains(&self.sea_level) {
            return Err(format!("sea_level {} outside 1..{height}", self.sea_level));
        }
        if !(self.terrain_frequency > 0.0 && self.terrain_frequency.is_finite()) {
            return Err("terrain_frequency must be positive".to_owned());
        }
        if !(self.terrain_amplitude >= 0.0 && self.terrain_amplitude.is_finite()) {
            return Err("terrain_amplitude must be non-negative".to_owned());
        }
        if !(self.terrain_baseline >= 1.0 && self.terrain_baseline < f64::from(height)) {
            return Err(format!("terrain_baseline must be in 1..{height}"));
        }
        if self.terrain_octaves == 0 || self.terrain_octaves > 16 {
            return Err("terrain_octaves must be in 1..=16".to_owned());
        }
        if !(0.0..=1.0).contains(&self.ridge_weight) {
            return Err("ridge_weight must be in 0..=1".to_owned());
        }
        if !(self.climate_frequency > 0.0 && self.climate_frequency.is_finite()) {
            return Err("climate_frequency must be positive".to_owned());
        }
        if self.caves && (self.cave_octaves == 0 || self.cave_octaves > 8) {
            return Err("cave_octaves must be in 1..=8".to_owned());
        }
        if !(0.0..=2.0).contains(&self.cave_threshold) {
            return Err("cave_threshold must be in 0..=2".to_owned());
        }
        Ok(())
    }
}
