//! # World Configuration
//!
//! Loaded once at startup from TOML. Every section has defaults, so a
//! partial file only lists what it changes:
//!
//! ```toml
//! seed = 12345
//!
//! [generation]
//! sea_level = 62
//!
//! [store]
//! max_save_attempts = 5
//!
//! [[blocks]]
//! id = 18
//! luminance = 12
//! ```

use std::path::Path;
use std::time::Duration;

use geode_procedural::{BlockOverride, GenerationParams, StaticRegistry, WorldSeed};
use serde::Deserialize;

use crate::error::ConfigError;

/// Chunk store and background worker settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Mutations of non-resident chunks load them first. When false they
    /// fail with `ChunkNotLoaded`.
    pub auto_load: bool,
    /// Backend write attempts before a save is reported as failed.
    pub max_save_attempts: u32,
    /// Backend read attempts before a load is reported as failed.
    pub max_read_attempts: u32,
    /// First retry delay; doubles on every further attempt.
    pub backoff_base_ms: u64,
    /// Period of the background dirty flush. 0 disables it.
    pub flush_interval_ms: u64,
    /// Generation threads. 0 uses available parallelism.
    pub worker_threads: usize,
    /// Pending generation jobs before `request` starts refusing.
    pub job_queue_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            auto_load: true,
            max_save_attempts: 3,
            max_read_attempts: 3,
            backoff_base_ms: 10,
            flush_interval_ms: 5_000,
            worker_threads: 0,
            job_queue_capacity: 256,
        }
    }
}

impl StoreConfig {
    /// Production config: larger queue, slower flush, more patient retries.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            auto_load: true,
            max_save_attempts: 5,
            max_read_attempts: 3,
            backoff_base_ms: 20,
            flush_interval_ms: 30_000,
            worker_threads: 0,
            job_queue_capacity: 1_024,
        }
    }

    /// First retry delay.
    #[must_use]
    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Background flush period, or `None` when disabled.
    #[must_use]
    pub const fn flush_interval(&self) -> Option<Duration> {
        if self.flush_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.flush_interval_ms))
        }
    }

    /// Worker thread count with 0 resolved to available parallelism.
    #[must_use]
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}

/// Load-policy settings. Distances are in chunks.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Chunks within this Euclidean radius of an observer are loaded.
    pub view_radius: u32,
    /// Retention radius at zero memory pressure.
    pub base_unload_distance: f64,
    /// How far ahead (seconds) predictive loading extrapolates velocity.
    pub prediction_horizon_secs: f64,
    /// Load requests handed out per tick.
    pub max_requests_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            view_radius: 8,
            base_unload_distance: 12.0,
            prediction_horizon_secs: 2.0,
            max_requests_per_tick: 16,
        }
    }
}

impl SchedulerConfig {
    /// Production config: wider view, more requests per tick.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            view_radius: 12,
            base_unload_distance: 18.0,
            prediction_horizon_secs: 3.0,
            max_requests_per_tick: 64,
        }
    }
}

/// Full world configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World seed. Immutable for the lifetime of a world.
    pub seed: u64,
    /// Terrain parameters.
    pub generation: GenerationParams,
    /// Chunk store settings.
    pub store: StoreConfig,
    /// Load-policy settings.
    pub scheduler: SchedulerConfig,
    /// Block registry overrides.
    pub blocks: Vec<BlockOverride>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: WorldSeed::default().value(),
            generation: GenerationParams::default(),
            store: StoreConfig::default(),
            scheduler: SchedulerConfig::default(),
            blocks: Vec::new(),
        }
    }
}

impl WorldConfig {
    /// Production config for the given seed.
    #[must_use]
    pub fn production(seed: u64) -> Self {
        Self {
            seed,
            generation: GenerationParams::default(),
            store: StoreConfig::production(),
            scheduler: SchedulerConfig::production(),
            blocks: Vec::new(),
        }
    }

    /// Default config with the given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, ..Self::default() }
    }

    /// World seed.
    #[must_use]
    pub const fn world_seed(&self) -> WorldSeed {
        WorldSeed::new(self.seed)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and
    /// `ConfigError::Invalid` for inconsistent values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.generation.validate().map_err(ConfigError::Invalid)?;

        let store = &self.store;
        if store.max_save_attempts == 0 || store.max_read_attempts == 0 {
            return Err(ConfigError::Invalid("retry attempts must be at least 1".to_owned()));
        }
        if store.max_save_attempts > 16 || store.max_read_attempts > 16 {
            return Err(ConfigError::Invalid("retry attempts must be at most 16".to_owned()));
        }
        if store.job_queue_capacity == 0 {
            return Err(ConfigError::Invalid("job_queue_capacity must be positive".to_owned()));
        }

        let scheduler = &self.scheduler;
        if !(scheduler.base_unload_distance.is_finite() && scheduler.base_unload_distance > 0.0) {
            return Err(ConfigError::Invalid("base_unload_distance must be positive".to_owned()));
        }
        if scheduler.base_unload_distance < f64::from(scheduler.view_radius) {
            return Err(ConfigError::Invalid(format!(
                "base_unload_distance {} is inside view_radius {}",
                scheduler.base_unload_distance, scheduler.view_radius
            )));
        }
        if !(scheduler.prediction_horizon_secs.is_finite() && scheduler.prediction_horizon_secs >= 0.0) {
            return Err(ConfigError::Invalid("prediction_horizon_secs must be non-negative".to_owned()));
        }

        for block in &self.blocks {
            if block.opacity > 15 || block.luminance > 15 {
                return Err(ConfigError::Invalid(format!(
                    "block {}: opacity and luminance must be 0-15",
                    block.id
                )));
            }
        }
        Ok(())
    }

    /// Block registry with this config's overrides applied.
    #[must_use]
    pub fn registry(&self) -> StaticRegistry {
        StaticRegistry::new().with_overrides(self.blocks.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geode_procedural::{BlockId, Registry};

    #[test]
    fn test_defaults_validate() {
        assert!(WorldConfig::default().validate().is_ok());
        assert!(WorldConfig::production(7).validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = WorldConfig::from_toml_str(
            r"
            seed = 12345

            [generation]
            sea_level = 62

            [store]
            max_save_attempts = 5
            ",
        )
        .unwrap();

        assert_eq!(config.seed, 12345);
        assert_eq!(config.generation.sea_level, 62);
        assert_eq!(config.generation.terrain_octaves, GenerationParams::default().terrain_octaves);
        assert_eq!(config.store.max_save_attempts, 5);
        assert!(config.store.auto_load);
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn test_block_overrides_reach_registry() {
        let config = WorldConfig::from_toml_str(
            r"
            [[blocks]]
            id = 18
            luminance = 12

            [[blocks]]
            id = 500
            opacity = 0
            luminance = 3
            transparent = true
            ",
        )
        .unwrap();

        let registry = config.registry();
        assert_eq!(registry.block(BlockId::GLOWSTONE).luminance, 12);
        assert_eq!(registry.block(BlockId::GLOWSTONE).opacity, 15);
        assert!(registry.block(BlockId::new(500)).transparent);
    }

    #[test]
    fn test_rejects_inconsistent_values() {
        let err = WorldConfig::from_toml_str("[store]\nmax_save_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = WorldConfig::from_toml_str(
            "[scheduler]\nview_radius = 20\nbase_unload_distance = 10.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = WorldConfig::from_toml_str("[generation]\nsea_level = 9000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = WorldConfig::from_toml_str("[[blocks]]\nid = 1\nluminance = 99\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = WorldConfig::from_toml_str("seed = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_flush_interval_disables_flusher() {
        let store = StoreConfig { flush_interval_ms: 0, ..StoreConfig::default() };
        assert_eq!(store.flush_interval(), None);
        assert!(store.resolved_worker_threads() >= 1);
    }
}
