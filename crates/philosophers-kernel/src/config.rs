//! Configuration types for the room.

use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Top-level room configuration.
///
/// Loaded from JSON at runtime; every field has a default so partial files work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Ring size: number of chairs, forks and philosophers
    pub size: usize,

    /// Random pause taken between (and inside) every step of a philosopher
    pub think: DelayConfig,

    /// Base seed for the per-philosopher random sources (None for entropy)
    pub seed: Option<u64>,
}

/// Inclusive bounds of a random pause, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            size: 5,
            think: DelayConfig::default(),
            seed: None,
        }
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            min_ms: 500,
            max_ms: 999,
        }
    }
}

impl DelayConfig {
    /// A pause of exactly `ms` milliseconds.
    pub fn fixed(ms: u64) -> Self {
        Self {
            min_ms: ms,
            max_ms: ms,
        }
    }

    /// Draw a pause from the configured range.
    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        let ms = if self.max_ms <= self.min_ms {
            self.min_ms
        } else {
            rng.random_range(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(ms)
    }
}

impl RoomConfig {
    /// Create a configuration for a ring of the given size with default pauses.
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading room config {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("parsing room config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the room cannot be built from.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.size >= 1, "ring size must be at least 1");
        ensure!(
            self.think.min_ms <= self.think.max_ms,
            "think delay min ({}ms) exceeds max ({}ms)",
            self.think.min_ms,
            self.think.max_ms
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_defaults_match_original_pause() {
        let config = RoomConfig::default();
        assert_eq!(config.size, 5);
        assert_eq!(config.think, DelayConfig { min_ms: 500, max_ms: 999 });
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_sample_stays_in_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let delay = DelayConfig { min_ms: 3, max_ms: 9 };
        for _ in 0..200 {
            let ms = delay.sample(&mut rng).as_millis() as u64;
            assert!((3..=9).contains(&ms));
        }
        assert_eq!(DelayConfig::fixed(0).sample(&mut rng), Duration::ZERO);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RoomConfig = serde_json::from_str(r#"{"size": 7}"#).unwrap();
        assert_eq!(config.size, 7);
        assert_eq!(config.think, DelayConfig::default());
    }

    fn write_config(name: &str, json: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("room-config-{}-{}.json", name, std::process::id()));
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_load_reads_file() {
        let path = write_config(
            "valid",
            r#"{"size": 3, "think": {"min_ms": 0, "max_ms": 4}, "seed": 42}"#,
        );
        let config = RoomConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.size, 3);
        assert_eq!(config.think, DelayConfig { min_ms: 0, max_ms: 4 });
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_load_rejects_empty_ring() {
        let path = write_config("empty-ring", r#"{"size": 0}"#);
        let err = RoomConfig::load(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(err.to_string(), "ring size must be at least 1");
    }

    #[test]
    fn test_load_reports_missing_file() {
        let path = std::env::temp_dir().join("room-config-does-not-exist.json");
        let err = RoomConfig::load(&path).unwrap_err();
        assert!(err.to_string().starts_with("reading room config"));
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        assert!(RoomConfig::with_size(0).validate().is_err());
        let inverted = RoomConfig {
            think: DelayConfig { min_ms: 10, max_ms: 1 },
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
        assert!(RoomConfig::with_size(1).validate().is_ok());
    }
}
