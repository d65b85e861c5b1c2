//! Checkpoint store configuration loaded from environment variables.

use std::time::Duration;

/// Default age after which checkpoints are purged.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval between retention sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Checkpoint store settings.
///
/// Reads from environment variables:
/// - `ROLLBACK_ENABLE_CHECKPOINTS`: feature flag (default: `true`)
/// - `CHECKPOINT_RETENTION_SECS`: retention window (default: 24 hours)
/// - `CHECKPOINT_SWEEP_INTERVAL_SECS`: sweep period (default: 60 seconds)
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub enabled: bool,
    pub retention: Duration,
    pub sweep_interval: Duration,
}

impl CheckpointConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("ROLLBACK_ENABLE_CHECKPOINTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enabled),
            retention: std::env::var("CHECKPOINT_RETENTION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention),
            sweep_interval: std::env::var("CHECKPOINT_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }

    /// Returns a copy with checkpoints switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention: DEFAULT_RETENTION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = CheckpointConfig::default();
        assert!(config.enabled);
        assert_eq!(config.retention, Duration::from_secs(86_400));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_disabled_keeps_other_defaults() {
        let config = CheckpointConfig::disabled();
        assert!(!config.enabled);
        assert_eq!(config.retention, DEFAULT_RETENTION);
    }
}
