//! Simulation tuning constants
//!
//! The coupling and look-behind distances were reverse-engineered by
//! observation, not recovered from original game data, so they live in a
//! config that can be overridden from an optional JSON file next to the
//! executable rather than being hardcoded.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Path units between a part's front point and its rear wheels, used for
    /// orientation
    pub rear_wheel_distance: i32,
    /// Path units between a part's front point and the next carriage's front
    pub carriage_spacing: i32,
    /// Default train speed in path units (coordinate-list segments) per second
    pub default_train_speed: f32,
    /// Simulation ticks per second for the headless runner
    pub tick_rate: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            // both tuned by in-game comparison
            rear_wheel_distance: 22,
            carriage_spacing: 38,
            // TODO: min/max speed from the engine's .dat
            default_train_speed: 35.0,
            tick_rate: 30,
        }
    }
}

impl SimConfig {
    /// Load from a JSON file, falling back to defaults if it is missing or
    /// unreadable
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file: {}", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_values() {
        let config = SimConfig::default();
        assert_eq!(config.rear_wheel_distance, 22);
        assert_eq!(config.carriage_spacing, 38);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SimConfig = serde_json::from_str(r#"{"carriage_spacing": 40}"#).unwrap();
        assert_eq!(config.carriage_spacing, 40);
        assert_eq!(config.rear_wheel_distance, 22);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = SimConfig::load(Path::new("does/not/exist.json"));
        assert_eq!(config.tick_rate, 30);
    }
}
