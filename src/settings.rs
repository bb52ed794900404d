//! Runtime settings
//!
//! Loaded from an optional JSON file, then overridden from `SKYFALL_*`
//! environment variables.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::TICK_HZ;
use crate::error::ConfigError;

/// Which bottom-exiting obstacles earn the clearance reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClearanceRule {
    /// Every obstacle that leaves the bottom of the playfield
    #[default]
    AllExits,
    /// Only hazards that were horizontally within threat range of the player
    ThreatsOnly,
}

impl ClearanceRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClearanceRule::AllExits => "all_exits",
            ClearanceRule::ThreatsOnly => "threats_only",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all_exits" | "all" => Some(ClearanceRule::AllExits),
            "threats_only" | "threats" => Some(ClearanceRule::ThreatsOnly),
            _ => None,
        }
    }
}

/// Simulation and persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Simulation ===
    /// Tick rate of every session loop
    pub tick_hz: u32,
    /// Per-tick probability that the spawn policy runs
    pub spawn_chance: f64,
    /// Probability that a spawned obstacle is a bonus
    pub bonus_chance: f64,
    /// Fixed RNG seed (random per session when absent)
    pub seed: Option<u64>,

    // === Reward shaping ===
    /// Reward for surviving a tick
    pub survival_reward: f32,
    /// Reward per obstacle cleared off the bottom
    pub clearance_reward: f32,
    /// Which exits count as cleared
    pub clearance_rule: ClearanceRule,
    /// Game score added per cleared obstacle
    pub clear_score: u64,

    // === Persistence ===
    /// Leaderboard and training log root
    pub data_dir: PathBuf,
    /// Object-detection dataset root
    pub dataset_dir: PathBuf,
    /// Externally captured frames, one subdirectory per session id
    pub frames_dir: Option<PathBuf>,
    /// Export finished episodes into the dataset
    pub export_dataset: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_hz: TICK_HZ,
            spawn_chance: 0.05,
            bonus_chance: 0.10,
            seed: None,

            survival_reward: 1.0,
            clearance_reward: 10.0,
            clearance_rule: ClearanceRule::AllExits,
            clear_score: 0,

            data_dir: PathBuf::from("data"),
            dataset_dir: PathBuf::from("game_dataset"),
            frames_dir: None,
            export_dataset: false,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, missing fields take defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&json)?;
        settings.validate()?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Write settings as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Resolve settings for the native binary: `SKYFALL_CONFIG` file (if set)
    /// followed by environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = match env::var("SKYFALL_CONFIG") {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => {
                log::info!("Using default settings");
                Self::default()
            }
        };
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Override individual fields from `SKYFALL_*` variables
    pub fn apply_env_overrides(&mut self) {
        self.tick_hz = read_env_u32("SKYFALL_TICK_HZ", self.tick_hz);
        self.spawn_chance = read_env_f64("SKYFALL_SPAWN_CHANCE", self.spawn_chance);
        self.bonus_chance = read_env_f64("SKYFALL_BONUS_CHANCE", self.bonus_chance);
        if let Some(seed) = read_env_optional_u64("SKYFALL_SEED") {
            self.seed = Some(seed);
        }
        if let Ok(rule) = env::var("SKYFALL_CLEARANCE_RULE") {
            match ClearanceRule::from_str(&rule) {
                Some(rule) => self.clearance_rule = rule,
                None => log::warn!(
                    "Unknown SKYFALL_CLEARANCE_RULE {:?}, keeping {}",
                    rule,
                    self.clearance_rule.as_str()
                ),
            }
        }
        if let Ok(dir) = env::var("SKYFALL_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("SKYFALL_DATASET_DIR") {
            self.dataset_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("SKYFALL_FRAMES_DIR") {
            self.frames_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_hz == 0 {
            return Err(ConfigError::Invalid("tick_hz must be positive".into()));
        }
        let chances = [
            ("spawn_chance", self.spawn_chance),
            ("bonus_chance", self.bonus_chance),
        ];
        for (name, p) in chances {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!("{name} must be in [0, 1], got {p}")));
            }
        }
        Ok(())
    }

    /// Duration of one tick
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    /// Directory holding the captured frames of one session
    pub fn session_frames_dir(&self, session_id: &str) -> Option<PathBuf> {
        self.frames_dir.as_ref().map(|dir| dir.join(session_id))
    }
}

fn read_env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(default)
}

fn read_env_optional_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|value| value.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tick_hz, 30);
        assert_eq!(settings.clearance_rule, ClearanceRule::AllExits);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"spawn_chance": 0.2, "clearance_rule": "threats_only"}"#)
                .unwrap();
        assert_eq!(settings.spawn_chance, 0.2);
        assert_eq!(settings.clearance_rule, ClearanceRule::ThreatsOnly);
        assert_eq!(settings.bonus_chance, 0.10);
    }

    #[test]
    fn test_validate_rejects_bad_probability() {
        let settings = Settings {
            bonus_chance: 1.5,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_save_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skyfall.json");
        let settings = Settings {
            seed: Some(7),
            ..Default::default()
        };
        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.seed, Some(7));
    }

    #[test]
    fn test_clearance_rule_from_str() {
        assert_eq!(ClearanceRule::from_str("THREATS"), Some(ClearanceRule::ThreatsOnly));
        assert_eq!(ClearanceRule::from_str("nope"), None);
    }
}
