//! Stochastic obstacle generation

use glam::Vec2;
use rand::Rng;

use super::state::{Obstacle, ObstacleKind};
use crate::consts::WIDTH;
use crate::settings::Settings;

/// Maximum horizontal drift magnitude (pixels per tick)
pub const MAX_DRIFT: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPolicy {
    /// Probability per tick that a new obstacle appears
    pub spawn_chance: f64,
    /// Probability that a new obstacle is a bonus
    pub bonus_chance: f64,
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        Self {
            spawn_chance: 0.05,
            bonus_chance: 0.10,
        }
    }
}

impl SpawnPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            spawn_chance: settings.spawn_chance.clamp(0.0, 1.0),
            bonus_chance: settings.bonus_chance.clamp(0.0, 1.0),
        }
    }

    /// Roll the per-tick spawn chance and append at most one obstacle
    pub fn maybe_spawn<R: Rng + ?Sized>(&self, rng: &mut R, obstacles: &mut Vec<Obstacle>) -> bool {
        if !rng.random_bool(self.spawn_chance) {
            return false;
        }
        obstacles.push(self.spawn(rng));
        true
    }

    /// Generate one obstacle just above the visible area
    pub fn spawn<R: Rng + ?Sized>(&self, rng: &mut R) -> Obstacle {
        let kind = if rng.random_bool(self.bonus_chance) {
            ObstacleKind::Bonus
        } else {
            ObstacleKind::Hazard
        };
        let size = kind.spec().size;
        let x = rng.random_range(0.0..=WIDTH - size);
        let vx = rng.random_range(-MAX_DRIFT..=MAX_DRIFT) as f32;
        Obstacle::new(kind, Vec2::new(x, -size)).with_drift(vx)
    }
}
