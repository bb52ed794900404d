//! Collision detection and resolution
//!
//! Everything is an axis-aligned square: the player box against each
//! obstacle box, tested in spawn order.

use glam::Vec2;

use super::state::{Obstacle, ObstacleKind, Player, Session};

/// Result of resolving one tick's collisions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionResult {
    /// Bonuses consumed this tick
    pub bonuses_collected: u32,
    /// Score added by consumed bonuses
    pub score_gained: u64,
    /// The hazard that ended the episode, if any
    pub hazard: Option<Obstacle>,
}

impl CollisionResult {
    pub fn miss() -> Self {
        Self::default()
    }

    pub fn is_terminal(&self) -> bool {
        self.hazard.is_some()
    }
}

/// Overlap test between two squares given by top-left corner and edge length.
/// Touching edges do not overlap.
#[inline]
pub fn aabb_overlap(a_pos: Vec2, a_size: f32, b_pos: Vec2, b_size: f32) -> bool {
    a_pos.x < b_pos.x + b_size
        && a_pos.x + a_size > b_pos.x
        && a_pos.y < b_pos.y + b_size
        && a_pos.y + a_size > b_pos.y
}

#[inline]
pub fn player_obstacle_overlap(player: &Player, obstacle: &Obstacle) -> bool {
    aabb_overlap(player.pos, player.size, obstacle.pos, obstacle.size)
}

/// Resolve collisions for the current tick.
///
/// Obstacles are evaluated in insertion order. Overlapping bonuses are
/// consumed and scored; the first overlapping hazard makes the session
/// Terminal and ends evaluation, so bonuses after it are left in place.
pub fn resolve_collisions(session: &mut Session) -> CollisionResult {
    let mut result = CollisionResult::miss();
    let mut consumed: Vec<usize> = Vec::new();

    for (idx, obstacle) in session.obstacles.iter().enumerate() {
        if !player_obstacle_overlap(&session.player, obstacle) {
            continue;
        }
        match obstacle.kind {
            ObstacleKind::Bonus => consumed.push(idx),
            ObstacleKind::Hazard => {
                result.hazard = Some(obstacle.clone());
                break;
            }
        }
    }

    // Remove back to front so earlier indices stay valid
    for idx in consumed.into_iter().rev() {
        let bonus = session.obstacles.remove(idx);
        result.bonuses_collected += 1;
        result.score_gained += bonus.kind.spec().score_delta;
    }
    session.score += result.score_gained;

    if result.hazard.is_some() {
        session.terminate();
    }

    result
}
