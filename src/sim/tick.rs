//! Fixed timestep simulation tick
//!
//! Advances one session by exactly one step: action, gravity, obstacle
//! motion, exits, collisions, reward, recording, spawning.

use super::collision::resolve_collisions;
use super::policy::DecisionPolicy;
use super::spawn::SpawnPolicy;
use super::state::{Action, Mode, Obstacle, ObstacleKind, Player, Session};
use crate::consts::*;
use crate::error::SimError;
use crate::settings::{ClearanceRule, Settings};
use crate::training::{RecordedState, StateRecord};

/// Horizontal slack used when deciding whether an exiting hazard was a threat
pub const CLEARANCE_THREAT_MARGIN: f32 = 50.0;

/// Input commands for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Action submitted since the previous tick (human mode)
    pub action: Option<Action>,
}

/// Reward shaping and spawning parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickConfig {
    pub survival_reward: f32,
    pub clearance_reward: f32,
    pub clearance_rule: ClearanceRule,
    pub clear_score: u64,
    pub spawn: SpawnPolicy,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl TickConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            survival_reward: settings.survival_reward,
            clearance_reward: settings.clearance_reward,
            clearance_rule: settings.clearance_rule,
            clear_score: settings.clear_score,
            spawn: SpawnPolicy::from_settings(settings),
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Index of the tick that was processed
    pub tick: u64,
    pub action: Action,
    pub reward: f32,
    /// Obstacles that left the bottom and counted as cleared
    pub cleared: u32,
    pub bonuses_collected: u32,
    /// This tick turned the session Terminal
    pub terminal: bool,
    pub spawned: bool,
}

/// Apply an action's instantaneous effect
pub fn apply_action(player: &mut Player, action: Action) {
    match action {
        Action::Jump => {
            if player.is_grounded() {
                player.vy = JUMP_VELOCITY;
            }
        }
        Action::Left => {
            player.pos.x = (player.pos.x - MOVE_STEP).max(0.0);
        }
        Action::Right => {
            player.pos.x = (player.pos.x + MOVE_STEP).min(WIDTH - player.size);
        }
        Action::Stay => {}
    }
}

/// Gravity and ground clamp
fn integrate_player(player: &mut Player) {
    player.vy += GRAVITY;
    player.pos.y += player.vy;

    if player.pos.y >= player.ground_y() {
        player.pos.y = player.ground_y();
        player.vy = 0.0;
    }
    // Ceiling
    if player.pos.y < 0.0 {
        player.pos.y = 0.0;
    }
}

fn counts_as_cleared(obstacle: &Obstacle, player: &Player, rule: ClearanceRule) -> bool {
    match rule {
        ClearanceRule::AllExits => true,
        ClearanceRule::ThreatsOnly => {
            obstacle.kind == ObstacleKind::Hazard
                && (obstacle.center().x - player.center().x).abs()
                    < (player.size + obstacle.size) / 2.0 + CLEARANCE_THREAT_MARGIN
        }
    }
}

fn check_finite(session: &Session) -> Result<(), SimError> {
    let player = &session.player;
    if !player.is_finite() {
        return Err(SimError::NonFinitePlayer {
            x: player.pos.x,
            y: player.pos.y,
            vy: player.vy,
        });
    }
    if let Some(index) = session
        .obstacles
        .iter()
        .position(|o| !(o.pos.is_finite() && o.vel.is_finite()))
    {
        return Err(SimError::NonFiniteObstacle { index });
    }
    Ok(())
}

/// Advance the session by one fixed step.
///
/// Returns `Ok(None)` without touching anything when the session is not
/// Running. An error means the session state can no longer be trusted.
pub fn tick(
    session: &mut Session,
    input: &TickInput,
    policy: &DecisionPolicy,
    config: &TickConfig,
) -> Result<Option<TickReport>, SimError> {
    if !session.is_running() {
        return Ok(None);
    }

    // 1. Pre-update snapshot for the episode buffer
    let recorded = RecordedState::capture(&session.player, &session.obstacles);

    // 2. Pick this tick's action
    let action = match session.mode {
        Mode::Autonomous => policy.decide(&session.view()),
        Mode::Human => input.action.unwrap_or(Action::Stay),
    };
    session.last_action = action;

    // 3. Instantaneous action effect
    apply_action(&mut session.player, action);

    // 4-5. Gravity and ground
    integrate_player(&mut session.player);

    // 6. Obstacle motion
    for obstacle in &mut session.obstacles {
        obstacle.advance();
    }

    // 7. Exits
    let mut cleared = 0u32;
    let player = session.player.clone();
    session.obstacles.retain(|o| {
        if !o.has_exited() {
            return true;
        }
        if counts_as_cleared(o, &player, config.clearance_rule) {
            cleared += 1;
        }
        false
    });
    session.score += u64::from(cleared) * config.clear_score;

    check_finite(session)?;

    // 8. Collisions
    let collision = resolve_collisions(session);

    // 9. Reward
    let reward = match &collision.hazard {
        Some(hazard) => hazard.kind.spec().terminal_reward,
        None => config.survival_reward + cleared as f32 * config.clearance_reward,
    };
    let terminal = collision.is_terminal();

    // 10. Record
    session.recorder.append(StateRecord {
        frame: session.tick_count,
        state: recorded,
        action,
        reward,
        done: terminal,
    });
    if terminal {
        session.recorder.seal();
    }

    // 11. Spawn
    let spawn = config.spawn;
    let spawned = !terminal && spawn.maybe_spawn(&mut session.rng, &mut session.obstacles);

    // 12. Advance the clock
    let index = session.tick_count;
    session.tick_count += 1;

    Ok(Some(TickReport {
        tick: index,
        action,
        reward,
        cleared,
        bonuses_collected: collision.bonuses_collected,
        terminal,
        spawned,
    }))
}
