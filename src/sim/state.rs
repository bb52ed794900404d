//! Session state and core simulation types
//!
//! A `Session` owns everything one episode mutates: the player, the ordered
//! obstacle list, score, tick count and the episode buffer.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::training::TrainingRecorder;

/// Discrete action applied once per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Action {
    #[default]
    #[serde(rename = "stay")]
    Stay,
    #[serde(rename = "move_left")]
    Left,
    #[serde(rename = "move_right")]
    Right,
    #[serde(rename = "jump")]
    Jump,
}

impl Action {
    /// Every action, in the index order used by model scorers
    pub const ALL: [Action; 4] = [Action::Stay, Action::Left, Action::Right, Action::Jump];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Stay => "stay",
            Action::Left => "move_left",
            Action::Right => "move_right",
            Action::Jump => "jump",
        }
    }

    /// Parse an inbound player command (`jump`, `left`, `right`)
    pub fn from_command(s: &str) -> Option<Self> {
        match s {
            "jump" => Some(Action::Jump),
            "left" | "move_left" => Some(Action::Left),
            "right" | "move_right" => Some(Action::Right),
            "stay" => Some(Action::Stay),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Action::Stay => 0,
            Action::Left => 1,
            Action::Right => 2,
            Action::Jump => 3,
        }
    }
}

/// Who decides the action each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    #[serde(rename = "human")]
    Human,
    #[serde(rename = "ai")]
    Autonomous,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Human => "human",
            Mode::Autonomous => "ai",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" => Some(Mode::Human),
            "ai" | "autonomous" => Some(Mode::Autonomous),
            _ => None,
        }
    }
}

/// Lifecycle of a session. Transitions are one-way: Idle -> Running -> Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Reset, waiting for `start`
    Idle,
    /// Ticking
    Running,
    /// Collided with a hazard, episode finished
    Terminal,
}

/// The player-controlled box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Top-left corner
    pub pos: Vec2,
    /// Vertical velocity (positive = falling)
    pub vy: f32,
    pub size: f32,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            pos: Vec2::new((WIDTH - PLAYER_SIZE) / 2.0, HEIGHT / 2.0),
            vy: 0.0,
            size: PLAYER_SIZE,
        }
    }
}

impl Player {
    pub fn at(x: f32, y: f32) -> Self {
        let mut player = Self {
            pos: Vec2::new(x, y),
            ..Default::default()
        };
        player.clamp_to_playfield();
        player
    }

    /// Y coordinate of the player standing on the ground
    pub fn ground_y(&self) -> f32 {
        HEIGHT - self.size
    }

    pub fn is_grounded(&self) -> bool {
        self.pos.y >= self.ground_y() - GROUND_EPSILON
    }

    pub fn center(&self) -> Vec2 {
        self.pos + Vec2::splat(self.size / 2.0)
    }

    pub fn clamp_to_playfield(&mut self) {
        self.pos.x = self.pos.x.clamp(0.0, WIDTH - self.size);
        self.pos.y = self.pos.y.clamp(0.0, HEIGHT - self.size);
    }

    pub fn is_finite(&self) -> bool {
        self.pos.is_finite() && self.vy.is_finite()
    }
}

/// Obstacle variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleKind {
    /// Ends the episode on contact
    Hazard,
    /// Adds score and is consumed on contact
    Bonus,
}

/// Constants shared by every obstacle of one kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindSpec {
    pub size: f32,
    /// Downward speed (pixels per tick)
    pub fall_speed: f32,
    /// Score added when the player collects it
    pub score_delta: u64,
    /// Reward of the tick that turns the session Terminal
    pub terminal_reward: f32,
}

pub const HAZARD_SPEC: KindSpec = KindSpec {
    size: 50.0,
    fall_speed: 5.0,
    score_delta: 0,
    terminal_reward: -100.0,
};

pub const BONUS_SPEC: KindSpec = KindSpec {
    size: 30.0,
    fall_speed: 3.0,
    score_delta: 10,
    terminal_reward: 0.0,
};

impl ObstacleKind {
    pub fn spec(&self) -> &'static KindSpec {
        match self {
            ObstacleKind::Hazard => &HAZARD_SPEC,
            ObstacleKind::Bonus => &BONUS_SPEC,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObstacleKind::Hazard => "hazard",
            ObstacleKind::Bonus => "bonus",
        }
    }
}

/// A falling object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub kind: ObstacleKind,
    /// Top-left corner
    pub pos: Vec2,
    /// Per-tick displacement
    pub vel: Vec2,
    pub size: f32,
}

impl Obstacle {
    /// Obstacle of `kind` at `pos` with the kind's fall speed and no drift
    pub fn new(kind: ObstacleKind, pos: Vec2) -> Self {
        let spec = kind.spec();
        Self {
            kind,
            pos,
            vel: Vec2::new(0.0, spec.fall_speed),
            size: spec.size,
        }
    }

    pub fn with_drift(mut self, vx: f32) -> Self {
        self.vel.x = vx;
        self
    }

    pub fn center(&self) -> Vec2 {
        self.pos + Vec2::splat(self.size / 2.0)
    }

    /// Advance one tick, wrapping horizontally
    pub fn advance(&mut self) {
        self.pos.x += self.vel.x;
        if self.pos.x < -self.size {
            self.pos.x = WIDTH;
        } else if self.pos.x > WIDTH {
            self.pos.x = -self.size;
        }
        self.pos.y += self.vel.y;
    }

    /// Fully below the bottom edge
    pub fn has_exited(&self) -> bool {
        self.pos.y >= HEIGHT
    }
}

/// Read-only view handed to decision policies
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub player: &'a Player,
    pub obstacles: &'a [Obstacle],
}

/// One connection's authoritative game
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub player_name: String,
    pub mode: Mode,
    pub phase: SessionPhase,
    pub player: Player,
    /// Spawn order; earlier obstacles are tested for collision first
    pub obstacles: Vec<Obstacle>,
    pub score: u64,
    pub tick_count: u64,
    /// Action applied on the most recent tick
    pub last_action: Action,
    /// Episode buffer
    pub recorder: TrainingRecorder,
    pub seed: u64,
    pub(crate) rng: Pcg32,
    pub started_at: Instant,
    pub started_wall: DateTime<Utc>,
    ended_at: Option<Instant>,
}

impl Session {
    /// Create an Idle session with the given RNG seed
    pub fn new(id: impl Into<String>, seed: u64) -> Self {
        Self {
            id: id.into(),
            player_name: String::new(),
            mode: Mode::Human,
            phase: SessionPhase::Idle,
            player: Player::default(),
            obstacles: Vec::new(),
            score: 0,
            tick_count: 0,
            last_action: Action::Stay,
            recorder: TrainingRecorder::new(),
            seed,
            rng: Pcg32::seed_from_u64(seed),
            started_at: Instant::now(),
            started_wall: Utc::now(),
            ended_at: None,
        }
    }

    /// Discard the current episode and return to Idle
    pub fn reset(&mut self) {
        self.phase = SessionPhase::Idle;
        self.player = Player::default();
        self.obstacles.clear();
        self.score = 0;
        self.tick_count = 0;
        self.last_action = Action::Stay;
        self.recorder = TrainingRecorder::new();
        self.rng = Pcg32::seed_from_u64(self.seed);
        self.started_at = Instant::now();
        self.started_wall = Utc::now();
        self.ended_at = None;
    }

    /// Idle -> Running. Returns false (and changes nothing) from any other phase.
    pub fn start(&mut self, mode: Mode, player_name: &str) -> bool {
        if self.phase != SessionPhase::Idle {
            return false;
        }
        self.mode = mode;
        self.player_name = if player_name.trim().is_empty() {
            format!("Player_{}", crate::short_id(&self.id, 6))
        } else {
            player_name.trim().to_string()
        };
        self.phase = SessionPhase::Running;
        self.started_at = Instant::now();
        self.started_wall = Utc::now();
        true
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == SessionPhase::Terminal
    }

    /// Running -> Terminal
    pub(crate) fn terminate(&mut self) {
        if self.phase == SessionPhase::Running {
            self.phase = SessionPhase::Terminal;
            self.ended_at = Some(Instant::now());
        }
    }

    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            player: &self.player,
            obstacles: &self.obstacles,
        }
    }

    /// Wall time since start, frozen once Terminal
    pub fn elapsed(&self) -> Duration {
        match self.ended_at {
            Some(end) => end.duration_since(self.started_at),
            None => self.started_at.elapsed(),
        }
    }

    pub fn rng_mut(&mut self) -> &mut Pcg32 {
        &mut self.rng
    }
}
