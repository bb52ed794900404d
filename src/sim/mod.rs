//! Simulation module
//!
//! All gameplay logic lives here and is free of I/O:
//! - Fixed timestep only
//! - Seeded RNG only (one per session)
//! - Stable iteration order (spawn order)

pub mod collision;
pub mod policy;
pub mod snapshot;
pub mod spawn;
pub mod state;
pub mod tick;

pub use collision::{CollisionResult, aabb_overlap, player_obstacle_overlap, resolve_collisions};
pub use policy::{
    ActionScorer, DecisionPolicy, HeuristicParams, HeuristicPolicy, LearnedModelPolicy,
    Observation, Rule, UnavailableScorer,
};
pub use snapshot::{GameOverEvent, ObstacleSnapshot, PlayerSnapshot, Snapshot};
pub use spawn::SpawnPolicy;
pub use state::{
    Action, BONUS_SPEC, HAZARD_SPEC, KindSpec, Mode, Obstacle, ObstacleKind, Player, Session,
    SessionPhase, SessionView,
};
pub use tick::{TickConfig, TickInput, TickReport, apply_action, tick};
