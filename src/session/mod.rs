//! Session lifecycle
//!
//! - `registry`: id -> session mapping driven by connection events
//! - `runner`: the fixed-rate tick task and episode finaliser

pub mod registry;
pub mod runner;

pub use registry::SessionRegistry;
pub use runner::{EpisodeSinks, LoopContext, LoopExit, SessionShared, finish_episode, spawn_session};

use crate::sim::{GameOverEvent, Snapshot};

/// Outbound event stream of one session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Post-update state, once per tick
    Snapshot(Snapshot),
    /// Episode ended on a hazard
    GameOver(GameOverEvent),
    /// Loop ended without finishing the episode
    Aborted { reason: String },
}
