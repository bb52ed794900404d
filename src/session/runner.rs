//! Per-session tick task
//!
//! The task owns its `Session` outright. Everything other tasks can touch
//! lives in `SessionShared`: the pending action slot, the running flag and
//! the event channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::SessionEvent;
use crate::highscores::{LeaderboardEntry, LeaderboardStore, TOP_SLICE};
use crate::settings::Settings;
use crate::short_id;
use crate::sim::{
    Action, DecisionPolicy, GameOverEvent, Session, Snapshot, TickConfig, TickInput, tick,
};
use crate::training::{DatasetExporter, Episode, TrainingLogWriter};

/// Control block for one running episode
#[derive(Debug)]
pub struct SessionShared {
    /// Latest submitted action, consumed at the start of the next tick
    pending: Mutex<Option<Action>>,
    running: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionShared {
    pub fn new(events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            pending: Mutex::new(None),
            running: AtomicBool::new(true),
            events,
        }
    }

    /// Replace the pending action (latest wins)
    pub fn submit(&self, action: Action) {
        *self.pending.lock().unwrap_or_else(|p| p.into_inner()) = Some(action);
    }

    pub fn take_pending(&self) -> Option<Action> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the loop to stop before its next tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Why a session loop returned
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    /// Hazard hit, episode finished normally
    Terminal,
    /// Running flag cleared from outside
    Cancelled,
    /// A tick failed, the episode is discarded
    Faulted(String),
}

/// Collaborators that receive a finished episode
#[derive(Clone)]
pub struct EpisodeSinks {
    pub leaderboard: Arc<dyn LeaderboardStore>,
    pub training_logs: Option<TrainingLogWriter>,
    /// Dataset export switch and frame/dataset locations
    pub settings: Settings,
}

impl EpisodeSinks {
    pub fn from_settings(settings: &Settings, leaderboard: Arc<dyn LeaderboardStore>) -> Self {
        Self {
            leaderboard,
            training_logs: Some(TrainingLogWriter::new(&settings.data_dir)),
            settings: settings.clone(),
        }
    }
}

/// Everything a session task needs besides the session itself
#[derive(Clone)]
pub struct LoopContext {
    pub policy: DecisionPolicy,
    pub config: TickConfig,
    pub tick_interval: Duration,
    pub sinks: EpisodeSinks,
}

impl LoopContext {
    pub fn from_settings(settings: &Settings, leaderboard: Arc<dyn LeaderboardStore>) -> Self {
        Self {
            policy: DecisionPolicy::default(),
            config: TickConfig::from_settings(settings),
            tick_interval: settings.tick_interval(),
            sinks: EpisodeSinks::from_settings(settings, leaderboard),
        }
    }
}

/// Drive `session` at the fixed rate until it ends, is cancelled or faults.
///
/// The running flag is checked before every tick so a tick is either
/// processed completely or not at all.
pub async fn run_loop(
    mut session: Session,
    shared: &SessionShared,
    ctx: &LoopContext,
) -> (Session, LoopExit) {
    let mut interval = tokio::time::interval(ctx.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if !shared.is_running() {
            return (session, LoopExit::Cancelled);
        }

        let input = TickInput {
            action: shared.take_pending(),
        };
        match tick(&mut session, &input, &ctx.policy, &ctx.config) {
            Ok(Some(report)) => {
                shared.emit(SessionEvent::Snapshot(Snapshot::capture(&session, Some(&report))));
                if report.terminal {
                    shared.stop();
                    return (session, LoopExit::Terminal);
                }
            }
            Ok(None) => {
                log::warn!("Session {} ticked while not running", session.id);
                shared.stop();
                return (session, LoopExit::Cancelled);
            }
            Err(err) => {
                log::error!("Session {} tick {} failed: {}", session.id, session.tick_count, err);
                shared.stop();
                return (session, LoopExit::Faulted(err.to_string()));
            }
        }
    }
}

/// Hand a Terminal session to the leaderboard, training logs and dataset.
///
/// All persistence is best-effort. Returns `None` if the session is not in a
/// finished state.
pub fn finish_episode(session: Session, sinks: &EpisodeSinks) -> Option<GameOverEvent> {
    let Some(episode) = Episode::from_session(session) else {
        log::warn!("Refusing to finalise an unfinished episode");
        return None;
    };

    let entry = LeaderboardEntry::new(
        &episode.player_name,
        episode.score,
        episode.survival_secs,
        episode.mode,
        &episode.session_id,
    );
    match sinks.leaderboard.record(entry) {
        Ok(Some(rank)) => {
            log::info!("{} placed #{} with {}", episode.player_name, rank, episode.score)
        }
        Ok(None) => log::debug!("{} did not make the leaderboard", episode.player_name),
        Err(err) => log::error!("Failed to record leaderboard entry: {}", err),
    }

    if let Some(writer) = &sinks.training_logs {
        if let Err(err) = writer.write_episode(&episode) {
            log::error!("Failed to save training data for {}: {}", episode.session_id, err);
        }
    }

    let export_from = match sinks.settings.export_dataset {
        true => sinks.settings.session_frames_dir(&episode.session_id),
        false => None,
    };
    if let Some(frames_dir) = export_from {
        let dataset_dir = &sinks.settings.dataset_dir;
        match DatasetExporter::open(dataset_dir) {
            Ok(exporter) => {
                exporter.export_episode(&episode.session_id, &episode.records, &frames_dir);
            }
            Err(err) => log::error!("Failed to open dataset {}: {}", dataset_dir.display(), err),
        }
    }

    Some(GameOverEvent {
        score: episode.score,
        time: (episode.survival_secs * 100.0).round() / 100.0,
        frame: episode.tick_count,
        player_name: episode.player_name,
        mode: episode.mode,
        leaderboard: sinks.leaderboard.top(TOP_SLICE),
    })
}

/// Spawn the tick task for an already started session
pub fn spawn_session(
    session: Session,
    shared: Arc<SessionShared>,
    ctx: Arc<LoopContext>,
) -> JoinHandle<LoopExit> {
    tokio::spawn(async move {
        let id = session.id.clone();
        // Inner task so a panic inside a tick surfaces as a JoinError here
        let ticking = {
            let shared = shared.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { run_loop(session, &shared, &ctx).await })
        };
        let (session, exit) = match ticking.await {
            Ok(done) => done,
            Err(err) => {
                log::error!("Session {} tick loop panicked: {}", id, err);
                shared.stop();
                let reason = if err.is_panic() {
                    "tick panicked"
                } else {
                    "tick loop cancelled"
                };
                shared.emit(SessionEvent::Aborted {
                    reason: reason.into(),
                });
                return LoopExit::Faulted(reason.into());
            }
        };

        match &exit {
            LoopExit::Terminal => {
                log::info!(
                    "Session {} over: score {} after {:.2}s ({} ticks)",
                    short_id(&id, 8),
                    session.score,
                    session.elapsed().as_secs_f64(),
                    session.tick_count
                );
                let sinks = ctx.sinks.clone();
                match tokio::task::spawn_blocking(move || finish_episode(session, &sinks)).await {
                    Ok(Some(event)) => shared.emit(SessionEvent::GameOver(event)),
                    Ok(None) => {}
                    Err(err) => log::error!("Episode finaliser for {} panicked: {}", id, err),
                }
            }
            LoopExit::Cancelled => {
                log::info!(
                    "Session {} stopped after {} ticks",
                    short_id(&id, 8),
                    session.tick_count
                );
                shared.emit(SessionEvent::Aborted {
                    reason: "stopped".into(),
                });
            }
            LoopExit::Faulted(reason) => {
                shared.emit(SessionEvent::Aborted {
                    reason: reason.clone(),
                });
            }
        }
        exit
    })
}
