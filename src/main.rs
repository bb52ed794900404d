//! Skyfall entry point
//!
//! Runs one autonomous episode headless and logs its progress.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use skyfall::consts::TICK_HZ;
use skyfall::sim::Mode;
use skyfall::{JsonLeaderboardStore, SessionEvent, SessionRegistry, Settings};

/// Snapshots between progress lines
const LOG_EVERY: u64 = TICK_HZ as u64 * 5;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    log::info!("Skyfall (headless) starting...");

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            log::error!("Invalid settings: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let store = Arc::new(JsonLeaderboardStore::open(
        settings.data_dir.join("leaderboard.json"),
    ));
    let registry = SessionRegistry::new(settings, store.clone());

    let id = uuid::Uuid::new_v4().to_string();
    registry.create(&id).await;
    let Some(mut events) = registry.subscribe(&id).await else {
        return ExitCode::FAILURE;
    };
    registry.start(&id, Mode::Autonomous, "Autopilot").await;

    loop {
        match events.recv().await {
            Ok(SessionEvent::Snapshot(snapshot)) => {
                if snapshot.frame % LOG_EVERY == 0 {
                    log::info!(
                        "t={:.1}s frame={} score={} obstacles={} player=({:.0}, {:.0})",
                        snapshot.time,
                        snapshot.frame,
                        snapshot.score,
                        snapshot.obstacles.len(),
                        snapshot.player.x,
                        snapshot.player.y
                    );
                }
                if snapshot.bonus_collected {
                    log::debug!("Bonus collected at frame {}", snapshot.frame);
                }
            }
            Ok(SessionEvent::GameOver(event)) => {
                log::info!(
                    "Game over: {} scored {} in {:.2}s ({} frames)",
                    event.player_name,
                    event.score,
                    event.time,
                    event.frame
                );
                for (rank, entry) in event.leaderboard.iter().enumerate() {
                    log::info!(
                        "  #{:<2} {:<16} {:>6} {:>8.2}s",
                        rank + 1,
                        entry.player,
                        entry.score,
                        entry.time
                    );
                }
                break;
            }
            Ok(SessionEvent::Aborted { reason }) => {
                log::error!("Session aborted: {}", reason);
                registry.destroy(&id).await;
                return ExitCode::FAILURE;
            }
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("Event consumer lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    let stats = store.stats();
    log::info!(
        "Leaderboard: {} games, best {}, average {:.2}",
        stats.total_games,
        stats.highest_score,
        stats.avg_score
    );
    registry.destroy(&id).await;
    ExitCode::SUCCESS
}
