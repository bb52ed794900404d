//! Leaderboard
//!
//! Keeps the best 100 results sorted by score. The JSON file store is the
//! default collaborator behind `LeaderboardStore`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::LeaderboardError;
use crate::sim::Mode;

/// Maximum number of entries kept
pub const MAX_ENTRIES: usize = 100;
/// Entries included in a game-over event
pub const TOP_SLICE: usize = 10;

/// A single result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player: String,
    pub score: u64,
    /// Survival time in seconds (2 decimals)
    pub time: f64,
    pub mode: Mode,
    /// ISO-8601 timestamp
    pub date: String,
    pub session_id: String,
}

impl LeaderboardEntry {
    pub fn new(player: &str, score: u64, survival_secs: f64, mode: Mode, session_id: &str) -> Self {
        Self {
            player: player.to_string(),
            score,
            time: (survival_secs * 100.0).round() / 100.0,
            mode,
            date: chrono::Local::now().to_rfc3339(),
            session_id: session_id.to_string(),
        }
    }
}

/// Aggregate numbers over the stored entries
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LeaderboardStats {
    pub total_games: usize,
    pub avg_score: f64,
    pub highest_score: u64,
    pub total_playtime: f64,
    pub human_games: usize,
    pub ai_games: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub scores: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self { scores: Vec::new() }
    }

    /// Insert an entry (sorted descending by score, ties keep arrival order).
    /// Returns the rank achieved (1-indexed) or None if it fell off the end.
    pub fn add(&mut self, entry: LeaderboardEntry) -> Option<usize> {
        let pos = self
            .scores
            .iter()
            .position(|e| entry.score > e.score)
            .unwrap_or(self.scores.len());
        self.scores.insert(pos, entry);
        self.scores.truncate(MAX_ENTRIES);
        (pos < MAX_ENTRIES).then_some(pos + 1)
    }

    pub fn top(&self, n: usize) -> Vec<LeaderboardEntry> {
        self.scores.iter().take(n).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn top_score(&self) -> Option<u64> {
        self.scores.first().map(|e| e.score)
    }

    pub fn stats(&self) -> LeaderboardStats {
        if self.scores.is_empty() {
            return LeaderboardStats::default();
        }
        let total = self.scores.len();
        let sum: u64 = self.scores.iter().map(|e| e.score).sum();
        let playtime: f64 = self.scores.iter().map(|e| e.time).sum();
        LeaderboardStats {
            total_games: total,
            avg_score: ((sum as f64 / total as f64) * 100.0).round() / 100.0,
            highest_score: self.top_score().unwrap_or(0),
            total_playtime: (playtime * 100.0).round() / 100.0,
            human_games: self.scores.iter().filter(|e| e.mode == Mode::Human).count(),
            ai_games: self.scores.iter().filter(|e| e.mode == Mode::Autonomous).count(),
        }
    }
}

/// Persistence collaborator for finished episodes
pub trait LeaderboardStore: Send + Sync {
    /// Record a result, returning the rank it achieved
    fn record(&self, entry: LeaderboardEntry) -> Result<Option<usize>, LeaderboardError>;
    fn top(&self, n: usize) -> Vec<LeaderboardEntry>;
}

fn lock(board: &Mutex<Leaderboard>) -> MutexGuard<'_, Leaderboard> {
    board.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process store, nothing persisted
#[derive(Debug, Default)]
pub struct MemoryLeaderboardStore {
    board: Mutex<Leaderboard>,
}

impl MemoryLeaderboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Leaderboard {
        lock(&self.board).clone()
    }
}

impl LeaderboardStore for MemoryLeaderboardStore {
    fn record(&self, entry: LeaderboardEntry) -> Result<Option<usize>, LeaderboardError> {
        Ok(lock(&self.board).add(entry))
    }

    fn top(&self, n: usize) -> Vec<LeaderboardEntry> {
        lock(&self.board).top(n)
    }
}

/// Leaderboard persisted as pretty JSON (`{"scores": [...]}`)
#[derive(Debug)]
pub struct JsonLeaderboardStore {
    path: PathBuf,
    board: Mutex<Leaderboard>,
}

impl JsonLeaderboardStore {
    /// Open the file at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let board = match Self::load(&path) {
            Ok(Some(board)) => {
                log::info!("Loaded {} leaderboard entries", board.scores.len());
                board
            }
            Ok(None) => {
                log::info!("No leaderboard at {}, starting fresh", path.display());
                Leaderboard::new()
            }
            Err(err) => {
                log::error!("Failed to read leaderboard {}: {}", path.display(), err);
                Leaderboard::new()
            }
        };
        Self {
            path,
            board: Mutex::new(board),
        }
    }

    fn load(path: &Path) -> Result<Option<Leaderboard>, LeaderboardError> {
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    fn save(&self, board: &Leaderboard) -> Result<(), LeaderboardError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(board)?;
        // Write-then-rename so readers never see a half-written file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> LeaderboardStats {
        lock(&self.board).stats()
    }
}

impl LeaderboardStore for JsonLeaderboardStore {
    fn record(&self, entry: LeaderboardEntry) -> Result<Option<usize>, LeaderboardError> {
        let mut board = lock(&self.board);
        let rank = board.add(entry);
        self.save(&board)?;
        Ok(rank)
    }

    fn top(&self, n: usize) -> Vec<LeaderboardEntry> {
        lock(&self.board).top(n)
    }
}
