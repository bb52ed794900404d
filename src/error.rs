//! Error types

use thiserror::Error;

/// A fault inside a simulation tick. The session loop stops on these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("player state became non-finite: x={x}, y={y}, vy={vy}")]
    NonFinitePlayer { x: f32, y: f32, vy: f32 },

    #[error("obstacle {index} state became non-finite")]
    NonFiniteObstacle { index: usize },
}

/// Failure of a decision policy backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("model backend unavailable")]
    Unavailable,

    #[error("model returned {got} scores, expected {expected}")]
    BadOutput { expected: usize, got: usize },

    #[error("model backend error: {0}")]
    Backend(String),
}

/// Training artifact and dataset export failures
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("manifest error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings load/validation failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Leaderboard store failures
#[derive(Error, Debug)]
pub enum LeaderboardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
