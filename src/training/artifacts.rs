//! Per-episode training logs
//!
//! Layout under the data root:
//!
//! ```text
//! gameplay/raw/session_{unix}_{sid8}.json
//! collected/session_{YYYYmmdd_HHMMSS}_{mode}_{sid8}/
//!     metadata.json
//!     states_actions.jsonl
//!     bboxes.jsonl
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::recorder::{Episode, StateRecord};
use crate::consts::PLAYER_SIZE;
use crate::error::ExportError;
use crate::short_id;
use crate::sim::Mode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalState {
    pub player_x: f32,
    pub player_y: f32,
    pub obstacles_count: usize,
}

/// Summary record of one finished episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub mode: Mode,
    pub score: u64,
    pub survival_time: f64,
    pub total_frames: u64,
    pub final_state: FinalState,
    /// When the episode started, RFC 3339 UTC
    pub started_at: String,
    pub timestamp: String,
}

impl SessionMetadata {
    pub fn from_episode(episode: &Episode) -> Self {
        Self {
            session_id: episode.session_id.clone(),
            mode: episode.mode,
            score: episode.score,
            survival_time: episode.survival_secs,
            total_frames: episode.tick_count,
            final_state: FinalState {
                player_x: episode.final_player_x,
                player_y: episode.final_player_y,
                obstacles_count: episode.final_obstacle_count,
            },
            started_at: episode.started_at.to_rfc3339(),
            timestamp: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// Pixel-unit bounding box (top-left corner, width, height)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub class: String,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameBoxes {
    pub frame: u64,
    pub objects: Vec<PixelBox>,
}

impl FrameBoxes {
    pub fn from_record(record: &StateRecord) -> Self {
        let state = &record.state;
        let mut objects = Vec::with_capacity(1 + state.obstacles.len());
        objects.push(PixelBox {
            class: "player".into(),
            x: state.player_x,
            y: state.player_y,
            w: PLAYER_SIZE,
            h: PLAYER_SIZE,
        });
        objects.extend(state.obstacles.iter().map(|o| PixelBox {
            class: "obstacle".into(),
            x: o.x,
            y: o.y,
            w: o.size,
            h: o.size,
        }));
        Self {
            frame: record.frame,
            objects,
        }
    }
}

/// Files written for one episode
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub metadata: PathBuf,
    /// Present when the episode had at least one record
    pub session_dir: Option<PathBuf>,
}

/// Writes metadata and line-delimited training logs for finished episodes
#[derive(Debug, Clone)]
pub struct TrainingLogWriter {
    root: PathBuf,
}

impl TrainingLogWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write_episode(&self, episode: &Episode) -> Result<ArtifactPaths, ExportError> {
        let metadata = SessionMetadata::from_episode(episode);
        let sid8 = short_id(&episode.session_id, 8);

        let raw_dir = self.root.join("gameplay").join("raw");
        fs::create_dir_all(&raw_dir)?;
        let metadata_path = raw_dir.join(format!(
            "session_{}_{}.json",
            chrono::Utc::now().timestamp(),
            sid8
        ));
        fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;
        log::info!("Saved session metadata {}", metadata_path.display());

        if episode.records.is_empty() {
            return Ok(ArtifactPaths {
                metadata: metadata_path,
                session_dir: None,
            });
        }

        let session_dir = self.root.join("collected").join(format!(
            "session_{}_{}_{}",
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            episode.mode.as_str(),
            sid8
        ));
        fs::create_dir_all(&session_dir)?;
        fs::write(
            session_dir.join("metadata.json"),
            serde_json::to_string_pretty(&metadata)?,
        )?;
        write_jsonl(&session_dir.join("states_actions.jsonl"), &episode.records)?;
        let boxes: Vec<FrameBoxes> = episode.records.iter().map(FrameBoxes::from_record).collect();
        write_jsonl(&session_dir.join("bboxes.jsonl"), &boxes)?;

        log::info!(
            "Saved training data to {} ({} records)",
            session_dir.display(),
            episode.records.len()
        );
        Ok(ArtifactPaths {
            metadata: metadata_path,
            session_dir: Some(session_dir),
        })
    }
}

fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Action, ObstacleKind, Player};
    use crate::training::{RecordedObstacle, RecordedState};

    fn episode(records: Vec<StateRecord>) -> Episode {
        Episode {
            session_id: "a1b2c3d4e5f6".into(),
            player_name: "tester".into(),
            mode: Mode::Human,
            score: 20,
            survival_secs: 3.5,
            tick_count: records.len() as u64,
            final_player_x: 100.0,
            final_player_y: 670.0,
            final_obstacle_count: 2,
            started_at: "2024-01-02T03:04:05Z".parse().unwrap(),
            records,
        }
    }

    fn record(frame: u64) -> StateRecord {
        let mut state = RecordedState::capture(&Player::default(), &[]);
        state.obstacles.push(RecordedObstacle {
            x: 10.0,
            y: 20.0,
            size: 50.0,
            kind: ObstacleKind::Hazard,
        });
        StateRecord {
            frame,
            state,
            action: Action::Jump,
            reward: 1.0,
            done: false,
        }
    }

    #[test]
    fn test_frame_boxes_pixel_units() {
        let boxes = FrameBoxes::from_record(&record(4));
        assert_eq!(boxes.frame, 4);
        assert_eq!(boxes.objects.len(), 2);
        assert_eq!(boxes.objects[0].class, "player");
        assert_eq!(boxes.objects[0].w, PLAYER_SIZE);
        assert_eq!(boxes.objects[1].class, "obstacle");
        assert_eq!(boxes.objects[1].x, 10.0);
    }

    #[test]
    fn test_write_episode() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TrainingLogWriter::new(dir.path());
        let paths = writer.write_episode(&episode(vec![record(0), record(1)])).unwrap();

        let metadata: SessionMetadata =
            serde_json::from_str(&fs::read_to_string(&paths.metadata).unwrap()).unwrap();
        assert_eq!(metadata.session_id, "a1b2c3d4e5f6");
        assert_eq!(metadata.total_frames, 2);
        assert_eq!(metadata.started_at, "2024-01-02T03:04:05+00:00");
        assert!(
            paths
                .metadata
                .file_name()
                .unwrap()
                .to_string_lossy()
                .ends_with("_a1b2c3d4.json")
        );

        let session_dir = paths.session_dir.unwrap();
        let states = fs::read_to_string(session_dir.join("states_actions.jsonl")).unwrap();
        let lines: Vec<&str> = states.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["action"], "jump");
        assert_eq!(first["frame"], 0);

        let boxes = fs::read_to_string(session_dir.join("bboxes.jsonl")).unwrap();
        let second: FrameBoxes = serde_json::from_str(boxes.lines().nth(1).unwrap()).unwrap();
        assert_eq!(second.frame, 1);
        assert!(session_dir.join("metadata.json").exists());
    }

    #[test]
    fn test_empty_episode_writes_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TrainingLogWriter::new(dir.path());
        let paths = writer.write_episode(&episode(Vec::new())).unwrap();
        assert!(paths.metadata.exists());
        assert!(paths.session_dir.is_none());
    }
}
