//! Object-detection dataset export
//!
//! Turns a finished episode into image/label pairs:
//! - `images/train/{base}.jpg` re-encoded from the captured frame
//! - `labels/train/{base}.txt` with one `class cx cy w h` line per object
//!
//! Coordinates are normalized by the playfield size. Boxes are clipped to the
//! playfield first and objects entirely outside it are left out.

use std::collections::{HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};

use super::recorder::{RecordedState, StateRecord};
use crate::consts::{HEIGHT, PLAYER_SIZE, WIDTH};
use crate::error::ExportError;
use crate::short_id;

pub const CLASS_NAMES: [&str; 2] = ["player", "obstacle"];
pub const CLASS_PLAYER: usize = 0;
pub const CLASS_OBSTACLE: usize = 1;

pub const JPEG_QUALITY: u8 = 95;

const IMAGES_DIR: &str = "images/train";
const LABELS_DIR: &str = "labels/train";
const MANIFEST: &str = "data.yaml";

/// Contents of `data.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub path: String,
    pub train: String,
    pub val: String,
    pub nc: usize,
    pub names: Vec<String>,
}

impl DatasetManifest {
    pub fn for_root(root: &Path) -> Self {
        Self {
            path: root.display().to_string(),
            train: IMAGES_DIR.into(),
            val: IMAGES_DIR.into(),
            nc: CLASS_NAMES.len(),
            names: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Outcome of one episode export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub total: usize,
    pub exported: usize,
    /// No captured frame for the tick
    pub skipped_missing: usize,
    /// Frame present but could not be decoded or written
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct DatasetExporter {
    root: PathBuf,
    images_dir: PathBuf,
    labels_dir: PathBuf,
    date_stamp: String,
}

impl DatasetExporter {
    /// Create the directory layout under `root` and write `data.yaml` if it
    /// is missing or stale.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let root = root.into();
        let images_dir = root.join(IMAGES_DIR);
        let labels_dir = root.join(LABELS_DIR);
        fs::create_dir_all(&images_dir)?;
        fs::create_dir_all(&labels_dir)?;

        let absolute = fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
        let manifest = serde_yaml::to_string(&DatasetManifest::for_root(&absolute))?;
        let manifest_path = root.join(MANIFEST);
        let current = fs::read_to_string(&manifest_path).ok();
        if current.as_deref() != Some(manifest.as_str()) {
            fs::write(&manifest_path, manifest)?;
            log::info!("Wrote dataset manifest {}", manifest_path.display());
        }

        Ok(Self {
            root,
            images_dir,
            labels_dir,
            date_stamp: chrono::Local::now().format("%Y%m%d").to_string(),
        })
    }

    /// Override the `YYYYmmdd` part of exported file names
    pub fn with_date_stamp(mut self, stamp: impl Into<String>) -> Self {
        self.date_stamp = stamp.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn labels_dir(&self) -> &Path {
        &self.labels_dir
    }

    pub fn base_name(&self, session_id: &str, frame: u64) -> String {
        format!(
            "game_{}_{}_{:05}",
            self.date_stamp,
            short_id(session_id, 8),
            frame
        )
    }

    /// Export every record that has a captured frame under `frames_dir`.
    ///
    /// Per-frame problems are counted in the report and never abort the run.
    pub fn export_episode(
        &self,
        session_id: &str,
        records: &[StateRecord],
        frames_dir: &Path,
    ) -> ExportReport {
        let mut report = ExportReport {
            total: records.len(),
            ..Default::default()
        };

        let index = FrameIndex::scan(frames_dir);
        log::debug!("Indexed {} frames under {}", index.len(), frames_dir.display());
        for record in records {
            let Some(frame_path) = index.get(record.frame) else {
                log::debug!("No frame captured for tick {}", record.frame);
                report.skipped_missing += 1;
                continue;
            };
            let base = self.base_name(session_id, record.frame);
            match self.export_frame(frame_path, &base, &record.state) {
                Ok(()) => report.exported += 1,
                Err(err) => {
                    log::warn!("Failed to export {}: {}", frame_path.display(), err);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Dataset export for {}: {}/{} exported, {} missing, {} failed",
            short_id(session_id, 8),
            report.exported,
            report.total,
            report.skipped_missing,
            report.failed
        );
        report
    }

    fn export_frame(
        &self,
        source: &Path,
        base: &str,
        state: &RecordedState,
    ) -> Result<(), ExportError> {
        let rgb = image::open(source)?.to_rgb8();
        let image_path = self.images_dir.join(format!("{base}.jpg"));
        let encoded = File::create(&image_path).map_err(ExportError::from).and_then(|file| {
            let mut writer = BufWriter::new(file);
            let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)?;
            writer.flush()?;
            Ok(())
        });
        if let Err(err) = encoded {
            let _ = fs::remove_file(&image_path);
            return Err(err);
        }

        let mut labels = label_lines(state).join("\n");
        if !labels.is_empty() {
            labels.push('\n');
        }
        if let Err(err) = fs::write(self.labels_dir.join(format!("{base}.txt")), labels) {
            let _ = fs::remove_file(&image_path);
            return Err(err.into());
        }
        Ok(())
    }
}

/// Captured frames under a directory tree, keyed by file name.
///
/// Built once per export. When the same name appears more than once the
/// shallowest copy wins, then the first in sorted path order.
#[derive(Debug, Default)]
pub struct FrameIndex {
    by_name: HashMap<String, PathBuf>,
}

impl FrameIndex {
    pub fn scan(frames_dir: &Path) -> Self {
        let mut by_name = HashMap::new();
        let mut pending = VecDeque::from([frames_dir.to_path_buf()]);
        while let Some(dir) = pending.pop_front() {
            let Ok(read) = fs::read_dir(&dir) else {
                continue;
            };
            let mut entries: Vec<PathBuf> = read.filter_map(|e| e.ok().map(|e| e.path())).collect();
            entries.sort();
            for path in entries {
                if path.is_dir() {
                    pending.push_back(path);
                } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    by_name.entry(name.to_string()).or_insert(path);
                }
            }
        }
        Self { by_name }
    }

    /// `frame_{tick:05}.png`, if captured
    pub fn get(&self, frame: u64) -> Option<&Path> {
        self.by_name
            .get(&format!("frame_{frame:05}.png"))
            .map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Normalized `(cx, cy, w, h)` of a box clipped to the playfield
pub fn normalized_box(x: f32, y: f32, w: f32, h: f32) -> Option<[f32; 4]> {
    let x0 = x.max(0.0);
    let y0 = y.max(0.0);
    let x1 = (x + w).min(WIDTH);
    let y1 = (y + h).min(HEIGHT);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some([
        (x0 + x1) / 2.0 / WIDTH,
        (y0 + y1) / 2.0 / HEIGHT,
        (x1 - x0) / WIDTH,
        (y1 - y0) / HEIGHT,
    ])
}

/// Label file lines for one recorded state, player first
pub fn label_lines(state: &RecordedState) -> Vec<String> {
    let player = (
        CLASS_PLAYER,
        state.player_x,
        state.player_y,
        PLAYER_SIZE,
    );
    std::iter::once(player)
        .chain(
            state
                .obstacles
                .iter()
                .map(|o| (CLASS_OBSTACLE, o.x, o.y, o.size)),
        )
        .filter_map(|(class, x, y, size)| {
            normalized_box(x, y, size, size)
                .map(|[cx, cy, w, h]| format!("{class} {cx:.6} {cy:.6} {w:.6} {h:.6}"))
        })
        .collect()
}
