//! Episode recording and training outputs
//!
//! - `recorder`: in-memory per-tick buffer owned by the session
//! - `artifacts`: metadata and JSONL logs written after an episode ends
//! - `exporter`: image/label dataset built from captured frames

pub mod artifacts;
pub mod exporter;
pub mod recorder;

pub use artifacts::{ArtifactPaths, FrameBoxes, PixelBox, SessionMetadata, TrainingLogWriter};
pub use exporter::{DatasetExporter, DatasetManifest, ExportReport};
pub use recorder::{Episode, RecordedObstacle, RecordedState, StateRecord, TrainingRecorder};
