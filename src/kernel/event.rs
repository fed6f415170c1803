use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live classifier output. Written only by the audio and face loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionState {
    /// `-inf` while silent.
    pub current_energy_db: f32,
    pub is_voice_active: bool,
    pub face_count: u32,
    pub has_face: bool,
    pub has_multiple_faces: bool,
}

impl Default for DetectionState {
    fn default() -> Self {
        Self {
            current_energy_db: f32::NEG_INFINITY,
            is_voice_active: false,
            face_count: 0,
            has_face: false,
            has_multiple_faces: false,
        }
    }
}

impl DetectionState {
    pub fn apply_faces(&mut self, update: &FaceUpdate) {
        self.face_count = update.face_count;
        self.has_face = update.has_face;
        self.has_multiple_faces = update.has_multiple_faces;
    }
}

/// Running integrity counters for one capture session. Only ever increase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationCounters {
    pub tab_switch_count: u32,
    pub fullscreen_exit_count: u32,
    pub voice_detection_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotCategory {
    ExamStart,
    RegularInterval,
    MultipleFace,
    NoFace,
}

impl SnapshotCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotCategory::ExamStart => "exam_start",
            SnapshotCategory::RegularInterval => "regular_interval",
            SnapshotCategory::MultipleFace => "multiple_face",
            SnapshotCategory::NoFace => "no_face",
        }
    }

    /// Category for an upload that just succeeded. Upload order alone decides
    /// `ExamStart`: whichever snapshot lands first gets it.
    pub fn resolve(requested: Option<SnapshotCategory>, uploaded_so_far: usize) -> Self {
        if uploaded_so_far == 0 {
            SnapshotCategory::ExamStart
        } else {
            requested.unwrap_or(SnapshotCategory::RegularInterval)
        }
    }
}

/// One uploaded evidence image. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub media_id: String,
    pub captured_at: DateTime<Utc>,
    pub category: SnapshotCategory,
}

/// Raised at most once per cooldown window.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceEvent {
    pub energy_db: f32,
    pub at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceUpdate {
    pub face_count: u32,
    pub has_face: bool,
    pub has_multiple_faces: bool,
}

impl FaceUpdate {
    pub fn from_count(face_count: u32) -> Self {
        Self {
            face_count,
            has_face: face_count >= 1,
            has_multiple_faces: face_count >= 2,
        }
    }
}

/// JPEG-encoded evidence frame handed to snapshot callbacks and the uploader.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPayload {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
    pub requested: Option<SnapshotCategory>,
}

/// Consumer callbacks. An `Err` is logged and swallowed.
pub type VoiceCallback = Arc<dyn Fn(VoiceEvent) -> anyhow::Result<()> + Send + Sync>;
pub type FaceCallback = Arc<dyn Fn(FaceUpdate) -> anyhow::Result<()> + Send + Sync>;
pub type SnapshotCallback = Arc<dyn Fn(SnapshotPayload) -> anyhow::Result<()> + Send + Sync>;
pub type CountersCallback = Arc<dyn Fn(ViolationCounters) -> anyhow::Result<()> + Send + Sync>;
pub type DetectionCallback = Arc<dyn Fn(DetectionState) -> anyhow::Result<()> + Send + Sync>;
