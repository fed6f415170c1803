//! Capture-side seam: what the pipeline needs from a camera or microphone.

pub mod surface;
pub mod system;
pub mod window;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use surface::{FrameSource, VideoSurface};
pub use window::SampleWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Camera,
    Microphone,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Camera => write!(f, "camera"),
            MediaKind::Microphone => write!(f, "microphone"),
        }
    }
}

/// Hints for acquisition. Backends honour what they can.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub sample_rate: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<u32>,
}

impl MediaConstraints {
    pub fn camera() -> Self {
        Self {
            width: Some(640),
            height: Some(480),
            frame_rate: Some(15),
            ..Self::default()
        }
    }

    pub fn microphone() -> Self {
        Self::default()
    }

    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Camera => Self::camera(),
            MediaKind::Microphone => Self::microphone(),
        }
    }
}

/// One live track of a stream. Stopping is one-way and idempotent.
#[derive(Debug)]
pub struct MediaTrack {
    id: String,
    kind: MediaKind,
    label: String,
    live: AtomicBool,
}

impl MediaTrack {
    pub fn new(kind: MediaKind, label: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            live: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Returns true if this call ended the track.
    pub fn stop(&self) -> bool {
        self.live.swap(false, Ordering::SeqCst)
    }
}

/// Handle to an acquired camera or microphone stream.
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> MediaKind;

    fn tracks(&self) -> &[Arc<MediaTrack>];

    /// Called once the last track has stopped; backends drop the device here.
    fn release(&self) {}

    fn active_track_count(&self) -> usize {
        self.tracks().iter().filter(|t| t.is_live()).count()
    }

    fn is_active(&self) -> bool {
        self.active_track_count() > 0
    }

    fn stop_track(&self, track_id: &str) -> bool {
        let stopped = self
            .tracks()
            .iter()
            .find(|t| t.id() == track_id)
            .map(|t| t.stop())
            .unwrap_or(false);
        if stopped && !self.is_active() {
            self.release();
        }
        stopped
    }

    fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
        self.release();
    }

    /// Recent PCM for microphone streams.
    fn audio_tap(&self) -> Option<Arc<SampleWindow>> {
        None
    }

    /// Current frame size for camera streams, `None` before the first frame.
    fn frame_dimensions(&self) -> Option<(u32, u32)> {
        None
    }

    /// Copies the current frame into `target`, which the caller has already
    /// sized to `frame_dimensions()`. Returns false if no frame was written.
    fn read_frame(&self, _target: &mut RgbImage) -> bool {
        false
    }
}

#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn request(
        &self,
        kind: MediaKind,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaStream>>;
}
