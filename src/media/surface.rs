use std::sync::{Arc, RwLock};

use image::RgbImage;
use tracing::debug;

use super::MediaStream;
use crate::kernel::sync::{read, write};

/// Anything that can hand out the current video frame.
pub trait FrameSource: Send + Sync {
    /// `(0, 0)` while no frame is available.
    fn dimensions(&self) -> (u32, u32);

    /// Writes the current frame into `target`, reallocating it only when the
    /// frame size changed. Returns false if nothing was written.
    fn read_frame(&self, target: &mut RgbImage) -> bool;
}

/// Reallocates `target` only if its size differs from `width` x `height`.
/// Returns true when a reallocation happened.
pub fn ensure_dimensions(target: &mut RgbImage, width: u32, height: u32) -> bool {
    if target.dimensions() == (width, height) {
        return false;
    }
    *target = RgbImage::new(width, height);
    true
}

/// The on-page video element: a slot that a camera stream is attached to.
///
/// Callers may attach a stream before monitoring starts; the controller then
/// adopts it instead of acquiring a second camera.
#[derive(Default)]
pub struct VideoSurface {
    source: RwLock<Option<Arc<dyn MediaStream>>>,
}

impl VideoSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, stream: Arc<dyn MediaStream>) {
        debug!("Video surface attached to stream {}", stream.id());
        *write(&self.source) = Some(stream);
    }

    pub fn detach(&self) -> Option<Arc<dyn MediaStream>> {
        write(&self.source).take()
    }

    pub fn source(&self) -> Option<Arc<dyn MediaStream>> {
        read(&self.source).clone()
    }

    pub fn has_source(&self) -> bool {
        read(&self.source).is_some()
    }

    /// The attached stream, if it still has a live track.
    pub fn active_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.source().filter(|s| s.is_active())
    }
}

impl FrameSource for VideoSurface {
    fn dimensions(&self) -> (u32, u32) {
        self.active_stream()
            .and_then(|s| s.frame_dimensions())
            .unwrap_or((0, 0))
    }

    fn read_frame(&self, target: &mut RgbImage) -> bool {
        let Some(stream) = self.active_stream() else {
            return false;
        };
        let Some((width, height)) = stream.frame_dimensions() else {
            return false;
        };
        if width == 0 || height == 0 {
            return false;
        }
        ensure_dimensions(target, width, height);
        stream.read_frame(target)
    }
}
