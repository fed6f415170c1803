use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};

use crate::error::{ProctorError, Result};
use crate::kernel::event::{SnapshotCategory, SnapshotPayload};
use crate::media::surface::ensure_dimensions;
use crate::media::FrameSource;

/// Offscreen raster the snapshot path draws into. One per session; the
/// buffer is only reallocated when the camera resolution changes.
pub struct SnapshotSurface {
    raster: RgbImage,
    quality: u8,
    allocations: u64,
}

impl SnapshotSurface {
    pub fn new(quality: u8) -> Self {
        Self {
            raster: RgbImage::new(0, 0),
            quality: quality.clamp(1, 100),
            allocations: 0,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    /// How many times the raster buffer has been (re)allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Draws the current frame and encodes it. `Ok(None)` when the source has
    /// no frame to give.
    pub fn capture(
        &mut self,
        source: &dyn FrameSource,
        requested: Option<SnapshotCategory>,
    ) -> Result<Option<SnapshotPayload>> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Ok(None);
        }
        if ensure_dimensions(&mut self.raster, width, height) {
            self.allocations += 1;
        }
        if !source.read_frame(&mut self.raster) {
            return Ok(None);
        }
        // The source may have resized on its own if the frame size moved
        // between the two calls.
        let (width, height) = self.raster.dimensions();

        let jpeg = self.encode_jpeg()?;
        Ok(Some(SnapshotPayload {
            jpeg,
            width,
            height,
            captured_at: Utc::now(),
            requested,
        }))
    }

    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let (width, height) = self.raster.dimensions();
        let mut out = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
            encoder
                .encode(self.raster.as_raw(), width, height, ColorType::Rgb8)
                .map_err(|e| ProctorError::Encoding(format!("jpeg: {}", e)))?;
        }
        Ok(out)
    }
}
