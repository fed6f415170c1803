use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{MediaCapture, MediaConstraints, MediaKind, MediaStream};
use crate::audio::capture::MicrophoneStream;
use crate::error::{ProctorError, Result};

/// Host-device capture: microphone through cpal.
///
/// No camera backend is linked into this crate; camera requests fail with
/// `DeviceUnavailable`, which an optional camera requirement tolerates.
/// Hosts with a camera supply their own `MediaCapture` or attach a stream to
/// the `VideoSurface` before starting.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMediaCapture;

impl SystemMediaCapture {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaCapture for SystemMediaCapture {
    async fn request(
        &self,
        kind: MediaKind,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaStream>> {
        match kind {
            MediaKind::Microphone => {
                let constraints = constraints.clone();
                let stream = tokio::task::spawn_blocking(move || MicrophoneStream::open(&constraints))
                    .await
                    .map_err(|e| ProctorError::DeviceUnavailable {
                        kind,
                        reason: format!("microphone open worker failed: {}", e),
                    })??;
                info!("Microphone stream {} acquired", stream.id());
                Ok(Arc::new(stream))
            }
            MediaKind::Camera => Err(ProctorError::DeviceUnavailable {
                kind,
                reason: "no camera backend available".to_string(),
            }),
        }
    }
}
