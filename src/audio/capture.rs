use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, warn};

use crate::error::{ProctorError, Result};
use crate::kernel::sync::lock;
use crate::media::{MediaConstraints, MediaKind, MediaStream, MediaTrack, SampleWindow};

/// Seconds of audio kept in the sample window.
const WINDOW_SECONDS: usize = 2;

/// Microphone stream backed by a cpal input stream.
///
/// cpal streams are not `Send` on every platform, so the stream lives on its
/// own thread and is dropped there when the handle is released.
pub struct MicrophoneStream {
    id: String,
    tracks: Vec<Arc<MediaTrack>>,
    window: Arc<SampleWindow>,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
}

struct Opened {
    window: Arc<SampleWindow>,
    device_name: String,
}

impl MicrophoneStream {
    /// Opens the default input device. Blocks until the device is running or
    /// has failed, so call it off the async executor.
    pub fn open(constraints: &MediaConstraints) -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Opened>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let preferred_rate = constraints.sample_rate;

        std::thread::Builder::new()
            .name("proctor-microphone".to_string())
            .spawn(move || match build_input(preferred_rate) {
                Ok((stream, opened)) => {
                    let _ = ready_tx.send(Ok(opened));
                    // Park until released (or the handle is dropped).
                    let _ = stop_rx.recv();
                    drop(stream);
                    info!("Microphone capture thread exiting");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| ProctorError::DeviceUnavailable {
                kind: MediaKind::Microphone,
                reason: format!("failed to spawn capture thread: {}", e),
            })?;

        let opened = ready_rx.recv().map_err(|_| ProctorError::DeviceUnavailable {
            kind: MediaKind::Microphone,
            reason: "capture thread exited before the device opened".to_string(),
        })??;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks: vec![Arc::new(MediaTrack::new(
                MediaKind::Microphone,
                opened.device_name,
            ))],
            window: opened.window,
            stop_tx: Mutex::new(Some(stop_tx)),
        })
    }
}

impl MediaStream for MicrophoneStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Microphone
    }

    fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    fn release(&self) {
        if let Some(tx) = lock(&self.stop_tx).take() {
            let _ = tx.send(());
            info!("Microphone stream {} released", self.id);
        }
    }

    fn audio_tap(&self) -> Option<Arc<SampleWindow>> {
        Some(self.window.clone())
    }
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        self.release();
    }
}

fn unavailable(reason: impl Into<String>) -> ProctorError {
    ProctorError::DeviceUnavailable {
        kind: MediaKind::Microphone,
        reason: reason.into(),
    }
}

fn denied(reason: impl Into<String>) -> ProctorError {
    ProctorError::PermissionDenied {
        kind: MediaKind::Microphone,
        reason: reason.into(),
    }
}

fn build_input(preferred_rate: Option<u32>) -> Result<(cpal::Stream, Opened)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| unavailable("no input device available"))?;
    let device_name = device.name().unwrap_or_default();

    info!("Audio Input Device: {}", device_name);

    // Honour a requested rate when the device supports it, otherwise take the
    // device default. The analyser works at any rate.
    let mut selected = None;
    if let Some(rate) = preferred_rate {
        let configs = device
            .supported_input_configs()
            .map_err(|e| unavailable(e.to_string()))?;
        for range in configs {
            if range.min_sample_rate().0 <= rate && range.max_sample_rate().0 >= rate {
                selected = Some(range.with_sample_rate(cpal::SampleRate(rate)));
                break;
            }
        }
    }
    let config = match selected {
        Some(c) => c,
        None => device
            .default_input_config()
            .map_err(|e| unavailable(e.to_string()))?,
    };

    let sample_rate = config.sample_rate().0;
    let channels = config.channels().max(1) as usize;
    info!(
        "Audio Config Selected: Rate={}Hz, Channels={}",
        sample_rate, channels
    );

    let window = Arc::new(SampleWindow::new(
        sample_rate as usize * WINDOW_SECONDS,
        sample_rate,
    ));
    let err_fn = |err| error!("an error occurred on stream: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let window = window.clone();
            let mut mono = Vec::new();
            device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| write_input_data(data, channels, &mut mono, &window),
                err_fn,
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let window = window.clone();
            let mut mono = Vec::new();
            device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| {
                    write_input_data_i16(data, channels, &mut mono, &window)
                },
                err_fn,
                None,
            )
        }
        other => return Err(unavailable(format!("unsupported sample format {:?}", other))),
    }
    .map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => unavailable(e.to_string()),
        other => denied(other.to_string()),
    })?;

    stream.play().map_err(|e| {
        warn!("Microphone stream refused to start: {}", e);
        denied(e.to_string())
    })?;

    Ok((
        stream,
        Opened {
            window,
            device_name,
        },
    ))
}

fn write_input_data(input: &[f32], channels: usize, mono: &mut Vec<f32>, window: &SampleWindow) {
    mono.clear();
    mono.extend(
        input
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
    );
    window.push(mono);
}

fn write_input_data_i16(input: &[i16], channels: usize, mono: &mut Vec<f32>, window: &SampleWindow) {
    // Convert to f32
    mono.clear();
    mono.extend(input.chunks(channels).map(|frame| {
        frame
            .iter()
            .map(|&s| s as f32 / i16::MAX as f32)
            .sum::<f32>()
            / frame.len() as f32
    }));
    window.push(mono);
}
