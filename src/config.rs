use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ProctorError, Result};

pub const CONFIG_ENV: &str = "PROCTOR_CONFIG";
pub const BACKEND_URL_ENV: &str = "PROCTOR_BACKEND_URL";
pub const ENROLLMENT_ENV: &str = "PROCTOR_ENROLLMENT_ID";

/// Whether a capture modality must, may, or must not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Required,
    Optional,
    Disabled,
}

impl Requirement {
    pub fn wanted(self) -> bool {
        !matches!(self, Requirement::Disabled)
    }

    pub fn is_required(self) -> bool {
        matches!(self, Requirement::Required)
    }
}

/// Voice detection tuning. The dB thresholds and the band are hand-tuned and
/// kept overridable rather than derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Energy gate: frames at or below this loudness never reach the classifier.
    pub gate_threshold_db: f32,
    /// A voice-band bin above this counts as a peak.
    pub peak_threshold_db: f32,
    /// Average of the peak bins must exceed this.
    pub average_threshold_db: f32,
    /// A single bin above this qualifies on its own.
    pub strong_peak_threshold_db: f32,
    pub band_low_hz: f32,
    pub band_high_hz: f32,
    pub cooldown_ms: u64,
    /// Analysis tick, roughly one display frame.
    pub tick_interval_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            gate_threshold_db: -55.0,
            peak_threshold_db: -65.0,
            average_threshold_db: -80.0,
            strong_peak_threshold_db: -60.0,
            band_low_hz: 85.0,
            band_high_hz: 255.0,
            cooldown_ms: 5_000,
            tick_interval_ms: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserOptions {
    pub fft_size: usize,
    /// Exponential smoothing between successive spectra, 0.0 - 1.0.
    pub smoothing: f32,
}

impl Default for AnalyserOptions {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    pub interval_ms: u64,
    /// Minimum gap between two violation snapshots of the same kind.
    pub violation_cooldown_ms: u64,
    /// A submission slower than this is dropped and the tick skipped.
    pub detection_timeout_ms: u64,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            violation_cooldown_ms: 10_000,
            detection_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub warmup_ms: u64,
    pub interval_ms: u64,
    pub jpeg_quality: u8,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            warmup_ms: 1_000,
            interval_ms: 30_000,
            jpeg_quality: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSamplingConfig {
    pub interval_ms: u64,
}

impl Default for AudioSamplingConfig {
    fn default() -> Self {
        Self { interval_ms: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub enrollment_id: String,
    pub camera: Requirement,
    pub microphone: Requirement,
    pub voice_detection: bool,
    pub face_detection: bool,
    pub audio_sampling: bool,
    pub auto_upload: bool,
    pub auto_report: bool,
    pub report_interval_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enrollment_id: String::new(),
            camera: Requirement::Optional,
            microphone: Requirement::Optional,
            voice_detection: true,
            face_detection: true,
            audio_sampling: false,
            auto_upload: false,
            auto_report: false,
            report_interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    pub voice: VoiceConfig,
    pub analyser: AnalyserOptions,
    pub face: FaceConfig,
    pub snapshot: SnapshotConfig,
    pub audio_sampling: AudioSamplingConfig,
    pub session: SessionConfig,
    pub backend: BackendConfig,
}

impl ProctorConfig {
    /// Reads a JSON config file. Missing sections fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProctorError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&raw)?;
        info!("Loaded proctor config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ProctorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `PROCTOR_CONFIG` file (if set), then env overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            config.backend.base_url = Some(url);
        }
        if let Ok(id) = std::env::var(ENROLLMENT_ENV) {
            config.session.enrollment_id = id;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fft = self.analyser.fft_size;
        if !fft.is_power_of_two() || !(32..=32_768).contains(&fft) {
            return Err(ProctorError::Config(format!(
                "fft_size must be a power of two in 32..=32768, got {}",
                fft
            )));
        }
        if !(0.0..=1.0).contains(&self.analyser.smoothing) {
            return Err(ProctorError::Config(format!(
                "smoothing must be within [0, 1], got {}",
                self.analyser.smoothing
            )));
        }
        if self.voice.band_low_hz < 0.0 || self.voice.band_low_hz >= self.voice.band_high_hz {
            return Err(ProctorError::Config(format!(
                "voice band {}..{} Hz is empty",
                self.voice.band_low_hz, self.voice.band_high_hz
            )));
        }
        let intervals = [
            ("voice.tick_interval_ms", self.voice.tick_interval_ms),
            ("face.interval_ms", self.face.interval_ms),
            ("snapshot.interval_ms", self.snapshot.interval_ms),
            ("audio_sampling.interval_ms", self.audio_sampling.interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ProctorError::Config(format!("{} must be non-zero", name)));
            }
        }
        if self.session.report_interval_ms == Some(0) {
            return Err(ProctorError::Config(
                "session.report_interval_ms must be non-zero".to_string(),
            ));
        }
        if !(1..=100).contains(&self.snapshot.jpeg_quality) {
            return Err(ProctorError::Config(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.snapshot.jpeg_quality
            )));
        }
        Ok(())
    }
}
