use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{ProctorError, Result};

/// A coarse raw-PCM excerpt taken by the periodic audio sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSample {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub captured_at: DateTime<Utc>,
}

pub type AudioSampleCallback = Arc<dyn Fn(AudioSample) -> anyhow::Result<()> + Send + Sync>;

impl AudioSample {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }

    /// Mono 32-bit float WAV.
    pub fn encode_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let encoding = |e: hound::Error| ProctorError::Encoding(format!("wav: {}", e));

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(encoding)?;
            for &sample in &self.samples {
                writer.write_sample(sample).map_err(encoding)?;
            }
            writer.finalize().map_err(encoding)?;
        }
        Ok(cursor.into_inner())
    }
}
