use std::ops::RangeInclusive;

use crate::config::VoiceConfig;

/// Spectrum bin holding `frequency_hz` for the given rate and FFT size.
pub fn bin_index(frequency_hz: f32, sample_rate: u32, fft_size: usize) -> usize {
    let bin_width = sample_rate as f32 / fft_size as f32;
    (frequency_hz / bin_width).floor().max(0.0) as usize
}

/// Inclusive bin range for a frequency band, clamped to `bin_count`.
/// `None` if the band falls entirely outside the spectrum.
pub fn band_bins(
    low_hz: f32,
    high_hz: f32,
    sample_rate: u32,
    fft_size: usize,
    bin_count: usize,
) -> Option<RangeInclusive<usize>> {
    if bin_count == 0 || sample_rate == 0 || fft_size == 0 {
        return None;
    }
    let low = bin_index(low_hz, sample_rate, fft_size);
    let high = bin_index(high_hz, sample_rate, fft_size).min(bin_count - 1);
    if low > high {
        return None;
    }
    Some(low..=high)
}

/// What the classifier saw in the voice band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceAnalysis {
    pub peak_bins: usize,
    /// Average of the peak bins, `-inf` if there were none.
    pub peak_average_db: f32,
    /// Loudest bin in the band, `-inf` if the band was empty.
    pub max_db: f32,
    pub is_voice: bool,
}

/// Frequency-domain speech check over the fundamental band of the human voice.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceClassifier {
    pub band_low_hz: f32,
    pub band_high_hz: f32,
    pub peak_threshold_db: f32,
    pub average_threshold_db: f32,
    pub strong_peak_threshold_db: f32,
}

impl Default for VoiceClassifier {
    fn default() -> Self {
        Self::from_config(&VoiceConfig::default())
    }
}

impl VoiceClassifier {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            band_low_hz: config.band_low_hz,
            band_high_hz: config.band_high_hz,
            peak_threshold_db: config.peak_threshold_db,
            average_threshold_db: config.average_threshold_db,
            strong_peak_threshold_db: config.strong_peak_threshold_db,
        }
    }

    pub fn classify(&self, frequency_db: &[f32], sample_rate: u32, fft_size: usize) -> bool {
        self.analyze(frequency_db, sample_rate, fft_size).is_voice
    }

    /// Voice if some bins peak and their average clears the secondary
    /// threshold, or if a single bin alone clears the strong threshold (short
    /// plosives rarely sustain energy across bins).
    pub fn analyze(&self, frequency_db: &[f32], sample_rate: u32, fft_size: usize) -> VoiceAnalysis {
        let mut analysis = VoiceAnalysis {
            peak_bins: 0,
            peak_average_db: f32::NEG_INFINITY,
            max_db: f32::NEG_INFINITY,
            is_voice: false,
        };

        let Some(range) = band_bins(
            self.band_low_hz,
            self.band_high_hz,
            sample_rate,
            fft_size,
            frequency_db.len(),
        ) else {
            return analysis;
        };

        let mut peak_sum = 0.0f32;
        for &value in &frequency_db[range] {
            if value > analysis.max_db {
                analysis.max_db = value;
            }
            if value > self.peak_threshold_db {
                analysis.peak_bins += 1;
                peak_sum += value;
            }
        }

        if analysis.peak_bins > 0 {
            analysis.peak_average_db = peak_sum / analysis.peak_bins as f32;
        }

        let sustained =
            analysis.peak_bins >= 1 && analysis.peak_average_db > self.average_threshold_db;
        let strong = analysis.max_db > self.strong_peak_threshold_db;
        analysis.is_voice = sustained || strong;
        analysis
    }
}
