mod common;

use std::sync::Arc;

use common::{filled_window, noise, sine, NodeProbe, ProbeNode, SAMPLE_RATE};
use proctor::audio::analyser::AudioAnalysisContext;
use proctor::audio::energy::{energy_db, rms, EnergyGate};
use proctor::audio::voice::{band_bins, bin_index, VoiceClassifier};
use proctor::audio::VoicePipeline;
use proctor::config::VoiceConfig;
use proctor::error::ProctorError;

fn context_over(samples: &[f32]) -> (AudioAnalysisContext, Arc<NodeProbe>) {
    let probe = Arc::new(NodeProbe::default());
    let node = ProbeNode::new(filled_window(samples), probe.clone());
    (AudioAnalysisContext::new(Box::new(node)), probe)
}

#[test]
fn test_silence_is_negative_infinity() {
    assert_eq!(energy_db(&[0.0; 2048]), f32::NEG_INFINITY);
    assert_eq!(energy_db(&[]), f32::NEG_INFINITY);
    assert_eq!(rms(&[]), 0.0);

    // -inf must simply read as "below threshold"
    let gate = EnergyGate::new(-55.0);
    assert!(!gate.passes(f32::NEG_INFINITY));
    assert_eq!(gate.measure(&[0.0; 16]), (f32::NEG_INFINITY, false));
}

#[test]
fn test_full_scale_square_is_zero_db() {
    let square: Vec<f32> = (0..1024).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
    assert!(energy_db(&square).abs() < 1e-4);

    let gate = EnergyGate::new(-55.0);
    let (db, loud) = gate.measure(&sine(150.0, 0.5, 2048, SAMPLE_RATE));
    assert!(loud, "half-scale tone should clear the gate, got {} dB", db);
    assert!((db - (-9.03)).abs() < 0.2, "rms of 0.5 sine is ~-9 dB, got {}", db);
}

#[test]
fn test_voice_band_bins() {
    // 48 kHz / 2048 = 23.4375 Hz per bin
    assert_eq!(bin_index(150.0, SAMPLE_RATE, 2048), 6);
    assert_eq!(bin_index(85.0, SAMPLE_RATE, 2048), 3);
    assert_eq!(bin_index(255.0, SAMPLE_RATE, 2048), 10);
    assert_eq!(band_bins(85.0, 255.0, SAMPLE_RATE, 2048, 1024), Some(3..=10));

    // Clamped to a short buffer, or gone entirely
    assert_eq!(band_bins(85.0, 255.0, SAMPLE_RATE, 2048, 8), Some(3..=7));
    assert_eq!(band_bins(85.0, 255.0, SAMPLE_RATE, 2048, 2), None);
    assert_eq!(band_bins(85.0, 255.0, SAMPLE_RATE, 2048, 0), None);
}

#[test]
fn test_classifier_thresholds() {
    let classifier = VoiceClassifier::default();
    let mut spectrum = vec![-120.0f32; 1024];

    assert!(!classifier.classify(&spectrum, SAMPLE_RATE, 2048));

    // Single strong bin in band
    spectrum[6] = -50.0;
    assert!(classifier.classify(&spectrum, SAMPLE_RATE, 2048));

    // Same strength outside the band does not count
    spectrum[6] = -120.0;
    spectrum[200] = -20.0;
    assert!(!classifier.classify(&spectrum, SAMPLE_RATE, 2048));

    // Weak peaks whose average clears -80 dB
    spectrum[200] = -120.0;
    spectrum[4] = -64.0;
    spectrum[5] = -63.0;
    let analysis = classifier.analyze(&spectrum, SAMPLE_RATE, 2048);
    assert_eq!(analysis.peak_bins, 2);
    assert!(analysis.is_voice);
    assert!(analysis.max_db < -60.0);
}

#[test]
fn test_classifier_handles_negative_infinity_bins() {
    let classifier = VoiceClassifier::default();
    let spectrum = vec![f32::NEG_INFINITY; 1024];
    let analysis = classifier.analyze(&spectrum, SAMPLE_RATE, 2048);
    assert_eq!(analysis.peak_bins, 0);
    assert_eq!(analysis.max_db, f32::NEG_INFINITY);
    assert!(!analysis.is_voice);
}

#[test]
fn test_context_buffer_sizes_fixed() {
    let (mut ctx, _probe) = context_over(&sine(150.0, 0.5, 4096, SAMPLE_RATE));
    assert_eq!(ctx.fft_size(), 2048);
    assert_eq!(ctx.time_domain_len(), 2048);
    assert_eq!(ctx.frequency_len(), 1024);

    for _ in 0..5 {
        assert_eq!(ctx.read_time_domain().unwrap().len(), 2048);
        assert_eq!(ctx.read_frequency_db().unwrap().len(), 1024);
    }
    assert_eq!(ctx.time_domain_len(), 2048);
    assert_eq!(ctx.frequency_len(), 1024);
}

#[test]
fn test_closed_context_refuses_reads() {
    let (mut ctx, probe) = context_over(&sine(150.0, 0.5, 4096, SAMPLE_RATE));
    ctx.close();
    ctx.close();
    assert!(ctx.is_closed());
    assert!(probe.is_closed());
    assert_eq!(ctx.read_time_domain().unwrap_err(), ProctorError::ContextClosed);
    assert_eq!(ctx.read_frequency_db().unwrap_err(), ProctorError::ContextClosed);
}

#[test]
fn test_silence_never_reaches_classifier() {
    let (mut ctx, probe) = context_over(&[0.0; 4096]);
    let mut pipeline = VoicePipeline::new(&VoiceConfig::default());

    for tick in 0..100u64 {
        let outcome = pipeline.step(&mut ctx, tick * 16).unwrap();
        assert_eq!(outcome.energy_db, f32::NEG_INFINITY);
        assert!(!outcome.is_voice);
        assert!(outcome.event.is_none());
    }

    assert_eq!(probe.time_reads(), 100);
    assert_eq!(probe.frequency_reads(), 0, "classifier must not run on silence");
}

#[test]
fn test_150hz_tone_is_voice_over_noise_floor() {
    let tone = sine(150.0, 0.5, 4096, SAMPLE_RATE);
    let floor = noise(0.05, 4096);
    let mixed: Vec<f32> = tone.iter().zip(floor.iter()).map(|(a, b)| a + b).collect();

    let (mut ctx, _probe) = context_over(&mixed);
    let spectrum = ctx.read_frequency_db().unwrap().to_vec();
    let analysis = VoiceClassifier::default().analyze(&spectrum, SAMPLE_RATE, 2048);

    assert!(analysis.max_db > -60.0, "peak at {} dB", analysis.max_db);
    assert!(analysis.is_voice);
}

#[test]
fn test_loud_tone_outside_band_passes_gate_but_not_classifier() {
    let (mut ctx, probe) = context_over(&sine(1_000.0, 0.5, 4096, SAMPLE_RATE));
    let mut pipeline = VoicePipeline::new(&VoiceConfig::default());

    let outcome = pipeline.step(&mut ctx, 0).unwrap();
    assert!(outcome.energy_db > -55.0);
    assert!(!outcome.is_voice);
    assert_eq!(probe.frequency_reads(), 1);
}

#[test]
fn test_cooldown_suppresses_second_detection_inside_window() {
    let (mut ctx, _probe) = context_over(&sine(150.0, 0.5, 4096, SAMPLE_RATE));
    let mut pipeline = VoicePipeline::new(&VoiceConfig::default());

    let first = pipeline.step(&mut ctx, 0).unwrap();
    let second = pipeline.step(&mut ctx, 2_000).unwrap();

    assert!(first.is_voice && second.is_voice);
    let fired = [&first, &second].iter().filter(|o| o.event.is_some()).count();
    assert_eq!(fired, 1, "5000ms window should let only one through");
    assert_eq!(pipeline.cooldown().last_fired_at(), Some(0));
}

#[test]
fn test_cooldown_allows_detection_after_window() {
    let (mut ctx, _probe) = context_over(&sine(150.0, 0.5, 4096, SAMPLE_RATE));
    let mut pipeline = VoicePipeline::new(&VoiceConfig::default());

    let first = pipeline.step(&mut ctx, 0).unwrap();
    let second = pipeline.step(&mut ctx, 6_000).unwrap();

    assert!(first.event.is_some());
    let event = second.event.expect("second detection should fire");
    assert_eq!(event.at_ms, 6_000);
}
