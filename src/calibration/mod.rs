// Calibration - spectral profiles for metronome clicks and guitar notes
//
// Used in two contexts:
// 1. Offline: after a calibration recording, extract an averaged profile
//    from the windows around every detected onset.
// 2. Real-time: classify a single onset window against stored profiles
//    (see classify).

pub mod classify;

pub use classify::{classify_onset, cosine_similarity, OnsetClass};

use serde::{Deserialize, Serialize};

use crate::analysis::features::FeatureExtractor;
use crate::analysis::offline;

/// Averaged spectral profile of one sound source
///
/// Immutable once extracted; travels over the wire in `calibration_result`
/// and back in the `start` control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// Mean MFCC vector (13 coefficients)
    pub mfcc_mean: Vec<f64>,
    /// Mean spectral centroid in Hz
    pub spectral_centroid: f64,
    /// Mean energy-decay ratio
    pub energy_decay: f64,
    /// Number of onset windows averaged into this profile
    pub onset_count: usize,
}

impl CalibrationProfile {
    /// The all-zero profile returned when a recording has no usable onsets
    pub fn empty() -> Self {
        Self {
            mfcc_mean: vec![0.0; 13],
            spectral_centroid: 0.0,
            energy_decay: 0.0,
            onset_count: 0,
        }
    }
}

/// The profile pair supplied at session start; either side may be absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSet {
    #[serde(default)]
    pub metronome: Option<CalibrationProfile>,
    #[serde(default)]
    pub guitar: Option<CalibrationProfile>,
}

/// Analyze a calibration recording and return an averaged profile
///
/// Detects onsets offline, extracts a feature window at each onset (skipping
/// windows that would overrun the buffer), and averages the feature
/// statistics. Zero surviving onsets yield the zero-valued profile.
pub fn extract_profile(audio: &[f32], sample_rate: u32) -> CalibrationProfile {
    let onset_times = offline::detect_onsets(audio, sample_rate);
    if onset_times.is_empty() {
        return CalibrationProfile::empty();
    }

    let extractor = FeatureExtractor::new(sample_rate);

    let mut mfcc_sum = vec![0.0f64; 13];
    let mut centroid_sum = 0.0f64;
    let mut decay_sum = 0.0f64;
    let mut count = 0usize;

    for &t in &onset_times {
        let start = (t * sample_rate as f64) as usize;
        let Some(features) = extractor.extract_at(audio, start) else {
            continue;
        };
        for (sum, c) in mfcc_sum.iter_mut().zip(features.mfcc.iter()) {
            *sum += c;
        }
        centroid_sum += features.spectral_centroid;
        decay_sum += features.energy_decay;
        count += 1;
    }

    if count == 0 {
        return CalibrationProfile::empty();
    }

    let n = count as f64;
    CalibrationProfile {
        mfcc_mean: mfcc_sum.iter().map(|s| s / n).collect(),
        spectral_centroid: centroid_sum / n,
        energy_decay: decay_sum / n,
        onset_count: count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::WINDOW_SAMPLES;

    const SAMPLE_RATE: u32 = 44100;

    pub(crate) fn click_recording(duration_s: f64) -> Vec<f32> {
        let mut signal = vec![0.0f32; (duration_s * SAMPLE_RATE as f64) as usize];
        let mut start = (0.25 * SAMPLE_RATE as f64) as usize;
        while start + WINDOW_SAMPLES < signal.len() {
            for i in 0..1024 {
                let t = i as f32 / SAMPLE_RATE as f32;
                signal[start + i] = 0.8
                    * (-(i as f32) / 64.0).exp()
                    * (2.0 * std::f32::consts::PI * 3500.0 * t).sin();
            }
            start += (0.5 * SAMPLE_RATE as f64) as usize;
        }
        signal
    }

    pub(crate) fn tone_recording(duration_s: f64) -> Vec<f32> {
        let mut signal = vec![0.0f32; (duration_s * SAMPLE_RATE as f64) as usize];
        let mut start = (0.25 * SAMPLE_RATE as f64) as usize;
        while start + 4410 < signal.len() {
            for i in 0..4410 {
                let t = i as f32 / SAMPLE_RATE as f32;
                signal[start + i] = 0.6
                    * (-(i as f32) / 2205.0).exp()
                    * (2.0 * std::f32::consts::PI * 220.0 * t).sin();
            }
            start += (0.5 * SAMPLE_RATE as f64) as usize;
        }
        signal
    }

    #[test]
    fn test_empty_recording_yields_zero_profile() {
        let profile = extract_profile(&vec![0.0; SAMPLE_RATE as usize * 2], SAMPLE_RATE);
        assert_eq!(profile, CalibrationProfile::empty());
        assert_eq!(profile.onset_count, 0);
    }

    #[test]
    fn test_click_recording_profile() {
        let profile = extract_profile(&click_recording(3.0), SAMPLE_RATE);

        assert!(
            profile.onset_count >= 3,
            "expected several click onsets, got {}",
            profile.onset_count
        );
        assert_eq!(profile.mfcc_mean.len(), 13);
        assert!(profile.mfcc_mean.iter().all(|c| c.is_finite()));
        assert!(
            profile.energy_decay < 0.3,
            "clicks decay fast, got {}",
            profile.energy_decay
        );
        assert!(profile.spectral_centroid > 0.0);
    }

    #[test]
    fn test_profiles_separate_clicks_from_tones() {
        let clicks = extract_profile(&click_recording(3.0), SAMPLE_RATE);
        let tones = extract_profile(&tone_recording(3.0), SAMPLE_RATE);

        assert!(clicks.onset_count >= 3);
        assert!(tones.onset_count >= 3);
        assert!(
            tones.energy_decay > clicks.energy_decay + 0.2,
            "sustained tones (decay {}) must hold energy longer than clicks (decay {})",
            tones.energy_decay,
            clicks.energy_decay
        );
    }

    #[test]
    fn test_profile_serde_round_trip() {
        let profile = extract_profile(&click_recording(2.5), SAMPLE_RATE);
        let json = serde_json::to_string(&profile).unwrap();
        let parsed: CalibrationProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(profile, parsed);
    }

    #[test]
    fn test_calibration_set_parses_partial_json() {
        let set: CalibrationSet = serde_json::from_str("{}").unwrap();
        assert!(set.metronome.is_none());
        assert!(set.guitar.is_none());

        let set: CalibrationSet = serde_json::from_str(
            r#"{"metronome": {"mfcc_mean": [0.0,0,0,0,0,0,0,0,0,0,0,0,0],
                 "spectral_centroid": 3000.0, "energy_decay": 0.05, "onset_count": 4}}"#,
        )
        .unwrap();
        assert!(set.metronome.is_some());
        assert!(set.guitar.is_none());
    }
}
