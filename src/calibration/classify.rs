// Real-time onset classification against calibration profiles
//
// Scores the onset window's MFCC vector against each profile by cosine
// similarity, minus a penalty for energy-decay distance (clicks die out
// almost immediately, plucked notes sustain). The higher score wins. All
// degraded inputs default to guitar: a missed guitar note costs the player
// a data point, a missed click corrupts the grid.

use crate::analysis::features::FeatureExtractor;

use super::{CalibrationProfile, CalibrationSet};

/// Weight of the energy-decay distance against the MFCC similarity
const DECAY_WEIGHT: f64 = 0.3;

/// Spectral class of a single onset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnsetClass {
    Click,
    Guitar,
}

/// Classify the onset at `onset_sample` in `buffer` as click or guitar
///
/// Defaults to guitar when either profile is missing, the window is silent
/// or unavailable, or the onset MFCC has no usable norm.
pub fn classify_onset(
    buffer: &[f32],
    onset_sample: usize,
    calibration: &CalibrationSet,
    extractor: &FeatureExtractor,
) -> OnsetClass {
    let (Some(met), Some(gtr)) = (&calibration.metronome, &calibration.guitar) else {
        return OnsetClass::Guitar;
    };

    let Some(features) = extractor.extract_at(buffer, onset_sample) else {
        return OnsetClass::Guitar;
    };

    let norm: f64 = features.mfcc.iter().map(|c| c * c).sum::<f64>().sqrt();
    if norm < 1e-10 {
        return OnsetClass::Guitar;
    }

    let score_met = profile_score(&features.mfcc, features.energy_decay, met);
    let score_gtr = profile_score(&features.mfcc, features.energy_decay, gtr);

    if score_met > score_gtr {
        OnsetClass::Click
    } else {
        OnsetClass::Guitar
    }
}

fn profile_score(mfcc: &[f64], decay: f64, profile: &CalibrationProfile) -> f64 {
    cosine_similarity(mfcc, &profile.mfcc_mean) - DECAY_WEIGHT * (decay - profile.energy_decay).abs()
}

/// Cosine similarity between two vectors; 0 when either norm is below 1e-10
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a < 1e-10 || norm_b < 1e-10 {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}
