// Offline onset detection for calibration recordings
//
// Batch spectral-flux detection over a complete buffer:
// 1. Hann-windowed 1024-point STFT at hop 512
// 2. Spectral flux per frame: sum of positive magnitude differences
// 3. Adaptive threshold: median over a +-25 frame window plus 10% of the
//    global flux maximum
// 4. Local-maximum peak picking with a 50 ms minimum separation
//
// Onset times are frame starts in seconds (no backtracking). Works on short
// recordings (a couple of seconds of clicks is enough for a profile).

use crate::analysis::features::fft::FftProcessor;

/// STFT frame length
const FFT_SIZE: usize = 1024;

/// STFT hop
const HOP_SIZE: usize = 512;

/// Half-width of the median window used for the adaptive threshold
const MEDIAN_HALFSIZE: usize = 25;

/// Threshold offset as a fraction of the global flux maximum
const PEAK_FRACTION: f32 = 0.1;

/// Minimum spacing between reported onsets in seconds
const MIN_SEPARATION_S: f64 = 0.05;

/// Detect onsets over a complete recording; returns times in seconds
pub fn detect_onsets(audio: &[f32], sample_rate: u32) -> Vec<f64> {
    if audio.len() < FFT_SIZE {
        return Vec::new();
    }

    let fft = FftProcessor::new(FFT_SIZE);
    let mut flux = Vec::with_capacity(audio.len() / HOP_SIZE + 1);
    let mut prev_spectrum = vec![0.0f32; FFT_SIZE / 2 + 1];

    let mut pos = 0;
    while pos + FFT_SIZE <= audio.len() {
        let spectrum = fft.magnitude_spectrum(&audio[pos..pos + FFT_SIZE]);
        let frame_flux: f32 = spectrum
            .iter()
            .zip(prev_spectrum.iter())
            .map(|(&curr, &prev)| (curr - prev).max(0.0))
            .sum();
        flux.push(frame_flux);
        prev_spectrum = spectrum;
        pos += HOP_SIZE;
    }

    let max_flux = flux.iter().cloned().fold(0.0f32, f32::max);
    if max_flux < 1e-9 {
        return Vec::new();
    }
    let offset = PEAK_FRACTION * max_flux;

    let mut onsets = Vec::new();
    let mut last_onset: Option<f64> = None;

    for i in 0..flux.len() {
        let prev = if i > 0 { flux[i - 1] } else { 0.0 };
        let next = if i + 1 < flux.len() { flux[i + 1] } else { 0.0 };
        if flux[i] <= prev || flux[i] < next {
            continue;
        }
        if flux[i] <= median_around(&flux, i) + offset {
            continue;
        }

        let time = (i * HOP_SIZE) as f64 / sample_rate as f64;
        let keep = match last_onset {
            None => true,
            Some(last) => time - last >= MIN_SEPARATION_S,
        };
        if keep {
            onsets.push(time);
            last_onset = Some(time);
        }
    }

    onsets
}

/// Median of the flux signal over a window centered at `index`
fn median_around(flux: &[f32], index: usize) -> f32 {
    let start = index.saturating_sub(MEDIAN_HALFSIZE);
    let end = (index + MEDIAN_HALFSIZE + 1).min(flux.len());

    let mut window: Vec<f32> = flux[start..end].to_vec();
    window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = window.len() / 2;
    if window.len() % 2 == 0 {
        (window[mid - 1] + window[mid]) / 2.0
    } else {
        window[mid]
    }
}
