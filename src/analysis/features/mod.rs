// FeatureExtractor - spectral features for click/note classification
//
// Extracts three statistics from a 2048-sample window anchored at an onset:
//
// 1. Mean MFCC vector (13 coefficients) across the window's STFT frames
// 2. Mean spectral centroid in Hz over the same STFT
// 3. Energy-decay ratio (second-half energy / first-half energy); metronome
//    clicks decay almost immediately, plucked notes sustain
//
// Module organization:
// - fft: windowed FFT (magnitude and power spectra)
// - mel: mel filterbank and DCT for MFCCs
// - types: WindowFeatures struct
// - mod.rs: coordinator (FeatureExtractor)

pub mod fft;
pub mod mel;
mod types;

pub use types::WindowFeatures;

use fft::FftProcessor;
use mel::{dct_ii, MelFilterbank, N_MELS, N_MFCC};

/// Onset window length in samples (~46 ms at 44100 Hz)
pub const WINDOW_SAMPLES: usize = 2048;

/// STFT hop inside the window
const STFT_HOP: usize = 512;

/// Windows quieter than this peak amplitude are treated as silent
const SILENCE_PEAK: f32 = 1e-6;

/// Feature extractor for fixed-size onset windows
pub struct FeatureExtractor {
    sample_rate: u32,
    fft: FftProcessor,
    mel: MelFilterbank,
}

impl FeatureExtractor {
    /// Create an extractor for the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        let fft_size = WINDOW_SAMPLES;
        Self {
            sample_rate,
            fft: FftProcessor::new(fft_size),
            mel: MelFilterbank::new(N_MELS, fft_size, sample_rate),
        }
    }

    /// Extract features from the window starting at `start` in `buffer`
    ///
    /// Returns `None` when the window would overrun the buffer or is silent.
    pub fn extract_at(&self, buffer: &[f32], start: usize) -> Option<WindowFeatures> {
        let end = start.checked_add(WINDOW_SAMPLES)?;
        if end > buffer.len() {
            return None;
        }
        self.extract(&buffer[start..end])
    }

    /// Extract features from a complete window
    ///
    /// Returns `None` for silent windows (peak amplitude below 1e-6).
    pub fn extract(&self, window: &[f32]) -> Option<WindowFeatures> {
        let peak = window.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        if peak < SILENCE_PEAK {
            return None;
        }

        let fft_size = self.fft.fft_size().min(window.len());

        // STFT frames across the window; a full 2048-sample window yields a
        // single frame, shorter windows still produce one zero-padded frame
        let mut mfcc_sum = vec![0.0f64; N_MFCC];
        let mut centroid_sum = 0.0f64;
        let mut frames = 0usize;

        let mut pos = 0;
        loop {
            let frame_end = (pos + fft_size).min(window.len());
            let frame = &window[pos..frame_end];

            let power = self.fft.power_spectrum(frame);
            let log_mel = self.mel.log_energies(&power);
            let mfcc = dct_ii(&log_mel, N_MFCC);
            for (sum, c) in mfcc_sum.iter_mut().zip(mfcc.iter()) {
                *sum += c;
            }

            let magnitude: Vec<f32> = power.iter().map(|p| p.sqrt()).collect();
            centroid_sum += self.spectral_centroid(&magnitude);
            frames += 1;

            pos += STFT_HOP;
            if pos + fft_size > window.len() {
                break;
            }
        }

        let mfcc = mfcc_sum.iter().map(|s| s / frames as f64).collect();
        let spectral_centroid = centroid_sum / frames as f64;
        let energy_decay = energy_decay_ratio(window);

        Some(WindowFeatures {
            mfcc,
            spectral_centroid,
            energy_decay,
        })
    }

    /// Spectral centroid in Hz: magnitude-weighted mean frequency
    fn spectral_centroid(&self, magnitude: &[f32]) -> f64 {
        let bin_width = self.sample_rate as f64 / self.fft.fft_size() as f64;
        let total: f64 = magnitude.iter().map(|&m| m as f64).sum();
        if total < 1e-10 {
            return 0.0;
        }
        let weighted: f64 = magnitude
            .iter()
            .enumerate()
            .map(|(i, &m)| i as f64 * bin_width * m as f64)
            .sum();
        weighted / total
    }
}

/// Energy-decay ratio: second-half energy over first-half energy
///
/// Defined as 1.0 when the first half is essentially empty.
pub fn energy_decay_ratio(window: &[f32]) -> f64 {
    let mid = window.len() / 2;
    let first: f64 = window[..mid].iter().map(|&s| s as f64 * s as f64).sum();
    let second: f64 = window[mid..].iter().map(|&s| s as f64 * s as f64).sum();
    if first < 1e-10 {
        1.0
    } else {
        second / first
    }
}
