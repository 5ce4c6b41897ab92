// FFT module - windowed magnitude/power spectra
//
// Shared by feature extraction and the offline onset detector. Applies a
// Hann window to reduce spectral leakage and returns only the positive
// frequencies of the real-valued input.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// FFT processor with a pre-planned transform and pre-computed Hann window
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
}

impl FftProcessor {
    /// Create a processor for the given transform size
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let window = hann_window(fft_size);
        Self {
            fft,
            fft_size,
            window,
        }
    }

    /// Transform size this processor was planned for
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Compute the magnitude spectrum of an audio frame
    ///
    /// Input shorter than the FFT size is zero-padded; longer input is
    /// truncated. Returns `fft_size / 2 + 1` bins.
    pub fn magnitude_spectrum(&self, audio: &[f32]) -> Vec<f32> {
        let mut buffer = self.windowed_buffer(audio);
        self.fft.process(&mut buffer);
        buffer[..self.fft_size / 2 + 1]
            .iter()
            .map(|c| c.norm())
            .collect()
    }

    /// Compute the power spectrum (squared magnitudes) of an audio frame
    pub fn power_spectrum(&self, audio: &[f32]) -> Vec<f32> {
        let mut buffer = self.windowed_buffer(audio);
        self.fft.process(&mut buffer);
        buffer[..self.fft_size / 2 + 1]
            .iter()
            .map(|c| c.norm_sqr())
            .collect()
    }

    fn windowed_buffer(&self, audio: &[f32]) -> Vec<Complex<f32>> {
        let mut buffer: Vec<Complex<f32>> = audio
            .iter()
            .take(self.fft_size)
            .zip(self.window.iter())
            .map(|(&sample, &w)| Complex::new(sample * w, 0.0))
            .collect();
        buffer.resize(self.fft_size, Complex::new(0.0, 0.0));
        buffer
    }
}

/// Pre-compute a Hann window of the given length
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - ((2.0 * std::f32::consts::PI * i as f32) / (size as f32 - 1.0)).cos())
        })
        .collect()
}
