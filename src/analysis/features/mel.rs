// Mel module - mel filterbank and cepstral transform
//
// MFCCs are computed the classical way: power spectrum, triangular mel
// filterbank (HTK mel scale), log energies, then an orthonormal type-II DCT.
// The naive DCT is fine at 40 mel bands.

/// Number of triangular mel bands
pub const N_MELS: usize = 40;

/// Number of cepstral coefficients kept
pub const N_MFCC: usize = 13;

/// Floor added to band energies before the log
const LOG_FLOOR: f64 = 1e-10;

fn hz_to_mel(f: f64) -> f64 {
    2595.0 * (1.0 + f / 700.0).log10()
}

fn mel_to_hz(m: f64) -> f64 {
    700.0 * (10.0f64.powf(m / 2595.0) - 1.0)
}

/// Triangular mel filterbank: `n_mels` rows over `n_fft / 2 + 1` bins
pub struct MelFilterbank {
    filters: Vec<Vec<f32>>,
}

impl MelFilterbank {
    pub fn new(n_mels: usize, n_fft: usize, sample_rate: u32) -> Self {
        let n_bins = n_fft / 2 + 1;
        let mel_max = hz_to_mel(sample_rate as f64 / 2.0);

        // n_mels + 2 equally spaced points in mel space, mapped back to bins
        let bin_points: Vec<f64> = (0..n_mels + 2)
            .map(|i| {
                let mel = mel_max * i as f64 / (n_mels + 1) as f64;
                mel_to_hz(mel) * n_fft as f64 / sample_rate as f64
            })
            .collect();

        let mut filters = Vec::with_capacity(n_mels);
        for m in 0..n_mels {
            let (left, center, right) = (bin_points[m], bin_points[m + 1], bin_points[m + 2]);
            let mut filter = vec![0.0f32; n_bins];
            for (bin, value) in filter.iter_mut().enumerate() {
                let b = bin as f64;
                if b >= left && b <= center {
                    *value = ((b - left) / (center - left + 1e-10)) as f32;
                } else if b > center && b <= right {
                    *value = ((right - b) / (right - center + 1e-10)) as f32;
                }
            }
            filters.push(filter);
        }

        Self { filters }
    }

    /// Log mel band energies of a power spectrum
    pub fn log_energies(&self, power_spectrum: &[f32]) -> Vec<f64> {
        self.filters
            .iter()
            .map(|filter| {
                let energy: f64 = filter
                    .iter()
                    .zip(power_spectrum.iter())
                    .map(|(&f, &p)| f as f64 * p as f64)
                    .sum();
                (energy + LOG_FLOOR).ln()
            })
            .collect()
    }
}

/// Orthonormal type-II DCT, truncated to `n_out` coefficients
pub fn dct_ii(input: &[f64], n_out: usize) -> Vec<f64> {
    let n = input.len();
    let scale0 = (1.0 / n as f64).sqrt();
    let scale = (2.0 / n as f64).sqrt();

    (0..n_out.min(n))
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x * (std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0)
                        / (2.0 * n as f64))
                        .cos()
                })
                .sum();
            if k == 0 {
                scale0 * sum
            } else {
                scale * sum
            }
        })
        .collect()
}
