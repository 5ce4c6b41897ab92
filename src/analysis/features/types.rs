// Feature data structures

/// Spectral features of a single onset window
///
/// Produced by the feature extractor for classification and calibration
/// averaging. A window that is silent or out of bounds yields no features.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFeatures {
    /// Mean MFCC vector across the window's STFT frames (13 coefficients)
    pub mfcc: Vec<f64>,
    /// Mean spectral centroid in Hz
    pub spectral_centroid: f64,
    /// Energy-decay ratio: second-half energy over first-half energy
    pub energy_decay: f64,
}
