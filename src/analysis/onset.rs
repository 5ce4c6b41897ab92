// OnsetDetector - adaptive energy-based onset detection for streaming audio
//
// Detects the start of sound events on a continuous sample stream with only
// causal information. The detector slides a 512-sample frame (256-sample hop)
// over the stream and tracks three scalar states:
//
// 1. smoothed_rms: EMA of frame RMS (alpha = 0.3)
// 2. mean_rms: asymmetric-EMA baseline; it rises slowly during loud signals
//    (alpha = 0.01) and falls faster after energy fades (alpha = 0.05), so a
//    loud sustained note does not permanently desensitize the detector
// 3. above_threshold: arming gate; an onset is emitted only on the rising
//    edge, and the gate re-arms once energy drops to 40% of the threshold
//    (hysteresis against attack/sustain double-triggers)
//
// Frames are phased on absolute sample positions: leftover samples are
// carried into the next chunk, so splitting the stream at arbitrary chunk
// boundaries yields identical onset times.

/// Analysis frame length in samples
const FRAME_SIZE: usize = 512;

/// Hop between successive frames in samples
const HOP_SIZE: usize = 256;

/// EMA coefficient for the smoothed RMS envelope
const ALPHA_SMOOTH: f64 = 0.3;

/// Baseline EMA coefficient while energy is above the baseline
const ALPHA_MEAN_RISE: f64 = 0.01;

/// Baseline EMA coefficient while energy is below the baseline
const ALPHA_MEAN_FALL: f64 = 0.05;

/// Threshold as a multiple of the baseline RMS
const THRESHOLD_RATIO: f64 = 1.5;

/// Absolute threshold floor
const MIN_THRESHOLD: f64 = 0.001;

/// Fraction of the threshold the envelope must fall below to re-arm
const HYSTERESIS_RATIO: f64 = 0.4;

/// Log detector state every N frames
const LOG_INTERVAL: u64 = 200;

/// Streaming onset detector with adaptive thresholding
pub struct OnsetDetector {
    sample_rate: u32,
    min_interval_seconds: f64,
    last_onset_time: Option<f64>,

    /// Samples not yet consumed by a full frame, carried across chunks
    carry: Vec<f32>,
    /// Absolute sample index of carry[0]
    carry_start: u64,

    smoothed_rms: f64,
    mean_rms: f64,
    above_threshold: bool,

    // Diagnostics
    peak_rms: f64,
    frame_count: u64,
}

impl OnsetDetector {
    /// Create a detector with the default 50 ms minimum onset interval
    pub fn new(sample_rate: u32) -> Self {
        Self::with_min_interval(sample_rate, 0.05)
    }

    /// Create a detector with an explicit minimum onset interval
    ///
    /// # Arguments
    /// * `sample_rate` - Audio sample rate in Hz (e.g. 44100)
    /// * `min_interval_seconds` - Minimum spacing between emitted onsets
    pub fn with_min_interval(sample_rate: u32, min_interval_seconds: f64) -> Self {
        Self {
            sample_rate,
            min_interval_seconds,
            last_onset_time: None,
            carry: Vec::with_capacity(FRAME_SIZE * 4),
            carry_start: 0,
            smoothed_rms: 0.0,
            mean_rms: 0.0,
            above_threshold: false,
            peak_rms: 0.0,
            frame_count: 0,
        }
    }

    /// Process an audio chunk and return detected onset times in seconds
    ///
    /// Times are measured from the start of the stream (absolute sample
    /// index / sample rate) and returned in sample order. Non-finite samples
    /// are treated as zero.
    pub fn process_chunk(&mut self, chunk: &[f32]) -> Vec<f64> {
        self.carry
            .extend(chunk.iter().map(|&s| if s.is_finite() { s } else { 0.0 }));

        let mut onsets = Vec::new();
        let mut pos = 0;

        while pos + FRAME_SIZE <= self.carry.len() {
            let frame = &self.carry[pos..pos + FRAME_SIZE];
            let rms = frame_rms(frame);

            self.smoothed_rms = ALPHA_SMOOTH * rms + (1.0 - ALPHA_SMOOTH) * self.smoothed_rms;

            let threshold = (self.mean_rms * THRESHOLD_RATIO).max(MIN_THRESHOLD);

            if rms > self.peak_rms {
                self.peak_rms = rms;
            }

            if self.smoothed_rms > threshold {
                if !self.above_threshold {
                    // Rising edge: energy just crossed the threshold
                    self.above_threshold = true;
                    let onset_time =
                        (self.carry_start + pos as u64) as f64 / self.sample_rate as f64;
                    let accepted = match self.last_onset_time {
                        None => true,
                        Some(last) => onset_time - last >= self.min_interval_seconds,
                    };
                    if accepted {
                        onsets.push(onset_time);
                        self.last_onset_time = Some(onset_time);
                    }
                }
            } else if self.smoothed_rms < threshold * HYSTERESIS_RATIO {
                self.above_threshold = false;
            }

            let alpha = if rms > self.mean_rms {
                ALPHA_MEAN_RISE
            } else {
                ALPHA_MEAN_FALL
            };
            self.mean_rms = alpha * rms + (1.0 - alpha) * self.mean_rms;

            self.frame_count += 1;
            if self.frame_count % LOG_INTERVAL == 0 {
                let t = (self.carry_start + pos as u64) as f64 / self.sample_rate as f64;
                log::debug!(
                    "[OnsetDetector] t={:.1}s rms={:.5} smoothed={:.5} mean={:.5} threshold={:.5} peak={:.5}",
                    t,
                    rms,
                    self.smoothed_rms,
                    self.mean_rms,
                    threshold,
                    self.peak_rms
                );
            }

            pos += HOP_SIZE;
        }

        self.carry.drain(..pos);
        self.carry_start += pos as u64;

        onsets
    }

    /// Restore the initial state (stream position, envelopes, gate)
    pub fn reset(&mut self) {
        self.last_onset_time = None;
        self.carry.clear();
        self.carry_start = 0;
        self.smoothed_rms = 0.0;
        self.mean_rms = 0.0;
        self.above_threshold = false;
        self.peak_rms = 0.0;
        self.frame_count = 0;
    }
}

/// RMS of a frame with f64 accumulation
fn frame_rms(frame: &[f32]) -> f64 {
    let sum_squares: f64 = frame.iter().map(|&s| s as f64 * s as f64).sum();
    (sum_squares / frame.len() as f64).sqrt()
}
