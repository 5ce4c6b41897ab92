// AudioPipeline - session orchestrator
//
// Owns the session state and glues the DSP components together: every audio
// chunk is appended to the session buffer and run through the streaming
// onset detector; each onset is then either fed to the periodicity search
// (pre-lock) or classified as click vs. played note (post-lock) and scored
// against the beat grid. Classification decisions are irrevocable; the
// final report aggregates what was decided online.
//
// Module organization:
// - events: wire-facing event and report shapes
// - report: note and metronome-consistency statistics
// - mod.rs: the orchestrator itself plus session WAV snapshots

pub mod events;
pub mod report;

use std::path::{Path, PathBuf};

use crate::analysis::features::FeatureExtractor;
use crate::analysis::grid::{round_to, GridConfig, GridResolution};
use crate::analysis::metronome::MetronomeDetector;
use crate::analysis::onset::OnsetDetector;
use crate::calibration::{classify_onset, CalibrationSet, OnsetClass};

use events::{NoteEvent, NoteKind, OutboundEvent, ReportBody, SessionSummary};

/// Streaming session pipeline: detects onsets, finds the metronome by
/// periodicity, and scores played notes against the inferred grid
pub struct AudioPipeline {
    grid_resolution: GridResolution,
    sample_rate: u32,
    timing_threshold_ms: f64,
    calibration: Option<CalibrationSet>,

    audio_buffer: Vec<f32>,
    grid_config: Option<GridConfig>,
    note_events: Vec<NoteEvent>,

    metronome: MetronomeDetector,
    onset_detector: OnsetDetector,
    features: FeatureExtractor,

    total_onset_count: usize,
    sessions_dir: PathBuf,
}

impl AudioPipeline {
    pub fn new(
        grid_resolution: GridResolution,
        sample_rate: u32,
        timing_threshold_ms: f64,
        calibration: Option<CalibrationSet>,
    ) -> Self {
        Self {
            grid_resolution,
            sample_rate,
            timing_threshold_ms,
            calibration,
            audio_buffer: Vec::new(),
            grid_config: None,
            note_events: Vec::new(),
            metronome: MetronomeDetector::new(),
            onset_detector: OnsetDetector::new(sample_rate),
            features: FeatureExtractor::new(sample_rate),
            total_onset_count: 0,
            sessions_dir: PathBuf::from("sessions"),
        }
    }

    /// Override where session WAV snapshots are written
    pub fn with_sessions_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.sessions_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn is_grid_established(&self) -> bool {
        self.metronome.locked()
    }

    pub fn bpm(&self) -> Option<f64> {
        self.metronome.bpm()
    }

    pub fn note_events(&self) -> &[NoteEvent] {
        &self.note_events
    }

    pub fn buffered_samples(&self) -> usize {
        self.audio_buffer.len()
    }

    /// Process an incoming audio chunk and return the events it produced
    pub fn process_audio(&mut self, chunk: &[f32]) -> Vec<OutboundEvent> {
        self.audio_buffer.extend_from_slice(chunk);
        let onsets = self.onset_detector.process_chunk(chunk);

        let mut events = Vec::new();
        for onset_time in onsets {
            self.handle_onset(onset_time, &mut events);
        }
        events
    }

    /// Route a single detected onset through the decision chain
    fn handle_onset(&mut self, onset_time: f64, events: &mut Vec<OutboundEvent>) {
        self.total_onset_count += 1;
        log::debug!(
            "[Pipeline] onset #{} at t={:.3}s (grid_locked={})",
            self.total_onset_count,
            onset_time,
            self.is_grid_established()
        );

        if !self.is_grid_established() {
            // Pre-lock: feed ALL onsets to the periodicity detector
            let just_locked = self.metronome.add_onset(onset_time);
            events.push(OutboundEvent::ClickDetected {
                time: onset_time,
                click_count: self.metronome.click_count(),
                total_onsets: self.metronome.total_onsets(),
            });
            if just_locked {
                if let (Some(bpm), Some(reference)) =
                    (self.metronome.bpm(), self.metronome.reference())
                {
                    self.grid_config =
                        Some(GridConfig::new(bpm, self.grid_resolution, reference));
                    events.push(OutboundEvent::GridEstablished {
                        bpm: round_to(bpm, 1),
                        reference_time: reference,
                    });
                }
            }
            return;
        }

        // Post-lock: classify using both timing and spectral analysis
        let timing_is_click = self.metronome.track_onset(onset_time);
        let spectral_class = self.classify_spectral(onset_time);

        let is_click = match (timing_is_click, spectral_class) {
            (true, Some(OnsetClass::Guitar)) => {
                // Timing says click but the spectrum says guitar; trust the
                // spectrum and undo the click tracking
                self.metronome.untrack_last_click();
                log::debug!(
                    "[Pipeline] spectral override at t={onset_time:.3}s: timing=click, spectral=guitar"
                );
                false
            }
            // Spectrum says click but the timing does not match; trust the
            // timing, which keeps guitar notes near grid lines scored
            (false, Some(OnsetClass::Click)) => false,
            (timing, _) => timing,
        };

        // Rebuild the grid if the detector accepted a refit
        if self.metronome.take_grid_updated() {
            if let (Some(bpm), Some(reference)) =
                (self.metronome.bpm(), self.metronome.reference())
            {
                self.grid_config = Some(GridConfig::new(bpm, self.grid_resolution, reference));
            }
        }

        let Some(grid) = self.grid_config else {
            return;
        };

        if is_click {
            events.push(OutboundEvent::ClickDetected {
                time: onset_time,
                click_count: self.metronome.click_count(),
                total_onsets: self.total_onset_count,
            });
            // When the player is on the beat, the guitar and the click merge
            // into a single onset; emit a note event too so neither is lost
            if self.note_expected_near(onset_time) {
                self.push_note(grid, onset_time, events);
                log::debug!("[Pipeline] coincidence: click+note at t={onset_time:.3}s");
            }
        } else {
            self.push_note(grid, onset_time, events);
        }
    }

    /// Spectral click/guitar vote for one onset; None without calibration
    fn classify_spectral(&self, onset_time: f64) -> Option<OnsetClass> {
        let calibration = self.calibration.as_ref()?;
        let onset_sample = (onset_time * self.sample_rate as f64) as usize;
        Some(classify_onset(
            &self.audio_buffer,
            onset_sample,
            calibration,
            &self.features,
        ))
    }

    /// Score an onset against the grid, record it, and emit a note event
    fn push_note(&mut self, grid: GridConfig, onset_time: f64, events: &mut Vec<OutboundEvent>) {
        let d = grid.compute_deviation(onset_time);
        self.note_events.push(NoteEvent {
            time_seconds: onset_time,
            nearest_grid_time: d.nearest_grid_time,
            deviation_ms: d.deviation_ms,
            event_type: NoteKind::Note,
            pitch: None,
            bar: d.bar,
            beat_position: d.beat_position,
        });
        events.push(OutboundEvent::NoteEvent {
            time: onset_time,
            deviation_ms: d.deviation_ms,
            bar: d.bar,
            beat_position: d.beat_position,
            is_on_time: d.deviation_ms.abs() <= self.timing_threshold_ms,
        });
    }

    /// Should a click-classified onset also count as a played note?
    ///
    /// Only once note events have started arriving (the player is active)
    /// and the last note was heard within two beat periods. Before the first
    /// note event this never fires, so the very first on-beat note of a
    /// session is consumed by the click branch.
    fn note_expected_near(&self, onset_time: f64) -> bool {
        let Some(last_note) = self.note_events.last() else {
            return false;
        };
        let Some(period) = self.metronome.period() else {
            return false;
        };
        onset_time - last_note.time_seconds < period * 2.0
    }

    /// Produce the end-of-session report from the online classifications
    pub fn generate_report(&mut self) -> OutboundEvent {
        self.save_session();

        if self.audio_buffer.is_empty() {
            return OutboundEvent::SessionReport(ReportBody::error("No audio recorded"));
        }

        if !self.is_grid_established() {
            return OutboundEvent::SessionReport(ReportBody::error(format!(
                "No metronome detected - could not establish grid. \
                 Heard {} onsets total, best periodic match: {}/4 needed.",
                self.total_onset_count,
                self.metronome.click_count()
            )));
        }

        if self.note_events.is_empty() {
            return OutboundEvent::SessionReport(ReportBody::error("No guitar notes detected"));
        }

        let stats = report::note_stats(&self.note_events, self.timing_threshold_ms);
        let metronome_stats = report::metronome_stats(&self.metronome);

        OutboundEvent::SessionReport(ReportBody::Complete(Box::new(SessionSummary {
            bpm: round_to(self.metronome.bpm().unwrap_or(0.0), 1),
            grid_resolution: self.grid_resolution,
            total_bars: self.note_events.last().map(|e| e.bar).unwrap_or(0),
            events: self.note_events.clone(),
            click_times: self.metronome.click_times().to_vec(),
            stats,
            metronome_stats,
        })))
    }

    /// Write the raw session audio to a WAV snapshot; failures are logged
    /// and never abort the report
    pub fn save_session(&self) -> Option<PathBuf> {
        if self.audio_buffer.is_empty() {
            return None;
        }
        match self.write_wav() {
            Ok(path) => {
                log::info!(
                    "[Pipeline] session audio saved: {} ({} samples, {:.1}s)",
                    path.display(),
                    self.audio_buffer.len(),
                    self.audio_buffer.len() as f64 / self.sample_rate as f64
                );
                Some(path)
            }
            Err(err) => {
                log::warn!("[Pipeline] failed to save session audio: {err:#}");
                None
            }
        }
    }

    fn write_wav(&self) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.sessions_dir)?;
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = self.sessions_dir.join(format!("session-{timestamp}.wav"));

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for &sample in &self.audio_buffer {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(path)
    }
}
