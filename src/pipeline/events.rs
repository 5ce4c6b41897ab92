// Outbound event shapes
//
// Every frame the service sends is one of these, serialized as JSON with a
// "type" tag. Field names and rounding are part of the wire contract with
// the practice UI; do not rename casually.

use serde::{Deserialize, Serialize};

use crate::analysis::grid::GridResolution;
use crate::calibration::CalibrationProfile;

/// Which sound source a calibration recording captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationStep {
    #[default]
    Metronome,
    Guitar,
}

/// Note event kind; the core currently only emits `note`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Note,
    Rest,
    Extra,
}

/// A played note scored against the grid, as stored for the report
#[derive(Debug, Clone, Serialize)]
pub struct NoteEvent {
    #[serde(rename = "time")]
    pub time_seconds: f64,
    pub nearest_grid_time: f64,
    pub deviation_ms: f64,
    pub event_type: NoteKind,
    /// Reserved; the core never sets a pitch
    pub pitch: Option<String>,
    pub bar: i64,
    pub beat_position: f64,
}

/// Payload of a `calibration_result` event
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CalibrationOutcome {
    Profile {
        step: Option<CalibrationStep>,
        profile: CalibrationProfile,
    },
    Error {
        step: Option<CalibrationStep>,
        error: String,
    },
}

/// Per-note timing statistics of a finished session
#[derive(Debug, Clone, Serialize)]
pub struct NoteStats {
    pub total_notes: usize,
    pub mean_absolute_deviation_ms: f64,
    pub mean_signed_deviation_ms: f64,
    pub std_deviation_ms: f64,
    pub median_deviation_ms: f64,
    pub worst_deviation_ms: f64,
    pub worst_deviation_position: String,
    pub accuracy_percent: f64,
}

/// Metronome-consistency statistics, or an error entry below 3 clicks
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MetronomeStats {
    Insufficient {
        total_clicks: usize,
        error: String,
    },
    Consistency {
        total_clicks: usize,
        expected_interval_ms: f64,
        jitter_ms: f64,
        mean_error_ms: f64,
        max_error_ms: f64,
        drift_ms_per_beat: f64,
        tight_percent: f64,
        ok_percent: f64,
    },
}

/// Successful session report payload
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub bpm: f64,
    pub grid_resolution: GridResolution,
    pub total_bars: i64,
    pub events: Vec<NoteEvent>,
    pub click_times: Vec<f64>,
    pub stats: NoteStats,
    pub metronome_stats: MetronomeStats,
}

/// Body of a `session_report` event: full summary or an error shape
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReportBody {
    Error { error: String },
    Complete(Box<SessionSummary>),
}

impl ReportBody {
    pub fn error(message: impl Into<String>) -> Self {
        ReportBody::Error {
            error: message.into(),
        }
    }
}

/// Every event the service emits, tagged for the wire
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Started,
    CalibrationStarted {
        step: CalibrationStep,
    },
    CalibrationResult(CalibrationOutcome),
    ClickDetected {
        time: f64,
        click_count: usize,
        total_onsets: usize,
    },
    GridEstablished {
        bpm: f64,
        reference_time: f64,
    },
    NoteEvent {
        time: f64,
        deviation_ms: f64,
        bar: i64,
        beat_position: f64,
        is_on_time: bool,
    },
    SessionReport(ReportBody),
}
