// Session handler - the protocol state machine behind one connection
//
// Interprets inbound frames, routes audio to the calibration staging buffer
// or the analysis pipeline, and collects the outbound events each frame
// produced. The handler is synchronous and transport-agnostic: the server
// module feeds it WebSocket messages, the tests feed it byte slices.
//
// Protocol errors (bad tags, misaligned audio, unknown controls) are logged
// and dropped; they never end the session. Exactly one session_report ends
// a session unless the peer disconnects first.

pub mod protocol;

use crate::calibration::extract_profile;
use crate::pipeline::events::{CalibrationOutcome, CalibrationStep, OutboundEvent, ReportBody};
use crate::pipeline::AudioPipeline;

use protocol::{ControlMessage, InboundFrame, StartParams};

/// Audio staged while a calibration recording is in progress
struct CalibrationCapture {
    step: CalibrationStep,
    sample_rate: u32,
    buffer: Vec<f32>,
}

/// Result of feeding one inbound frame
#[derive(Debug, Default)]
pub struct SessionTurn {
    /// Events to send back, in order
    pub events: Vec<OutboundEvent>,
    /// True once the session is over (report sent); the transport should close
    pub finished: bool,
}

/// Per-connection protocol state machine
#[derive(Default)]
pub struct SessionHandler {
    pipeline: Option<AudioPipeline>,
    calibration: Option<CalibrationCapture>,
    audio_frames: u64,
}

impl SessionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one inbound frame and collect the events it produced
    pub fn handle_frame(&mut self, frame: &[u8]) -> SessionTurn {
        let mut turn = SessionTurn::default();
        match protocol::decode_frame(frame) {
            Ok(InboundFrame::Control(payload)) => self.handle_control(payload, &mut turn),
            Ok(InboundFrame::Audio(payload)) => self.handle_audio(payload, &mut turn),
            Err(err) => log::warn!("[Session] dropping frame: {err}"),
        }
        turn
    }

    fn handle_control(&mut self, payload: &[u8], turn: &mut SessionTurn) {
        let message = match protocol::parse_control(payload) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("[Session] ignoring control: {err}");
                return;
            }
        };
        log::info!("[Session] control: {message:?}");

        match message {
            ControlMessage::Start(params) => self.start_session(params, turn),
            ControlMessage::Stop => self.stop_session(turn),
            ControlMessage::Calibrate(params) => {
                self.calibration = Some(CalibrationCapture {
                    step: params.step,
                    sample_rate: params.sample_rate,
                    buffer: Vec::new(),
                });
                self.audio_frames = 0;
                turn.events
                    .push(OutboundEvent::CalibrationStarted { step: params.step });
            }
            ControlMessage::StopCalibration => self.finish_calibration(turn),
        }
    }

    fn start_session(&mut self, params: StartParams, turn: &mut SessionTurn) {
        self.pipeline = Some(AudioPipeline::new(
            params.grid,
            params.sample_rate,
            params.threshold,
            params.calibration,
        ));
        self.audio_frames = 0;
        turn.events.push(OutboundEvent::Started);
    }

    fn stop_session(&mut self, turn: &mut SessionTurn) {
        match self.pipeline.as_mut() {
            Some(pipeline) => {
                log::info!(
                    "[Session] stop: {} audio frames, {} samples buffered",
                    self.audio_frames,
                    pipeline.buffered_samples()
                );
                turn.events.push(pipeline.generate_report());
            }
            None => {
                turn.events
                    .push(OutboundEvent::SessionReport(ReportBody::error(
                        "No active session",
                    )));
            }
        }
        turn.finished = true;
    }

    fn finish_calibration(&mut self, turn: &mut SessionTurn) {
        let capture = self.calibration.take();
        let outcome = match capture {
            Some(capture) if !capture.buffer.is_empty() => {
                let profile = extract_profile(&capture.buffer, capture.sample_rate);
                if profile.onset_count == 0 {
                    CalibrationOutcome::Error {
                        step: Some(capture.step),
                        error: "No onsets detected in calibration recording".into(),
                    }
                } else {
                    CalibrationOutcome::Profile {
                        step: Some(capture.step),
                        profile,
                    }
                }
            }
            Some(capture) => CalibrationOutcome::Error {
                step: Some(capture.step),
                error: "No audio recorded during calibration".into(),
            },
            None => CalibrationOutcome::Error {
                step: None,
                error: "No audio recorded during calibration".into(),
            },
        };
        turn.events.push(OutboundEvent::CalibrationResult(outcome));
    }

    fn handle_audio(&mut self, payload: &[u8], turn: &mut SessionTurn) {
        self.audio_frames += 1;
        let samples = match protocol::decode_samples(payload) {
            Ok(samples) => samples,
            Err(err) => {
                // Misaligned data is skipped without touching any state
                log::warn!("[Session] {err}");
                return;
            }
        };

        if let Some(capture) = self.calibration.as_mut() {
            capture.buffer.extend_from_slice(&samples);
            if self.audio_frames <= 3 || self.audio_frames % 100 == 0 {
                log::debug!(
                    "[Session] calibration audio #{}: {:.1}s buffered",
                    self.audio_frames,
                    capture.buffer.len() as f64 / capture.sample_rate as f64
                );
            }
        } else if let Some(pipeline) = self.pipeline.as_mut() {
            if self.audio_frames <= 3 || self.audio_frames % 100 == 0 {
                log::debug!(
                    "[Session] audio #{}: {} samples",
                    self.audio_frames,
                    samples.len()
                );
            }
            turn.events.extend(pipeline.process_audio(&samples));
        }
        // Audio before start (and outside calibration) is dropped
    }
}
