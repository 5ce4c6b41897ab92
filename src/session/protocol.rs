// Wire protocol - inbound frame decoding and control messages
//
// Inbound frames are length-delimited by the transport; the first byte is a
// type tag:
//   0x00 + JSON  -> control message (start / stop / calibrate / stop_calibration)
//   0x01 + PCM   -> little-endian float32 audio samples
// Outbound frames are JSON text (see pipeline::events::OutboundEvent).

use serde::Deserialize;

use crate::analysis::grid::GridResolution;
use crate::calibration::CalibrationSet;
use crate::error::ProtocolError;
use crate::pipeline::events::CalibrationStep;

/// Type tag for control frames
pub const MSG_CONTROL: u8 = 0x00;

/// Type tag for audio frames
pub const MSG_AUDIO: u8 = 0x01;

fn default_sample_rate() -> u32 {
    44100
}

fn default_threshold_ms() -> f64 {
    30.0
}

/// Parameters of the `start` control; missing fields take their defaults
#[derive(Debug, Clone, Deserialize)]
pub struct StartParams {
    #[serde(default)]
    pub grid: GridResolution,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_threshold_ms")]
    pub threshold: f64,
    #[serde(default)]
    pub calibration: Option<CalibrationSet>,
}

impl Default for StartParams {
    fn default() -> Self {
        Self {
            grid: GridResolution::default(),
            sample_rate: default_sample_rate(),
            threshold: default_threshold_ms(),
            calibration: None,
        }
    }
}

/// Parameters of the `calibrate` control
#[derive(Debug, Clone, Deserialize)]
pub struct CalibrateParams {
    #[serde(default)]
    pub step: CalibrationStep,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

/// All recognized control messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Start(StartParams),
    Stop,
    Calibrate(CalibrateParams),
    StopCalibration,
}

/// A decoded inbound frame, borrowing its payload
#[derive(Debug)]
pub enum InboundFrame<'a> {
    Control(&'a [u8]),
    Audio(&'a [u8]),
}

/// Split a frame into its type tag and payload
pub fn decode_frame(frame: &[u8]) -> Result<InboundFrame<'_>, ProtocolError> {
    let (&tag, payload) = frame.split_first().ok_or(ProtocolError::EmptyFrame)?;
    match tag {
        MSG_CONTROL => Ok(InboundFrame::Control(payload)),
        MSG_AUDIO => Ok(InboundFrame::Audio(payload)),
        other => Err(ProtocolError::UnknownMessageType(other)),
    }
}

/// Parse a control payload as JSON
pub fn parse_control(payload: &[u8]) -> Result<ControlMessage, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Decode an audio payload as little-endian float32 samples
///
/// Misaligned payloads (length not a multiple of 4) are a protocol error;
/// the session layer drops them silently.
pub fn decode_samples(payload: &[u8]) -> Result<Vec<f32>, ProtocolError> {
    if payload.len() % 4 != 0 {
        return Err(ProtocolError::MisalignedAudioPayload(payload.len()));
    }
    Ok(payload
        .chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frame_tags() {
        assert!(matches!(
            decode_frame(&[0x00, b'{']),
            Ok(InboundFrame::Control(payload)) if payload == [b'{']
        ));
        assert!(matches!(
            decode_frame(&[0x01, 1, 2, 3, 4]),
            Ok(InboundFrame::Audio(payload)) if payload.len() == 4
        ));
        assert!(matches!(
            decode_frame(&[]),
            Err(ProtocolError::EmptyFrame)
        ));
        assert!(matches!(
            decode_frame(&[0x07, 0, 0]),
            Err(ProtocolError::UnknownMessageType(0x07))
        ));
    }

    #[test]
    fn test_start_defaults() {
        let msg = parse_control(br#"{"type": "start"}"#).unwrap();
        match msg {
            ControlMessage::Start(params) => {
                assert_eq!(params.grid, GridResolution::Eighth);
                assert_eq!(params.sample_rate, 44100);
                assert!((params.threshold - 30.0).abs() < 1e-12);
                assert!(params.calibration.is_none());
            }
            other => panic!("expected start, got {other:?}"),
        }
    }

    #[test]
    fn test_start_with_explicit_fields() {
        let msg = parse_control(
            br#"{"type": "start", "grid": "16th", "sample_rate": 48000, "threshold": 25.0}"#,
        )
        .unwrap();
        match msg {
            ControlMessage::Start(params) => {
                assert_eq!(params.grid, GridResolution::Sixteenth);
                assert_eq!(params.sample_rate, 48000);
                assert!((params.threshold - 25.0).abs() < 1e-12);
            }
            other => panic!("expected start, got {other:?}"),
        }
    }

    #[test]
    fn test_calibrate_defaults_to_metronome() {
        let msg = parse_control(br#"{"type": "calibrate"}"#).unwrap();
        match msg {
            ControlMessage::Calibrate(params) => {
                assert_eq!(params.step, CalibrationStep::Metronome);
                assert_eq!(params.sample_rate, 44100);
            }
            other => panic!("expected calibrate, got {other:?}"),
        }

        let msg = parse_control(br#"{"type": "calibrate", "step": "guitar"}"#).unwrap();
        match msg {
            ControlMessage::Calibrate(params) => {
                assert_eq!(params.step, CalibrationStep::Guitar);
            }
            other => panic!("expected calibrate, got {other:?}"),
        }
    }

    #[test]
    fn test_stop_variants() {
        assert!(matches!(
            parse_control(br#"{"type": "stop"}"#).unwrap(),
            ControlMessage::Stop
        ));
        assert!(matches!(
            parse_control(br#"{"type": "stop_calibration"}"#).unwrap(),
            ControlMessage::StopCalibration
        ));
    }

    #[test]
    fn test_unknown_control_is_an_error() {
        assert!(parse_control(br#"{"type": "reboot"}"#).is_err());
        assert!(parse_control(b"not json").is_err());
    }

    #[test]
    fn test_decode_samples_little_endian() {
        let mut payload = Vec::new();
        for value in [0.5f32, -1.0, 0.25] {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        let samples = decode_samples(&payload).unwrap();
        assert_eq!(samples, vec![0.5, -1.0, 0.25]);
    }

    #[test]
    fn test_misaligned_payload_rejected() {
        assert!(matches!(
            decode_samples(&[0, 0, 0, 0, 0]),
            Err(ProtocolError::MisalignedAudioPayload(5))
        ));
        assert!(decode_samples(&[]).unwrap().is_empty());
    }
}
