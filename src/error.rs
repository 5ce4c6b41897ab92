// Error types for the session protocol layer
//
// Protocol errors are never fatal: the session handler logs them and drops
// the offending frame. They are typed so the drop reason is visible in logs
// and testable.

use std::fmt;

/// Errors raised while decoding inbound frames or control messages
#[derive(Debug)]
pub enum ProtocolError {
    /// Frame had no type tag byte
    EmptyFrame,
    /// Type tag byte is not a known message kind
    UnknownMessageType(u8),
    /// Audio payload length is not a multiple of 4 bytes
    MisalignedAudioPayload(usize),
    /// Control payload was not valid JSON for any known control message
    InvalidControl(serde_json::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::EmptyFrame => write!(f, "empty frame"),
            ProtocolError::UnknownMessageType(tag) => {
                write!(f, "unknown message type 0x{tag:02x}")
            }
            ProtocolError::MisalignedAudioPayload(len) => {
                write!(f, "audio payload of {len} bytes is not float32-aligned")
            }
            ProtocolError::InvalidControl(err) => {
                write!(f, "invalid control message: {err}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::InvalidControl(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::InvalidControl(err)
    }
}
