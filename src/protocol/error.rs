use std::fmt;

/// Malformed or desynchronised frame. The connection that produced it must
/// be discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes arrived than the header (or the header's length) promised
    Truncated { expected: u64, actual: u64 },
    NegativeLength(i64),
    FrameTooLarge(u64),
    UnexpectedCommand(u8),
    BodyLength { command: u8, expected: usize, actual: usize },
    /// Reply body was shorter than its fixed fields
    BodyTooShort { command: u8, minimum: usize, actual: usize },
    /// Listing reply that does not split into whole records
    RecordLength { command: u8, record: usize, actual: usize },
    InvalidText(&'static str),
    InvalidPort(u64),
    UnexpectedBody(&'static str),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Truncated { expected, actual } =>
                write!(f, "truncated frame: expected {} bytes, got {}", expected, actual),
            FrameError::NegativeLength(len) =>
                write!(f, "negative body length {}", len),
            FrameError::FrameTooLarge(len) =>
                write!(f, "frame too large: {}", len),
            FrameError::UnexpectedCommand(cmd) =>
                write!(f, "unexpected reply command {}", cmd),
            FrameError::BodyLength { command, expected, actual } =>
                write!(f, "reply to command {} has body of {} bytes, expected {}", command, actual, expected),
            FrameError::BodyTooShort { command, minimum, actual } =>
                write!(f, "reply to command {} has body of {} bytes, need at least {}", command, actual, minimum),
            FrameError::RecordLength { command, record, actual } =>
                write!(f, "reply to command {} has body of {} bytes, not a multiple of {}", command, actual, record),
            FrameError::InvalidText(field) =>
                write!(f, "field '{}' is not valid utf-8", field),
            FrameError::InvalidPort(port) =>
                write!(f, "invalid port {}", port),
            FrameError::UnexpectedBody(kind) =>
                write!(f, "unexpected {} reply body", kind),
        }
    }
}

impl std::error::Error for FrameError {}
