//! Protocol errors

use thiserror::Error;

use super::ReplyShape;

/// Errors that can occur while talking to the board
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A parameter was outside the board's documented range; nothing was sent
    #[error("{parameter} = {value} is out of range [{min}, {max}]")]
    Validation {
        /// Parameter name
        parameter: &'static str,
        /// Rejected value
        value: i64,
        /// Smallest accepted value
        min: i64,
        /// Largest accepted value
        max: i64,
    },

    /// The serial device could not be opened or configured
    #[error("Serial device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Reading or writing the port failed
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// The port took only part of a frame
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes the port accepted
        written: usize,
        /// Frame length
        expected: usize,
    },

    /// No reply byte arrived within the response window
    #[error("No response from board")]
    Timeout,

    /// The caller's cancel flag was raised while waiting
    #[error("Exchange cancelled")]
    Cancelled,

    /// The channel has been closed
    #[error("Not connected to board")]
    NotConnected,

    /// The reply grew past the limit without a terminator
    #[error("Buffer overflow: reply exceeded {0} bytes without a terminator")]
    BufferOverflow(usize),

    /// A query got an empty reply
    #[error("Empty reply from board")]
    EmptyReply,

    /// The reply is not valid hex in the expected layout
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// The reply does not fit the command
    #[error("Expected {expected:?} reply, got {reply:?}")]
    UnexpectedReply {
        /// Shape the command answers with
        expected: ReplyShape,
        /// Escaped reply text
        reply: String,
    },

    /// The board answered with its error token; text is kept verbatim
    #[error("Board reported: {0}")]
    BoardError(String),

    /// Other I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Build a range violation for `parameter`
    pub fn out_of_range(parameter: &'static str, value: i64, min: i64, max: i64) -> Self {
        Self::Validation {
            parameter,
            value,
            min,
            max,
        }
    }

    /// True for failures raised before any byte touched the channel
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
