//! Serial Protocol Communication
//!
//! Implements the Eddie control board's ASCII command protocol.
//!
//! Requests are an opcode token followed by space-delimited lowercase hex
//! parameters and a carriage return. Replies are terminator-delimited and
//! carry no type tag, so callers name the reply shape they expect.

pub mod channel;
pub mod codec;
pub mod commands;
mod error;
pub mod executor;
pub mod serial;

pub use channel::{ExchangeCounters, ResponseWindow, SerialChannel, SerialIo};
pub use codec::{decode, encode, DecodedReply, ReplyShape};
pub use commands::{Command, Opcode};
pub use error::ProtocolError;
pub use executor::{CancelFlag, CommandExecutor};
pub use serial::{configure_port, open_port};

/// Default serial device
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Default baud rate for board communication
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Delay after configuring the port, letting the board's UART settle
pub const DEFAULT_SETTLE_MS: u64 = 100;

/// Failed reads tolerated before the first reply byte arrives
pub const DEFAULT_FIRST_BYTE_ATTEMPTS: u32 = 80;

/// Sleep between empty reads in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

/// Frame terminator (carriage return)
pub const PACKET_TERMINATOR: u8 = b'\r';

/// Parameter delimiter (space)
pub const PARAMETER_DELIMITER: u8 = b' ';

/// Reply prefix the firmware uses to report a problem
pub const ERROR_TOKEN: &[u8; 5] = b"ERROR";
