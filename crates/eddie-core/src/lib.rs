//! # Eddie Core Library
//!
//! Core functionality for driving the Parallax Eddie control board.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The board's ASCII-over-serial wire format (command frames, hex replies)
//! - A serialized, timeout-bounded command/response channel
//! - A typed operation surface for drive, odometry and sensor commands
//! - ADC interpretation (IR sensor voltages, battery level)
//! - A simulated board for demos and tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use eddie_core::{board::Board, config::DriverConfig};
//!
//! let board = Board::open(&DriverConfig::default())?;
//! board.drive_with_power(40, 40)?;
//! let (left, right) = board.get_distance()?;
//! println!("ticks: {left} {right}");
//! board.shutdown();
//! ```

pub mod board;
pub mod config;
pub mod demo;
pub mod protocol;
pub mod sensors;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::board::{ArrayStatus, Board, Relay, SensorArray};
    pub use crate::config::{DriverConfig, ResponseWindowConfig};
    pub use crate::demo::SimulatedBoard;
    pub use crate::protocol::{
        CancelFlag, Command, CommandExecutor, DecodedReply, Opcode, ProtocolError, ReplyShape,
        ResponseWindow, SerialChannel,
    };
    pub use crate::sensors::{interpret_adc, AdcSummary};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
