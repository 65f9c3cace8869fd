//! One-shot board operations from the command line

use clap::Subcommand;
use eddie_core::board::Board;
use eddie_core::protocol::{ProtocolError, SerialIo};
use serde_json::{json, Value};

/// Operations available from the command line
#[derive(Debug, Clone, Subcommand)]
pub enum Operation {
    /// Firmware version
    Version,
    /// Heading relative to start or last encoder reset
    Heading,
    /// Left and right encoder ticks
    Distance,
    /// Left and right wheel speed
    Speed,
    /// Ping sensor array
    Ping,
    /// ADC array with IR voltages and battery level
    Adc,
    /// Set motor power per wheel, -127 to 127
    DrivePower {
        #[arg(allow_negative_numbers = true)]
        left: i32,
        #[arg(allow_negative_numbers = true)]
        right: i32,
    },
    /// Set wheel speed, -32767 to 32767
    DriveSpeed {
        #[arg(allow_negative_numbers = true)]
        left: i32,
        #[arg(allow_negative_numbers = true)]
        right: i32,
    },
    /// Travel a distance at a speed
    DriveDistance {
        #[arg(allow_negative_numbers = true)]
        distance: i32,
        speed: i32,
    },
    /// Rotate in place by degrees at a speed
    Rotate {
        #[arg(allow_negative_numbers = true)]
        angle: i32,
        speed: i32,
    },
    /// Slow down and stop within a distance
    StopAt { distance: i32 },
    /// Set the velocity ramping value
    Ramp { rate: i32 },
    /// Zero the encoder counters
    ResetEncoders,
    /// Resynchronise the board's receive buffer
    Flush,
}

impl Operation {
    /// True for operations that leave the wheels moving
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Operation::DrivePower { .. }
                | Operation::DriveSpeed { .. }
                | Operation::DriveDistance { .. }
                | Operation::Rotate { .. }
        )
    }

    /// Run the operation against the board and describe the result as JSON
    pub fn execute<T: SerialIo>(&self, board: &Board<T>) -> Result<Value, ProtocolError> {
        let value = match self {
            Operation::Version => json!({ "version": format!("{:04X}", board.firmware_version()?) }),
            Operation::Heading => json!({ "heading": board.get_heading()? }),
            Operation::Distance => {
                let (left, right) = board.get_distance()?;
                json!({ "left": left, "right": right })
            }
            Operation::Speed => {
                let (left, right) = board.get_speed()?;
                json!({ "left": left, "right": right })
            }
            Operation::Ping => serde_json::to_value(board.get_ping_array()?)
                .map_err(|e| ProtocolError::MalformedReply(e.to_string()))?,
            Operation::Adc => {
                let adc = board.get_adc_array()?;
                let summary = eddie_core::sensors::interpret_adc(&adc);
                json!({ "adc": adc, "summary": summary })
            }
            Operation::DrivePower { left, right } => {
                board.drive_with_power(*left, *right)?;
                ok()
            }
            Operation::DriveSpeed { left, right } => {
                board.drive_with_speed(*left, *right)?;
                ok()
            }
            Operation::DriveDistance { distance, speed } => {
                board.drive_with_distance(*distance, *speed)?;
                ok()
            }
            Operation::Rotate { angle, speed } => {
                board.rotate(*angle, *speed)?;
                ok()
            }
            Operation::StopAt { distance } => {
                board.stop_at_distance(*distance)?;
                ok()
            }
            Operation::Ramp { rate } => {
                board.set_ramp_rate(*rate)?;
                ok()
            }
            Operation::ResetEncoders => {
                board.reset_encoders()?;
                ok()
            }
            Operation::Flush => {
                board.flush()?;
                ok()
            }
        };
        Ok(value)
    }
}

fn ok() -> Value {
    json!({ "success": true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use eddie_core::demo::SimulatedBoard;
    use eddie_core::protocol::ResponseWindow;

    fn board() -> Board<SimulatedBoard> {
        Board::with_port(SimulatedBoard::with_seed(9), ResponseWindow::default())
    }

    #[test]
    fn test_drive_then_distance() {
        let board = board();
        assert_eq!(
            Operation::DrivePower { left: 127, right: 0 }.execute(&board).unwrap(),
            json!({ "success": true })
        );
        let value = Operation::Distance.execute(&board).unwrap();
        assert_eq!(value, json!({ "left": 16, "right": 0 }));
    }

    #[test]
    fn test_drive_keeps_wheels_moving() {
        let board = board();
        let drive = Operation::DrivePower { left: 60, right: -60 };
        assert!(drive.is_motion());
        drive.execute(&board).unwrap();
        let value = Operation::Speed.execute(&board).unwrap();
        assert_eq!(value, json!({ "left": 240, "right": -240 }));
    }

    #[test]
    fn test_queries_are_not_motion() {
        assert!(!Operation::Distance.is_motion());
        assert!(!Operation::StopAt { distance: 0 }.is_motion());
        assert!(!Operation::Flush.is_motion());
        assert!(Operation::Rotate { angle: 90, speed: 10 }.is_motion());
    }

    #[test]
    fn test_version_is_hex() {
        let value = Operation::Version.execute(&board()).unwrap();
        assert_eq!(value, json!({ "version": "0104" }));
    }

    #[test]
    fn test_validation_error_propagates() {
        let err = Operation::Ramp { rate: 1000 }.execute(&board()).unwrap_err();
        assert!(err.is_local());
    }
}
