//! Protocol commands
//!
//! Defines the command vocabulary understood by the Eddie firmware.

use super::ReplyShape;

/// Firmware command tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Firmware version as 16 bits ("VER")
    Version,

    /// Per-wheel power, signed 8 bits each ("GO")
    DrivePower,

    /// Per-wheel speed, signed 16 bits each ("GOSPD")
    DriveSpeed,

    /// Travel a distance at a speed ("TRVL")
    DriveDistance,

    /// Gradual slow down to stop within a distance ("STOP")
    StopDistance,

    /// Rotate in place by degrees at a speed ("TURN")
    Rotate,

    /// Current per-wheel speed ("SPD")
    GetSpeed,

    /// Heading relative to start or last reset ("HEAD")
    GetHeading,

    /// Left and right encoder ticks ("DIST")
    GetDistance,

    /// Zero the encoder tick registers ("RST")
    ResetEncoders,

    /// Velocity ramping value for the drive system ("ACC")
    SetRamp,

    /// ADC channels as 12-bit words ("ADC")
    GetAdc,

    /// Ping sensors as 12-bit words ("PING")
    GetPing,

    /// Set GPIO pins to output by 20-bit mask ("OUT")
    GpioOutput,

    /// Set GPIO pins to input by 20-bit mask ("IN")
    GpioInput,

    /// Drive GPIO output pins high by 20-bit mask ("HIGH")
    GpioHigh,

    /// Drive GPIO output pins low by 20-bit mask ("LOW")
    GpioLow,

    /// High/low state of all GPIO pins as 20 bits ("READ")
    GpioRead,
}

impl Opcode {
    /// Every opcode, in firmware documentation order
    pub const ALL: [Opcode; 18] = [
        Opcode::Version,
        Opcode::GpioOutput,
        Opcode::GpioInput,
        Opcode::GpioHigh,
        Opcode::GpioLow,
        Opcode::GpioRead,
        Opcode::GetAdc,
        Opcode::GetPing,
        Opcode::DrivePower,
        Opcode::DriveSpeed,
        Opcode::DriveDistance,
        Opcode::StopDistance,
        Opcode::Rotate,
        Opcode::GetSpeed,
        Opcode::GetHeading,
        Opcode::GetDistance,
        Opcode::ResetEncoders,
        Opcode::SetRamp,
    ];

    /// ASCII token sent on the wire
    pub fn token(&self) -> &'static str {
        match self {
            Opcode::Version => "VER",
            Opcode::DrivePower => "GO",
            Opcode::DriveSpeed => "GOSPD",
            Opcode::DriveDistance => "TRVL",
            Opcode::StopDistance => "STOP",
            Opcode::Rotate => "TURN",
            Opcode::GetSpeed => "SPD",
            Opcode::GetHeading => "HEAD",
            Opcode::GetDistance => "DIST",
            Opcode::ResetEncoders => "RST",
            Opcode::SetRamp => "ACC",
            Opcode::GetAdc => "ADC",
            Opcode::GetPing => "PING",
            Opcode::GpioOutput => "OUT",
            Opcode::GpioInput => "IN",
            Opcode::GpioHigh => "HIGH",
            Opcode::GpioLow => "LOW",
            Opcode::GpioRead => "READ",
        }
    }

    /// Look up an opcode by its wire token
    pub fn from_token(token: &str) -> Option<Opcode> {
        Self::ALL.iter().copied().find(|op| op.token() == token)
    }

    /// Number of parameters the firmware expects after the token
    pub fn arity(&self) -> usize {
        match self {
            Opcode::DrivePower | Opcode::DriveSpeed | Opcode::DriveDistance | Opcode::Rotate => 2,
            Opcode::StopDistance
            | Opcode::SetRamp
            | Opcode::GpioOutput
            | Opcode::GpioInput
            | Opcode::GpioHigh
            | Opcode::GpioLow => 1,
            _ => 0,
        }
    }

    /// Reply shape the firmware answers this opcode with
    pub fn reply_shape(&self) -> ReplyShape {
        match self {
            Opcode::Version | Opcode::GetHeading | Opcode::GpioRead => ReplyShape::Scalar,
            Opcode::GetDistance => ReplyShape::Pair { width: 8 },
            Opcode::GetSpeed => ReplyShape::Pair { width: 4 },
            Opcode::GetAdc | Opcode::GetPing => ReplyShape::Series,
            _ => ReplyShape::Ack,
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// A command ready for encoding: opcode plus zero, one or two parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: Opcode,
    params: Vec<i32>,
}

impl Command {
    /// Command without parameters
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            params: Vec::new(),
        }
    }

    /// Command with a single parameter
    pub fn with_param(opcode: Opcode, value: i32) -> Self {
        Self {
            opcode,
            params: vec![value],
        }
    }

    /// Command with two parameters
    pub fn with_params(opcode: Opcode, first: i32, second: i32) -> Self {
        Self {
            opcode,
            params: vec![first, second],
        }
    }

    /// Command token
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Parameters in wire order
    pub fn params(&self) -> &[i32] {
        &self.params
    }

    /// Reply shape expected for this command
    pub fn reply_shape(&self) -> ReplyShape {
        self.opcode.reply_shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_round_trip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_token(op.token()), Some(op));
        }
        assert_eq!(Opcode::from_token("NOPE"), None);
    }

    #[test]
    fn test_reply_shapes() {
        assert_eq!(Opcode::DrivePower.reply_shape(), ReplyShape::Ack);
        assert_eq!(Opcode::GetHeading.reply_shape(), ReplyShape::Scalar);
        assert_eq!(
            Opcode::GetDistance.reply_shape(),
            ReplyShape::Pair { width: 8 }
        );
        assert_eq!(Opcode::GetSpeed.reply_shape(), ReplyShape::Pair { width: 4 });
        assert_eq!(Opcode::GetPing.reply_shape(), ReplyShape::Series);
    }

    #[test]
    fn test_command_params() {
        let cmd = Command::with_params(Opcode::Rotate, 90, 20);
        assert_eq!(cmd.opcode(), Opcode::Rotate);
        assert_eq!(cmd.params(), &[90, 20]);
        assert_eq!(cmd.params().len(), cmd.opcode().arity());
        assert!(Command::new(Opcode::GetHeading).params().is_empty());
    }
}
