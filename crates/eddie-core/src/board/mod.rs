//! Board operations
//!
//! Typed drive, odometry and sensor calls on top of [`CommandExecutor`].
//! Parameters are range-checked before anything is sent; a rejected call
//! never touches the serial line.

pub mod attributes;

use serde::{Serialize, Serializer};
use serialport::SerialPort;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::DriverConfig;
use crate::protocol::{
    open_port, CancelFlag, Command, CommandExecutor, DecodedReply, ExchangeCounters, Opcode,
    ProtocolError, ReplyShape, ResponseWindow, SerialChannel, SerialIo,
};
use attributes::*;

/// Outcome of an array query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayStatus {
    /// Values were decoded
    Success,
    /// The board sent nothing back
    Empty,
    /// The board's error reply, verbatim
    Error(String),
}

impl std::fmt::Display for ArrayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrayStatus::Success => f.write_str("SUCCESS"),
            ArrayStatus::Empty => f.write_str("EMPTY"),
            ArrayStatus::Error(text) => f.write_str(text),
        }
    }
}

impl Serialize for ArrayStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Ping or ADC readings. Only trust `values` when `status` is `Success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorArray {
    /// How the query went
    pub status: ArrayStatus,
    /// One 12-bit reading per sensor
    pub values: Vec<u16>,
}

impl SensorArray {
    fn with_status(status: ArrayStatus) -> Self {
        Self {
            status,
            values: Vec::new(),
        }
    }

    /// True when `values` holds a decoded reading
    pub fn is_success(&self) -> bool {
        self.status == ArrayStatus::Success
    }
}

/// Switchable auxiliary power rails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    /// 3.3V rail
    V3_3,
    /// 5V rail
    V5,
    /// 12V rail
    V12,
}

impl Relay {
    /// GPIO pin switching this relay
    pub fn pin(&self) -> u8 {
        match self {
            Relay::V3_3 => RELAY_33V_PIN_NUMBER,
            Relay::V5 => RELAY_5V_PIN_NUMBER,
            Relay::V12 => RELAY_12V_PIN_NUMBER,
        }
    }

    /// GPIO mask selecting only this relay's pin
    pub fn mask(&self) -> i32 {
        1 << self.pin()
    }
}

/// The Eddie control board
///
/// All methods take `&self`; share the board between threads with an `Arc`.
/// Calls are serialized on the underlying channel.
pub struct Board<T: SerialIo = Box<dyn SerialPort>> {
    executor: CommandExecutor<T>,
    shut_down: AtomicBool,
}

impl Board {
    /// Open the configured serial device
    pub fn open(config: &DriverConfig) -> Result<Self, ProtocolError> {
        let port = open_port(&config.port, config.baud_rate, config.settle())?;
        Ok(Board::with_port(port, config.response_window()))
    }
}

impl<T: SerialIo> Board<T> {
    /// Drive the board through an already open port
    pub fn with_port(port: T, window: ResponseWindow) -> Self {
        Self {
            executor: CommandExecutor::new(SerialChannel::new(port, window)),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Underlying command executor
    pub fn executor(&self) -> &CommandExecutor<T> {
        &self.executor
    }

    /// Traffic statistics since the board was opened
    pub fn counters(&self) -> ExchangeCounters {
        self.executor.counters()
    }

    /// Set the drive system's velocity ramping value
    pub fn set_ramp_rate(&self, rate: i32) -> Result<(), ProtocolError> {
        check_range("rate", rate, 0, RAMP_MAX_RATE)?;
        self.command(Command::with_param(Opcode::SetRamp, rate))
    }

    /// Travel `distance` encoder positions at `speed`
    pub fn drive_with_distance(&self, distance: i32, speed: i32) -> Result<(), ProtocolError> {
        check_range(
            "distance",
            distance,
            TRAVEL_SPEED_MAX_REVERSE,
            TRAVEL_SPEED_MAX_FORWARD,
        )?;
        check_range("speed", speed, 0, TRAVEL_MAX_SPEED)?;
        self.command(Command::with_params(Opcode::DriveDistance, distance, speed))
    }

    /// Set raw motor power for each wheel
    pub fn drive_with_power(&self, left: i32, right: i32) -> Result<(), ProtocolError> {
        check_range("left", left, MOTOR_POWER_MAX_REVERSE, MOTOR_POWER_MAX_FORWARD)?;
        check_range("right", right, MOTOR_POWER_MAX_REVERSE, MOTOR_POWER_MAX_FORWARD)?;
        self.command(Command::with_params(Opcode::DrivePower, left, right))
    }

    /// Set closed-loop speed for each wheel
    pub fn drive_with_speed(&self, left: i32, right: i32) -> Result<(), ProtocolError> {
        check_range(
            "left",
            left,
            TRAVEL_SPEED_MAX_REVERSE,
            TRAVEL_SPEED_MAX_FORWARD,
        )?;
        check_range(
            "right",
            right,
            TRAVEL_SPEED_MAX_REVERSE,
            TRAVEL_SPEED_MAX_FORWARD,
        )?;
        self.command(Command::with_params(Opcode::DriveSpeed, left, right))
    }

    /// Rotate in place by `angle` degrees at `speed`
    pub fn rotate(&self, angle: i32, speed: i32) -> Result<(), ProtocolError> {
        check_range(
            "angle",
            angle,
            TRAVEL_SPEED_MAX_REVERSE,
            TRAVEL_SPEED_MAX_FORWARD,
        )?;
        check_range("speed", speed, 0, TRAVEL_MAX_SPEED)?;
        self.command(Command::with_params(Opcode::Rotate, angle, speed))
    }

    /// Slow down gradually and stop within `distance`
    pub fn stop_at_distance(&self, distance: i32) -> Result<(), ProtocolError> {
        check_range("distance", distance, 0, STOP_MAX_DISTANCE)?;
        self.command(Command::with_param(Opcode::StopDistance, distance))
    }

    /// Zero both encoder counters and the heading
    pub fn reset_encoders(&self) -> Result<(), ProtocolError> {
        self.command(Command::new(Opcode::ResetEncoders))
    }

    /// Left and right encoder ticks
    pub fn get_distance(&self) -> Result<(i32, i32), ProtocolError> {
        match self.query(Command::new(Opcode::GetDistance), &CancelFlag::new())? {
            DecodedReply::Pair(left, right) => Ok((left, right)),
            other => Err(unexpected(Opcode::GetDistance, other)),
        }
    }

    /// Heading relative to start or the last encoder reset
    pub fn get_heading(&self) -> Result<i32, ProtocolError> {
        let value = self.query_scalar(Opcode::GetHeading)?;
        i32::try_from(value)
            .map_err(|_| ProtocolError::MalformedReply(format!("heading {:#x} out of range", value)))
    }

    /// Current left and right wheel speed
    pub fn get_speed(&self) -> Result<(i32, i32), ProtocolError> {
        match self.query(Command::new(Opcode::GetSpeed), &CancelFlag::new())? {
            DecodedReply::Pair(left, right) => Ok((left, right)),
            other => Err(unexpected(Opcode::GetSpeed, other)),
        }
    }

    /// Read every ping sensor
    pub fn get_ping_array(&self) -> Result<SensorArray, ProtocolError> {
        self.read_series(Opcode::GetPing, &CancelFlag::new())
    }

    /// [`get_ping_array`](Self::get_ping_array) that gives up once `cancel` is raised
    pub fn get_ping_array_cancellable(
        &self,
        cancel: &CancelFlag,
    ) -> Result<SensorArray, ProtocolError> {
        self.read_series(Opcode::GetPing, cancel)
    }

    /// Read every ADC channel
    pub fn get_adc_array(&self) -> Result<SensorArray, ProtocolError> {
        self.read_series(Opcode::GetAdc, &CancelFlag::new())
    }

    /// [`get_adc_array`](Self::get_adc_array) that gives up once `cancel` is raised
    pub fn get_adc_array_cancellable(
        &self,
        cancel: &CancelFlag,
    ) -> Result<SensorArray, ProtocolError> {
        self.read_series(Opcode::GetAdc, cancel)
    }

    /// Firmware version as a 16-bit number
    pub fn firmware_version(&self) -> Result<u16, ProtocolError> {
        let value = self.query_scalar(Opcode::Version)?;
        u16::try_from(value)
            .map_err(|_| ProtocolError::MalformedReply(format!("version {:#x} out of range", value)))
    }

    /// Make the pins in `mask` outputs
    pub fn set_gpio_output(&self, mask: i32) -> Result<(), ProtocolError> {
        self.gpio(Opcode::GpioOutput, mask)
    }

    /// Make the pins in `mask` inputs
    pub fn set_gpio_input(&self, mask: i32) -> Result<(), ProtocolError> {
        self.gpio(Opcode::GpioInput, mask)
    }

    /// Drive the output pins in `mask` high
    pub fn set_gpio_high(&self, mask: i32) -> Result<(), ProtocolError> {
        self.gpio(Opcode::GpioHigh, mask)
    }

    /// Drive the output pins in `mask` low
    pub fn set_gpio_low(&self, mask: i32) -> Result<(), ProtocolError> {
        self.gpio(Opcode::GpioLow, mask)
    }

    /// High/low state of all GPIO pins
    pub fn read_gpio(&self) -> Result<u32, ProtocolError> {
        self.query_scalar(Opcode::GpioRead)
    }

    /// Switch an auxiliary power relay on or off
    pub fn set_relay(&self, relay: Relay, on: bool) -> Result<(), ProtocolError> {
        self.set_gpio_output(relay.mask())?;
        if on {
            self.set_gpio_high(relay.mask())
        } else {
            self.set_gpio_low(relay.mask())
        }
    }

    /// Resynchronise the firmware's receive buffer
    pub fn flush(&self) -> Result<(), ProtocolError> {
        self.executor.flush().map(|_| ())
    }

    /// Stop the motors and release the port. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("stopping board");
        if let Err(e) = self.command(Command::with_param(Opcode::StopDistance, STOP_DISTANCE_IMMEDIATE)) {
            tracing::warn!("stop command failed during shutdown: {}", e);
        }
        self.executor.close();
    }

    /// True once [`shutdown`](Self::shutdown) has run
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn gpio(&self, opcode: Opcode, mask: i32) -> Result<(), ProtocolError> {
        check_range("mask", mask, 0, GPIO_MASK_MAX)?;
        self.command(Command::with_param(opcode, mask))
    }

    /// Send a command that answers with a bare acknowledgement
    fn command(&self, command: Command) -> Result<(), ProtocolError> {
        match self.executor.execute(&command, ReplyShape::Ack)? {
            DecodedReply::Ack => Ok(()),
            other => Err(unexpected(command.opcode(), other)),
        }
    }

    /// Send a data query; empty and error replies become failures
    fn query(&self, command: Command, cancel: &CancelFlag) -> Result<DecodedReply, ProtocolError> {
        let shape = command.reply_shape();
        match self.executor.execute_cancellable(&command, shape, cancel)? {
            DecodedReply::Empty => Err(ProtocolError::EmptyReply),
            DecodedReply::ErrorText(text) => Err(ProtocolError::BoardError(text)),
            reply => Ok(reply),
        }
    }

    fn query_scalar(&self, opcode: Opcode) -> Result<u32, ProtocolError> {
        match self.query(Command::new(opcode), &CancelFlag::new())? {
            DecodedReply::Scalar(value) => Ok(value),
            other => Err(unexpected(opcode, other)),
        }
    }

    fn read_series(&self, opcode: Opcode, cancel: &CancelFlag) -> Result<SensorArray, ProtocolError> {
        let command = Command::new(opcode);
        let reply = match self
            .executor
            .execute_cancellable(&command, ReplyShape::Series, cancel)
        {
            Ok(reply) => reply,
            // Silence from the board reads as an empty array
            Err(ProtocolError::Timeout) => return Ok(SensorArray::with_status(ArrayStatus::Empty)),
            Err(e) => return Err(e),
        };
        match reply {
            DecodedReply::Series(values) => Ok(SensorArray {
                status: ArrayStatus::Success,
                values,
            }),
            DecodedReply::Empty => Ok(SensorArray::with_status(ArrayStatus::Empty)),
            DecodedReply::ErrorText(text) => Ok(SensorArray::with_status(ArrayStatus::Error(text))),
            other => Err(unexpected(opcode, other)),
        }
    }
}

impl<T: SerialIo> Drop for Board<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_range(parameter: &'static str, value: i32, min: i32, max: i32) -> Result<(), ProtocolError> {
    if value < min || value > max {
        tracing::debug!(parameter, value, min, max, "rejecting out of range parameter");
        return Err(ProtocolError::out_of_range(
            parameter,
            value as i64,
            min as i64,
            max as i64,
        ));
    }
    Ok(())
}

/// Map a reply that does not fit the command to a typed failure
fn unexpected(opcode: Opcode, reply: DecodedReply) -> ProtocolError {
    match reply {
        DecodedReply::Empty => ProtocolError::EmptyReply,
        DecodedReply::ErrorText(text) => ProtocolError::BoardError(text),
        other => ProtocolError::UnexpectedReply {
            expected: opcode.reply_shape(),
            reply: format!("{:?}", other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range_bounds() {
        assert!(check_range("left", -127, -127, 127).is_ok());
        assert!(check_range("left", 127, -127, 127).is_ok());
        let err = check_range("left", 128, -127, 127).unwrap_err();
        assert!(err.is_local());
        assert_eq!(err.to_string(), "left = 128 is out of range [-127, 127]");
    }

    #[test]
    fn test_array_status_display() {
        assert_eq!(ArrayStatus::Success.to_string(), "SUCCESS");
        assert_eq!(ArrayStatus::Empty.to_string(), "EMPTY");
        assert_eq!(ArrayStatus::Error("ERROR 1\r".into()).to_string(), "ERROR 1\r");
    }

    #[test]
    fn test_sensor_array_serializes_status_as_text() {
        let array = SensorArray {
            status: ArrayStatus::Success,
            values: vec![1, 2],
        };
        let json = serde_json::to_string(&array).unwrap();
        assert_eq!(json, r#"{"status":"SUCCESS","values":[1,2]}"#);
    }

    #[test]
    fn test_relay_masks() {
        assert_eq!(Relay::V3_3.mask(), 1 << 16);
        assert_eq!(Relay::V12.mask(), 1 << 18);
    }
}
