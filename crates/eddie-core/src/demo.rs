//! Demo Mode - Simulated control board
//!
//! Speaks the board's wire protocol over an in-memory byte stream so the
//! driver can run without hardware. Drive commands update wheel state,
//! odometry queries report it, and the ping/ADC arrays carry noisy readings.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::{self, Read, Write};

use crate::board::attributes::{
    ADC_COUNTS_PER_VOLT, ADC_PIN_COUNT, BATTERY_VOLTAGE_MULTIPLIER, GPIO_MASK_MAX,
};
use crate::protocol::{Opcode, PACKET_TERMINATOR, PARAMETER_DELIMITER};

/// Firmware version the simulator reports
pub const SIMULATED_FIRMWARE_VERSION: u16 = 0x0104;

/// Number of ping sensors the simulator reports
const PING_SENSOR_COUNT: usize = 10;

/// Nominal battery voltage
const BATTERY_VOLTS: f64 = 12.4;

/// Encoder ticks gained per distance query at full power
const TICKS_PER_QUERY_AT_FULL_POWER: i32 = 16;

/// Simulated Eddie control board
pub struct SimulatedBoard {
    rng: StdRng,
    /// Bytes of the frame being received
    inbox: Vec<u8>,
    /// Reply bytes waiting to be read
    outbox: VecDeque<u8>,
    /// Drop every reply, like a board that is unplugged
    silent: bool,
    left_power: i32,
    right_power: i32,
    left_speed: i32,
    right_speed: i32,
    left_ticks: i32,
    right_ticks: i32,
    heading: i32,
    ramp: i32,
    gpio_output: u32,
    gpio_state: u32,
    frames_received: usize,
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBoard {
    /// Create a simulator seeded from system entropy
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a simulator with reproducible sensor noise
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            silent: false,
            left_power: 0,
            right_power: 0,
            left_speed: 0,
            right_speed: 0,
            left_ticks: 0,
            right_ticks: 0,
            heading: 0,
            ramp: 0,
            gpio_output: 0,
            gpio_state: 0,
            frames_received: 0,
        }
    }

    /// Stop answering (or resume)
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Non-empty frames received so far
    pub fn frames_received(&self) -> usize {
        self.frames_received
    }

    fn receive(&mut self, byte: u8) {
        if byte != PACKET_TERMINATOR {
            self.inbox.push(byte);
            return;
        }
        let frame = std::mem::take(&mut self.inbox);
        // Bare terminators only clear the receive buffer
        if frame.is_empty() {
            return;
        }
        self.frames_received += 1;
        let reply = self.respond(&String::from_utf8_lossy(&frame));
        if !self.silent {
            self.outbox.extend(reply.into_bytes());
            self.outbox.push_back(PACKET_TERMINATOR);
        }
    }

    /// Reply text for one frame, without the terminator
    fn respond(&mut self, frame: &str) -> String {
        let mut parts = frame.split(PARAMETER_DELIMITER as char);
        let Some(opcode) = parts.next().and_then(Opcode::from_token) else {
            return "ERROR".to_string();
        };
        let params: Option<Vec<i32>> = parts
            .map(|p| u32::from_str_radix(p, 16).ok().map(|v| v as i32))
            .collect();
        let params = match params {
            Some(p) if p.len() == opcode.arity() => p,
            _ => return "ERROR".to_string(),
        };

        match opcode {
            Opcode::Version => format!("{:04X}", SIMULATED_FIRMWARE_VERSION),
            Opcode::DrivePower => {
                // The firmware keeps the low 8 bits of each power value
                self.left_power = params[0] as i8 as i32;
                self.right_power = params[1] as i8 as i32;
                self.left_speed = self.left_power * 4;
                self.right_speed = self.right_power * 4;
                String::new()
            }
            Opcode::DriveSpeed => {
                self.left_speed = params[0] as i16 as i32;
                self.right_speed = params[1] as i16 as i32;
                self.left_power = (self.left_speed / 4).clamp(-127, 127);
                self.right_power = (self.right_speed / 4).clamp(-127, 127);
                String::new()
            }
            Opcode::DriveDistance => {
                let distance = params[0] as i16 as i32;
                self.left_ticks = self.left_ticks.wrapping_add(distance);
                self.right_ticks = self.right_ticks.wrapping_add(distance);
                String::new()
            }
            Opcode::Rotate => {
                let angle = params[0] as i16 as i32;
                self.heading = (self.heading + angle).rem_euclid(360);
                String::new()
            }
            Opcode::StopDistance => {
                self.left_power = 0;
                self.right_power = 0;
                self.left_speed = 0;
                self.right_speed = 0;
                String::new()
            }
            Opcode::ResetEncoders => {
                self.left_ticks = 0;
                self.right_ticks = 0;
                self.heading = 0;
                String::new()
            }
            Opcode::SetRamp => {
                self.ramp = params[0];
                String::new()
            }
            Opcode::GetDistance => {
                self.left_ticks = self
                    .left_ticks
                    .wrapping_add(self.left_power * TICKS_PER_QUERY_AT_FULL_POWER / 127);
                self.right_ticks = self
                    .right_ticks
                    .wrapping_add(self.right_power * TICKS_PER_QUERY_AT_FULL_POWER / 127);
                format!(
                    "{:08X} {:08X}",
                    self.left_ticks as u32, self.right_ticks as u32
                )
            }
            Opcode::GetSpeed => format!(
                "{:04X} {:04X}",
                self.left_speed as i16 as u16, self.right_speed as i16 as u16
            ),
            Opcode::GetHeading => format!("{:03X}", self.heading),
            Opcode::GetPing => {
                let words: Vec<String> = (0..PING_SENSOR_COUNT)
                    .map(|_| format!("{:03X}", self.rng.gen_range(0x040..=0xC00u16)))
                    .collect();
                words.join(" ")
            }
            Opcode::GetAdc => {
                let mut words: Vec<String> = (0..ADC_PIN_COUNT - 1)
                    .map(|_| format!("{:03X}", self.rng.gen_range(0x000..=0xA00u16)))
                    .collect();
                let battery_counts = BATTERY_VOLTS / BATTERY_VOLTAGE_MULTIPLIER * ADC_COUNTS_PER_VOLT
                    + self.rng.gen_range(-8.0..8.0);
                words.push(format!("{:03X}", battery_counts.round().clamp(0.0, 4095.0) as u16));
                words.join(" ")
            }
            Opcode::GpioOutput => {
                self.gpio_output |= params[0] as u32 & GPIO_MASK_MAX as u32;
                String::new()
            }
            Opcode::GpioInput => {
                self.gpio_output &= !(params[0] as u32);
                String::new()
            }
            Opcode::GpioHigh => {
                self.gpio_state |= params[0] as u32 & self.gpio_output;
                String::new()
            }
            Opcode::GpioLow => {
                self.gpio_state &= !(params[0] as u32 & self.gpio_output);
                String::new()
            }
            Opcode::GpioRead => format!("{:05X}", self.gpio_state),
        }
    }
}

impl Write for SimulatedBoard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for byte in buf {
            self.receive(*byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SimulatedBoard {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.outbox.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
