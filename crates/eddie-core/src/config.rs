//! Driver configuration
//!
//! Stored as JSON. Missing fields fall back to the board's defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::board::attributes::PARALLAX_MAX_BUFFER;
use crate::protocol::{
    ResponseWindow, DEFAULT_BAUD_RATE, DEFAULT_FIRST_BYTE_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_PORT, DEFAULT_SETTLE_MS,
};

/// Default ping/ADC polling rate in Hz
pub const DEFAULT_POLL_RATE_HZ: f64 = 10.0;

/// Slowest accepted polling rate
pub const MIN_POLL_RATE_HZ: f64 = 0.01;

/// Fastest accepted polling rate
pub const MAX_POLL_RATE_HZ: f64 = 1000.0;

/// Errors loading or saving a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not valid configuration JSON
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    /// A field holds a value the driver cannot use
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Field name, dotted for nested fields
        field: &'static str,
        /// What is wrong with the value
        message: String,
    },
}

/// Two-phase reply timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseWindowConfig {
    /// Empty reads tolerated before the first reply byte
    pub first_byte_attempts: u32,
    /// Sleep between empty reads
    pub poll_interval_ms: u64,
}

impl Default for ResponseWindowConfig {
    fn default() -> Self {
        Self {
            first_byte_attempts: DEFAULT_FIRST_BYTE_ATTEMPTS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Serial and polling settings for one board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Serial device path
    pub port: String,

    /// Baud rate
    pub baud_rate: u32,

    /// Delay after opening the port before the first command
    pub settle_ms: u64,

    /// Reply timing
    pub response_window: ResponseWindowConfig,

    /// Longest reply accepted before the terminator
    pub max_reply_len: usize,

    /// Ping/ADC polling rate in Hz
    pub poll_rate_hz: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            settle_ms: DEFAULT_SETTLE_MS,
            response_window: ResponseWindowConfig::default(),
            max_reply_len: PARALLAX_MAX_BUFFER,
            poll_rate_hz: DEFAULT_POLL_RATE_HZ,
        }
    }
}

impl DriverConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: DriverConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Reject values the driver cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "port",
                message: "must not be empty".into(),
            });
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "baud_rate",
                message: "must be positive".into(),
            });
        }
        if self.response_window.first_byte_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "response_window.first_byte_attempts",
                message: "must be at least 1".into(),
            });
        }
        if self.max_reply_len < 2 {
            return Err(ConfigError::InvalidValue {
                field: "max_reply_len",
                message: "must hold at least one byte and the terminator".into(),
            });
        }
        if !(MIN_POLL_RATE_HZ..=MAX_POLL_RATE_HZ).contains(&self.poll_rate_hz) {
            return Err(ConfigError::InvalidValue {
                field: "poll_rate_hz",
                message: format!(
                    "{} Hz is outside [{}, {}]",
                    self.poll_rate_hz, MIN_POLL_RATE_HZ, MAX_POLL_RATE_HZ
                ),
            });
        }
        Ok(())
    }

    /// Settle delay as a `Duration`
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Read policy for the serial channel
    pub fn response_window(&self) -> ResponseWindow {
        ResponseWindow {
            first_byte_attempts: self.response_window.first_byte_attempts,
            poll_interval: Duration::from_millis(self.response_window.poll_interval_ms),
            max_reply_len: self.max_reply_len,
        }
    }

    /// Interval between sensor polls. Rates outside the accepted range are
    /// clamped to it, and NaN falls back to the default.
    pub fn poll_period(&self) -> Duration {
        let rate = if self.poll_rate_hz.is_nan() {
            DEFAULT_POLL_RATE_HZ
        } else {
            self.poll_rate_hz.clamp(MIN_POLL_RATE_HZ, MAX_POLL_RATE_HZ)
        };
        Duration::from_secs_f64(1.0 / rate)
    }
}
