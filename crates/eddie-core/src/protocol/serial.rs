//! Serial port handling
//!
//! Opens and configures the board's serial device.

use serialport::SerialPort;
use std::thread;
use std::time::Duration;

use super::ProtocolError;

/// Open the board's serial device
///
/// The port is configured 8N1 without flow control and with a zero read
/// timeout, so reads return immediately when no byte is waiting. After
/// configuration the call sleeps `settle` to let the board's UART stabilise.
pub fn open_port(
    name: &str,
    baud_rate: u32,
    settle: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    tracing::info!(port = name, baud_rate, "opening board serial port");

    let mut port = serialport::new(name, baud_rate)
        .timeout(Duration::ZERO)
        .open()
        .map_err(|e| ProtocolError::DeviceUnavailable(format!("{}: {}", name, e)))?;
    configure_port(port.as_mut())?;

    thread::sleep(settle);
    Ok(port)
}

/// Configure a serial port for board communication
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    // Standard 8N1 configuration
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::DeviceUnavailable(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::DeviceUnavailable(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::DeviceUnavailable(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::DeviceUnavailable(e.to_string()))?;
    port.set_timeout(Duration::ZERO)
        .map_err(|e| ProtocolError::DeviceUnavailable(e.to_string()))?;

    // Stale bytes from before we opened would be taken as the first reply
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::DeviceUnavailable(e.to_string()))?;

    Ok(())
}
