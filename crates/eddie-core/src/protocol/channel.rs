//! Serial channel
//!
//! Owns the open port and performs the byte-level half of an exchange:
//! one frame write, then a read that stops at the terminator.

use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use super::{
    codec::escape, CancelFlag, ProtocolError, DEFAULT_FIRST_BYTE_ATTEMPTS,
    DEFAULT_POLL_INTERVAL_MS, PACKET_TERMINATOR,
};
use crate::board::attributes::PARALLAX_MAX_BUFFER;

/// Upper bound on bytes consumed while draining an abandoned reply
const DRAIN_LIMIT: usize = 4096;

/// Anything the channel can talk through: a serial port, the simulated board, a test mock
pub trait SerialIo: Read + Write + Send {}

impl<T: Read + Write + Send> SerialIo for T {}

/// Two-phase read policy for one reply
///
/// Phase one allows `first_byte_attempts` empty reads, `poll_interval` apart,
/// before giving up with [`ProtocolError::Timeout`]. Once a byte has arrived
/// the board is assumed to be answering and reads continue without an attempt
/// ceiling until the terminator. `max_reply_len` bounds the reply buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseWindow {
    /// Empty reads tolerated before the first reply byte
    pub first_byte_attempts: u32,
    /// Sleep between empty reads
    pub poll_interval: Duration,
    /// Longest reply accepted before the terminator
    pub max_reply_len: usize,
}

impl Default for ResponseWindow {
    fn default() -> Self {
        Self {
            first_byte_attempts: DEFAULT_FIRST_BYTE_ATTEMPTS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_reply_len: PARALLAX_MAX_BUFFER,
        }
    }
}

impl ResponseWindow {
    /// Longest time phase one can take
    pub fn first_byte_budget(&self) -> Duration {
        self.poll_interval * self.first_byte_attempts
    }
}

/// Cumulative traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeCounters {
    /// Bytes written
    pub tx_bytes: u64,
    /// Reply bytes read
    pub rx_bytes: u64,
    /// Frames written
    pub tx_frames: u64,
    /// Complete replies read
    pub rx_frames: u64,
    /// Exchanges that got no reply
    pub timeouts: u64,
}

/// An open connection to the board
pub struct SerialChannel<T> {
    port: Option<T>,
    window: ResponseWindow,
    counters: ExchangeCounters,
}

impl<T: SerialIo> SerialChannel<T> {
    /// Wrap an already configured port
    pub fn new(port: T, window: ResponseWindow) -> Self {
        Self {
            port: Some(port),
            window,
            counters: ExchangeCounters::default(),
        }
    }

    /// False once the port has been released
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Read policy in use
    pub fn window(&self) -> &ResponseWindow {
        &self.window
    }

    /// Traffic so far
    pub fn counters(&self) -> ExchangeCounters {
        self.counters
    }

    /// Write a whole frame in a single call
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), ProtocolError> {
        let port = self.port.as_mut().ok_or(ProtocolError::NotConnected)?;
        tracing::trace!(bytes = frame.len(), frame = %escape(frame), "write");

        let written = port
            .write(frame)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
        if written != frame.len() {
            return Err(ProtocolError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }

        self.counters.tx_bytes = self.counters.tx_bytes.saturating_add(written as u64);
        self.counters.tx_frames = self.counters.tx_frames.saturating_add(1);
        Ok(())
    }

    /// Read one reply, up to and including the terminator
    pub fn read_until_terminator(&mut self, cancel: &CancelFlag) -> Result<Vec<u8>, ProtocolError> {
        let window = self.window;
        let port = self.port.as_mut().ok_or(ProtocolError::NotConnected)?;
        let mut reply = Vec::new();

        // Phase one: bounded wait for the first byte
        let mut failed_attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(ProtocolError::Cancelled);
            }
            if let Some(byte) = read_byte(port)? {
                reply.push(byte);
                break;
            }
            failed_attempts += 1;
            if failed_attempts >= window.first_byte_attempts {
                self.counters.timeouts = self.counters.timeouts.saturating_add(1);
                return Err(ProtocolError::Timeout);
            }
            thread::sleep(window.poll_interval);
        }

        // Phase two: the board is answering, read until the terminator
        while reply.last() != Some(&PACKET_TERMINATOR) {
            if reply.len() >= window.max_reply_len {
                return Err(ProtocolError::BufferOverflow(window.max_reply_len));
            }
            if cancel.is_cancelled() {
                return Err(ProtocolError::Cancelled);
            }
            match read_byte(port)? {
                Some(byte) => reply.push(byte),
                None => thread::sleep(window.poll_interval),
            }
        }

        tracing::trace!(bytes = reply.len(), reply = %escape(&reply), "read");
        self.counters.rx_bytes = self.counters.rx_bytes.saturating_add(reply.len() as u64);
        self.counters.rx_frames = self.counters.rx_frames.saturating_add(1);
        Ok(reply)
    }

    /// Consume the rest of an abandoned reply
    ///
    /// Reads until the terminator, or until the line stays idle for one
    /// first-byte window. Returns how many bytes were consumed.
    pub fn drain_reply(&mut self) -> Result<usize, ProtocolError> {
        let window = self.window;
        let port = self.port.as_mut().ok_or(ProtocolError::NotConnected)?;
        let mut drained = 0usize;
        let mut idle = 0u32;
        while drained < DRAIN_LIMIT {
            match read_byte(port)? {
                Some(byte) => {
                    drained += 1;
                    idle = 0;
                    if byte == PACKET_TERMINATOR {
                        break;
                    }
                }
                None => {
                    idle += 1;
                    if idle >= window.first_byte_attempts {
                        break;
                    }
                    thread::sleep(window.poll_interval);
                }
            }
        }
        tracing::debug!(drained, "drained abandoned reply");
        Ok(drained)
    }

    /// Drop whatever is sitting in the receive buffer
    pub fn discard_input(&mut self) -> Result<usize, ProtocolError> {
        let limit = self.window.max_reply_len * 4;
        let port = self.port.as_mut().ok_or(ProtocolError::NotConnected)?;
        let mut discarded = 0;
        while discarded < limit {
            match read_byte(port)? {
                Some(_) => discarded += 1,
                None => break,
            }
        }
        if discarded > 0 {
            tracing::debug!(discarded, "discarded stale input");
        }
        Ok(discarded)
    }

    /// Release the port. Safe to call more than once.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!("serial channel closed");
        }
    }
}

/// Attempt a single-byte read. `None` means nothing was available.
fn read_byte<T: Read>(port: &mut T) -> Result<Option<u8>, ProtocolError> {
    let mut byte = [0u8; 1];
    match port.read(&mut byte) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(byte[0])),
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
            ) =>
        {
            Ok(None)
        }
        Err(e) => Err(ProtocolError::SerialError(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Port that replays queued read results
    #[derive(Default)]
    struct ReplayPort {
        reads: VecDeque<io::Result<u8>>,
        written: Vec<u8>,
        max_write: Option<usize>,
        read_calls: usize,
    }

    impl Read for ReplayPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.read_calls += 1;
            match self.reads.pop_front() {
                Some(Ok(b)) => {
                    buf[0] = b;
                    Ok(1)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "idle")),
            }
        }
    }

    impl Write for ReplayPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = self.max_write.map_or(buf.len(), |m| m.min(buf.len()));
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn fast_window() -> ResponseWindow {
        ResponseWindow {
            first_byte_attempts: 5,
            poll_interval: Duration::from_millis(1),
            max_reply_len: 16,
        }
    }

    fn queued(bytes: &[u8]) -> VecDeque<io::Result<u8>> {
        bytes.iter().map(|b| Ok(*b)).collect()
    }

    #[test]
    fn test_reads_through_gaps_after_first_byte() {
        let mut reads = queued(b"12");
        for _ in 0..20 {
            reads.push_back(Err(io::Error::new(io::ErrorKind::WouldBlock, "gap")));
        }
        reads.extend(queued(b"3\r"));
        let port = ReplayPort {
            reads,
            ..Default::default()
        };
        let mut channel = SerialChannel::new(port, fast_window());
        let reply = channel.read_until_terminator(&CancelFlag::new()).unwrap();
        assert_eq!(reply, b"123\r".to_vec());
        assert_eq!(channel.counters().rx_bytes, 4);
    }

    #[test]
    fn test_timeout_after_attempt_ceiling() {
        let mut channel = SerialChannel::new(ReplayPort::default(), fast_window());
        let result = channel.read_until_terminator(&CancelFlag::new());
        assert!(matches!(result, Err(ProtocolError::Timeout)));
        assert_eq!(channel.counters().timeouts, 1);
        assert_eq!(channel.port.as_ref().map(|p| p.read_calls), Some(5));
    }

    #[test]
    fn test_overflow_without_terminator() {
        let port = ReplayPort {
            reads: queued(&[b'A'; 40]),
            ..Default::default()
        };
        let mut channel = SerialChannel::new(port, fast_window());
        assert!(matches!(
            channel.read_until_terminator(&CancelFlag::new()),
            Err(ProtocolError::BufferOverflow(16))
        ));
    }

    #[test]
    fn test_hard_read_error_is_transport_fault() {
        let mut reads = VecDeque::new();
        reads.push_back(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        let port = ReplayPort {
            reads,
            ..Default::default()
        };
        let mut channel = SerialChannel::new(port, fast_window());
        assert!(matches!(
            channel.read_until_terminator(&CancelFlag::new()),
            Err(ProtocolError::SerialError(_))
        ));
    }

    #[test]
    fn test_cancelled_before_first_byte() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut channel = SerialChannel::new(ReplayPort::default(), fast_window());
        assert!(matches!(
            channel.read_until_terminator(&cancel),
            Err(ProtocolError::Cancelled)
        ));
    }

    #[test]
    fn test_short_write() {
        let port = ReplayPort {
            max_write: Some(3),
            ..Default::default()
        };
        let mut channel = SerialChannel::new(port, fast_window());
        assert!(matches!(
            channel.write_frame(b"HEAD\r"),
            Err(ProtocolError::ShortWrite {
                written: 3,
                expected: 5
            })
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut channel = SerialChannel::new(ReplayPort::default(), fast_window());
        channel.close();
        channel.close();
        assert!(!channel.is_open());
        assert!(matches!(
            channel.write_frame(b"HEAD\r"),
            Err(ProtocolError::NotConnected)
        ));
    }

    #[test]
    fn test_drain_stops_at_terminator() {
        let port = ReplayPort {
            reads: queued(b"C9 564\rNEXT\r"),
            ..Default::default()
        };
        let mut channel = SerialChannel::new(port, fast_window());
        assert_eq!(channel.drain_reply().unwrap(), 7);
        let reply = channel.read_until_terminator(&CancelFlag::new()).unwrap();
        assert_eq!(reply, b"NEXT\r".to_vec());
    }

    #[test]
    fn test_drain_gives_up_on_idle_line() {
        let mut channel = SerialChannel::new(ReplayPort::default(), fast_window());
        assert_eq!(channel.drain_reply().unwrap(), 0);
        assert_eq!(channel.port.as_ref().map(|p| p.read_calls), Some(5));
    }

    #[test]
    fn test_discard_input() {
        let port = ReplayPort {
            reads: queued(b"junk\r"),
            ..Default::default()
        };
        let mut channel = SerialChannel::new(port, fast_window());
        assert_eq!(channel.discard_input().unwrap(), 5);
        assert_eq!(channel.discard_input().unwrap(), 0);
    }
}
