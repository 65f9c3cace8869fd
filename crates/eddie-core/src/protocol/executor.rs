//! Command execution
//!
//! The executor is the only way to reach the serial channel. Every exchange
//! (frame write plus reply read) runs while holding the channel lock, so at
//! most one command is ever in flight and callers queue on the lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use super::{
    codec::{self, escape},
    Command, DecodedReply, ExchangeCounters, ProtocolError, ReplyShape, SerialChannel, SerialIo,
};

/// Frame sent to resynchronise the firmware's receive buffer
const FLUSH_FRAME: &[u8] = b"\r\r\r";

/// Cooperative cancellation for an exchange waiting on a reply
///
/// Cloning shares the flag. The read loop checks it between polls.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Flag that is not raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Lower the flag so it can be reused
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// True once raised
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Serializes callers onto a single [`SerialChannel`]
pub struct CommandExecutor<T> {
    channel: Mutex<SerialChannel<T>>,
}

impl<T: SerialIo> CommandExecutor<T> {
    /// Take ownership of an open channel
    pub fn new(channel: SerialChannel<T>) -> Self {
        Self {
            channel: Mutex::new(channel),
        }
    }

    /// Acquire the channel. A panic in another holder does not leave the
    /// channel unusable, the guard is taken back from the poisoned lock.
    fn lock(&self) -> MutexGuard<'_, SerialChannel<T>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one exchange and decode the reply against `shape`
    pub fn execute(
        &self,
        command: &Command,
        shape: ReplyShape,
    ) -> Result<DecodedReply, ProtocolError> {
        self.execute_cancellable(command, shape, &CancelFlag::new())
    }

    /// Like [`execute`](Self::execute), but gives up with
    /// [`ProtocolError::Cancelled`] once `cancel` is raised
    pub fn execute_cancellable(
        &self,
        command: &Command,
        shape: ReplyShape,
        cancel: &CancelFlag,
    ) -> Result<DecodedReply, ProtocolError> {
        let frame = codec::encode(command);

        let reply = {
            let mut channel = self.lock();
            tracing::debug!(frame = %escape(&frame), "sending command");
            channel.write_frame(&frame)?;
            match channel.read_until_terminator(cancel) {
                Ok(reply) => reply,
                Err(ProtocolError::Timeout) => {
                    tracing::warn!(
                        command = %command.opcode(),
                        "no response from board within {:?}",
                        channel.window().first_byte_budget()
                    );
                    return Err(ProtocolError::Timeout);
                }
                Err(e @ (ProtocolError::Cancelled | ProtocolError::BufferOverflow(_))) => {
                    // Leave no part of this reply for the next caller
                    if let Err(drain) = channel.drain_reply() {
                        tracing::warn!("failed to drain abandoned reply: {}", drain);
                    }
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        };

        tracing::debug!(command = %command.opcode(), reply = %escape(&reply), "received reply");
        let decoded = codec::decode(&reply, shape)?;
        if let DecodedReply::ErrorText(text) = &decoded {
            tracing::warn!(command = %command.opcode(), "board error: {}", text.trim_end());
        }
        Ok(decoded)
    }

    /// Send three bare terminators and drop whatever the board echoes back
    pub fn flush(&self) -> Result<usize, ProtocolError> {
        let mut channel = self.lock();
        tracing::debug!("flushing board receive buffer");
        channel.write_frame(FLUSH_FRAME)?;
        thread::sleep(channel.window().first_byte_budget());
        channel.discard_input()
    }

    /// False once the channel has been closed
    pub fn is_open(&self) -> bool {
        self.lock().is_open()
    }

    /// Traffic statistics for the channel
    pub fn counters(&self) -> ExchangeCounters {
        self.lock().counters()
    }

    /// Release the port. Waits for any exchange in flight to finish.
    pub fn close(&self) {
        self.lock().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Opcode, ResponseWindow};
    use std::io::{self, Read, Write};
    use std::time::Duration;

    /// Answers every frame with a fixed reply
    struct FixedReply {
        reply: &'static [u8],
        pending: Vec<u8>,
        written: Vec<u8>,
    }

    impl FixedReply {
        fn new(reply: &'static [u8]) -> Self {
            Self {
                reply,
                pending: Vec::new(),
                written: Vec::new(),
            }
        }
    }

    impl Read for FixedReply {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                return Ok(0);
            }
            buf[0] = self.pending.remove(0);
            Ok(1)
        }
    }

    impl Write for FixedReply {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            if buf.last() == Some(&b'\r') && buf != FLUSH_FRAME {
                self.pending.extend_from_slice(self.reply);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn executor(reply: &'static [u8]) -> CommandExecutor<FixedReply> {
        let window = ResponseWindow {
            first_byte_attempts: 3,
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        };
        CommandExecutor::new(SerialChannel::new(FixedReply::new(reply), window))
    }

    #[test]
    fn test_execute_ack() {
        let exec = executor(b"\r");
        let cmd = Command::with_params(Opcode::DrivePower, 10, -10);
        assert_eq!(exec.execute(&cmd, ReplyShape::Ack).unwrap(), DecodedReply::Ack);
        let counters = exec.counters();
        assert_eq!(counters.tx_frames, 1);
        assert_eq!(counters.rx_frames, 1);
        assert_eq!(counters.tx_bytes, b"GO a fffffff6\r".len() as u64);
    }

    #[test]
    fn test_execute_board_error_is_decoded() {
        let exec = executor(b"ERROR\r");
        let reply = exec
            .execute(&Command::new(Opcode::GetHeading), ReplyShape::Scalar)
            .unwrap();
        assert_eq!(reply, DecodedReply::ErrorText("ERROR\r".to_string()));
    }

    #[test]
    fn test_flush_discards_echo() {
        let exec = executor(b"\r");
        exec.flush().unwrap();
        assert_eq!(exec.counters().tx_bytes, 3);
    }

    #[test]
    fn test_closed_executor_refuses() {
        let exec = executor(b"\r");
        exec.close();
        assert!(!exec.is_open());
        assert!(matches!(
            exec.execute(&Command::new(Opcode::ResetEncoders), ReplyShape::Ack),
            Err(ProtocolError::NotConnected)
        ));
    }

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!other.is_cancelled());
    }
}
