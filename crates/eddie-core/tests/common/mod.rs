//! Mock serial port shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eddie_core::protocol::ResponseWindow;

/// Everything written to and read from the mock, in order
#[derive(Clone, Default)]
pub struct Transcript {
    bytes: Arc<Mutex<Vec<u8>>>,
    read_attempts: Arc<AtomicUsize>,
}

impl Transcript {
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    pub fn read_attempts(&self) -> usize {
        self.read_attempts.load(Ordering::SeqCst)
    }

    fn push(&self, data: &[u8]) {
        self.bytes.lock().unwrap().extend_from_slice(data);
    }
}

/// Serial mock that answers frames from a lookup table
///
/// Frames without an entry get no reply, like a board that is not there.
pub struct ScriptedPort {
    replies: HashMap<String, Vec<u8>>,
    inbox: Vec<u8>,
    pending: VecDeque<u8>,
    transcript: Transcript,
    byte_delay: Duration,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            inbox: Vec::new(),
            pending: VecDeque::new(),
            transcript: Transcript::default(),
            byte_delay: Duration::ZERO,
        }
    }

    /// Answer `frame` (without terminator) with `reply`
    pub fn reply(mut self, frame: &str, reply: &[u8]) -> Self {
        self.replies.insert(frame.to_string(), reply.to_vec());
        self
    }

    /// Sleep this long before handing out each reply byte
    pub fn byte_delay(mut self, delay: Duration) -> Self {
        self.byte_delay = delay;
        self
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }
}

impl Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.transcript.push(buf);
        for byte in buf {
            if *byte == b'\r' {
                let frame = String::from_utf8_lossy(&self.inbox).into_owned();
                self.inbox.clear();
                if let Some(reply) = self.replies.get(&frame) {
                    self.pending.extend(reply.iter().copied());
                }
            } else {
                self.inbox.push(*byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.transcript.read_attempts.fetch_add(1, Ordering::SeqCst);
        match self.pending.pop_front() {
            Some(byte) => {
                if !self.byte_delay.is_zero() {
                    std::thread::sleep(self.byte_delay);
                }
                buf[0] = byte;
                self.transcript.push(&[byte]);
                Ok(1)
            }
            None => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
        }
    }
}

/// Short response window so silent mocks fail fast
pub fn fast_window() -> ResponseWindow {
    ResponseWindow {
        first_byte_attempts: 10,
        poll_interval: Duration::from_millis(1),
        ..Default::default()
    }
}
