//! Scripted in-memory port for unit tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::port::Port;

/// One scripted delivery: `data` becomes readable `delay` after the previous
/// step was fully consumed (or after the first poll for the first step).
struct Step {
    delay: Duration,
    data: Vec<u8>,
}

/// Mock serial port with separate read/write buffers.
pub(crate) struct MockPort {
    steps: VecDeque<Step>,
    ready_at: Option<Instant>,
    stale: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
    inbox: Vec<u8>,
    written: Vec<u8>,
    fail_reads: Option<io::ErrorKind>,
    closed: bool,
}

impl MockPort {
    pub(crate) fn silent() -> Self {
        Self {
            steps: VecDeque::new(),
            ready_at: None,
            stale: Vec::new(),
            replies: VecDeque::new(),
            inbox: Vec::new(),
            written: Vec::new(),
            fail_reads: None,
            closed: false,
        }
    }

    /// Port that delivers each chunk immediately, one per poll.
    pub(crate) fn with_chunks(chunks: &[&str]) -> Self {
        let mut port = Self::silent();
        for chunk in chunks {
            port = port.then(Duration::ZERO, chunk);
        }
        port
    }

    pub(crate) fn then(mut self, delay: Duration, data: &str) -> Self {
        self.steps.push_back(Step {
            delay,
            data: data.as_bytes().to_vec(),
        });
        self
    }

    /// Bytes that are already pending before the first command is sent.
    pub(crate) fn with_stale(mut self, data: &str) -> Self {
        self.stale = data.as_bytes().to_vec();
        self
    }

    /// Port that answers each written line with the next reply, in order.
    pub(crate) fn with_replies(replies: &[&str]) -> Self {
        let mut port = Self::silent();
        port.replies = replies.iter().map(|r| r.as_bytes().to_vec()).collect();
        port
    }

    pub(crate) fn failing(kind: io::ErrorKind) -> Self {
        let mut port = Self::silent();
        port.fail_reads = Some(kind);
        port
    }

    pub(crate) fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    fn ready_len(&mut self) -> usize {
        if !self.stale.is_empty() {
            return self.stale.len();
        }
        if !self.inbox.is_empty() {
            return self.inbox.len();
        }
        let Some(step) = self.steps.front() else {
            return 0;
        };
        let ready_at = *self.ready_at.get_or_insert_with(|| Instant::now() + step.delay);
        if Instant::now() >= ready_at {
            step.data.len()
        } else {
            0
        }
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(10)
    }

    fn baud_rate(&self) -> u32 {
        9600
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        if let Some(kind) = self.fail_reads {
            return Err(io::Error::new(kind, "mock read failure").into());
        }
        Ok(self.ready_len())
    }

    fn clear_input(&mut self) -> Result<()> {
        self.stale.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(kind) = self.fail_reads {
            return Err(io::Error::new(kind, "mock read failure"));
        }
        if !self.stale.is_empty() {
            let n = buf.len().min(self.stale.len());
            buf[..n].copy_from_slice(&self.stale[..n]);
            self.stale.drain(..n);
            return Ok(n);
        }
        if !self.inbox.is_empty() {
            let n = buf.len().min(self.inbox.len());
            buf[..n].copy_from_slice(&self.inbox[..n]);
            self.inbox.drain(..n);
            return Ok(n);
        }
        if self.ready_len() == 0 {
            std::thread::sleep(Duration::from_millis(1));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let Some(step) = self.steps.front_mut() else {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        };
        let n = buf.len().min(step.data.len());
        buf[..n].copy_from_slice(&step.data[..n]);
        step.data.drain(..n);
        if step.data.is_empty() {
            self.steps.pop_front();
            self.ready_at = None;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        if buf.contains(&b'\n') {
            if let Some(reply) = self.replies.pop_front() {
                self.inbox.extend_from_slice(&reply);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
