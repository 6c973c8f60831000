//! Inactivity-timeout line framing.
//!
//! The logger's AT dialect has no end-of-message marker, length prefix or
//! checksum. A response is considered complete once the channel has been
//! silent for the inactivity timeout; everything received up to then is
//! split into lines.

use std::thread;
use std::time::{Duration, Instant};

use log::trace;

use crate::error::{Error, Result};
use crate::port::{Port, is_no_data};

/// Interval between polls of an idle channel.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Accumulates raw chunks and splits off complete lines.
///
/// Incomplete UTF-8 sequences at a chunk boundary are held back until the
/// next chunk; invalid bytes are dropped.
#[derive(Debug)]
pub struct LineBuffer {
    text: String,
    undecoded: Vec<u8>,
    terminator: &'static str,
    trim: bool,
}

impl LineBuffer {
    /// Buffer for command responses: lines end with CRLF and are kept as is.
    pub fn crlf() -> Self {
        Self {
            text: String::new(),
            undecoded: Vec::new(),
            terminator: "\r\n",
            trim: false,
        }
    }

    /// Buffer for record streams: lines end with LF and are trimmed.
    pub fn records() -> Self {
        Self {
            text: String::new(),
            undecoded: Vec::new(),
            terminator: "\n",
            trim: true,
        }
    }

    /// Append a chunk and return every line it completed, skipping empty ones.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.undecoded.extend_from_slice(chunk);
        let decoded = drain_utf8(&mut self.undecoded);
        self.text.push_str(&decoded);

        let mut lines = Vec::new();
        while let Some(pos) = self.text.find(self.terminator) {
            let rest = self.text.split_off(pos + self.terminator.len());
            let mut line = std::mem::replace(&mut self.text, rest);
            line.truncate(pos);
            let line = if self.trim {
                line.trim().to_string()
            } else {
                line
            };
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whether an unterminated partial line is buffered.
    pub fn has_partial(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Take the unterminated remainder as a final line, if it has content.
    pub fn take_rest(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.text);
        self.undecoded.clear();
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

/// Decode the valid UTF-8 prefix of `buffer`, dropping invalid bytes.
///
/// An incomplete sequence at the end is kept in `buffer` for the next read.
pub fn drain_utf8(buffer: &mut Vec<u8>) -> String {
    let mut output = String::new();

    loop {
        match std::str::from_utf8(buffer) {
            Ok(valid) => {
                output.push_str(valid);
                buffer.clear();
                break;
            },
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                if let Ok(valid) = std::str::from_utf8(&buffer[..valid_up_to]) {
                    output.push_str(valid);
                }

                match err.error_len() {
                    Some(invalid_len) => {
                        let drain_to = valid_up_to.saturating_add(invalid_len).min(buffer.len());
                        buffer.drain(..drain_to);
                    },
                    None => {
                        buffer.drain(..valid_up_to);
                        break;
                    },
                }
            },
        }
    }

    output
}

/// Read one chunk of whatever is currently pending on the channel.
///
/// Returns an empty vector when nothing is available.
pub(crate) fn read_pending<P: Port + ?Sized>(port: &mut P) -> Result<Vec<u8>> {
    let pending = port.bytes_to_read()?;
    if pending == 0 {
        return Ok(Vec::new());
    }

    let mut chunk = vec![0u8; pending];
    match port.read(&mut chunk) {
        Ok(n) => {
            chunk.truncate(n);
            trace!("Read {n} bytes: {:?}", String::from_utf8_lossy(&chunk));
            Ok(chunk)
        },
        Err(e) if is_no_data(&e) => Ok(Vec::new()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Collect one response from the channel.
///
/// Polls until no byte has arrived for `inactivity_timeout`, then flushes a
/// non-empty unterminated remainder as the last line. A silent channel
/// yields no lines and returns after one timeout.
pub fn frame<P: Port + ?Sized>(port: &mut P, inactivity_timeout: Duration) -> Result<Vec<String>> {
    let mut buffer = LineBuffer::crlf();
    let mut lines = Vec::new();
    let mut last_data = Instant::now();

    loop {
        if crate::is_interrupted_requested() {
            return Err(Error::Interrupted);
        }

        let chunk = read_pending(port)?;
        if !chunk.is_empty() {
            lines.extend(buffer.push(&chunk));
            last_data = Instant::now();
            continue;
        }

        let idle = last_data.elapsed();
        if idle >= inactivity_timeout {
            break;
        }
        thread::sleep(POLL_INTERVAL.min(inactivity_timeout - idle));
    }

    if let Some(rest) = buffer.take_rest() {
        lines.push(rest);
    }
    for line in &lines {
        trace!("Framed line: {line:?}");
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::MockPort;

    const TIMEOUT: Duration = Duration::from_millis(60);

    #[test]
    fn test_line_buffer_splits_crlf_and_keeps_remainder() {
        let mut buf = LineBuffer::crlf();
        assert_eq!(buf.push(b"AT+TDC=?\r\n12"), vec!["AT+TDC=?"]);
        assert!(buf.has_partial());
        assert_eq!(buf.push(b"00000\r\n"), vec!["1200000"]);
        assert!(!buf.has_partial());
        assert_eq!(buf.take_rest(), None);
    }

    #[test]
    fn test_line_buffer_drops_empty_lines() {
        let mut buf = LineBuffer::crlf();
        assert_eq!(buf.push(b"\r\n\r\nOK\r\n\r\n"), vec!["OK"]);
    }

    #[test]
    fn test_line_buffer_crlf_split_across_chunks() {
        let mut buf = LineBuffer::crlf();
        assert!(buf.push(b"first\r").is_empty());
        assert_eq!(buf.push(b"\nsecond\r\n"), vec!["first", "second"]);
    }

    #[test]
    fn test_line_buffer_records_trim_and_split_on_lf() {
        let mut buf = LineBuffer::records();
        assert_eq!(buf.push(b"  0001 a\r\n0002 b\n\r\n"), vec!["0001 a", "0002 b"]);
    }

    #[test]
    fn test_line_buffer_keeps_leading_space_for_responses() {
        let mut buf = LineBuffer::crlf();
        assert_eq!(buf.push(b" 70 B3 D5\r\n"), vec![" 70 B3 D5"]);
    }

    #[test]
    fn test_drain_utf8_drops_invalid_bytes_and_continues() {
        let mut buf = vec![0xFF, b'A', 0xFE, b'B'];
        assert_eq!(drain_utf8(&mut buf), "AB");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_utf8_keeps_incomplete_suffix() {
        let mut buf = vec![b'2', 0xC2];
        assert_eq!(drain_utf8(&mut buf), "2");
        assert_eq!(buf, vec![0xC2]);

        buf.push(0xB0);
        assert_eq!(drain_utf8(&mut buf), "°");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_frame_silent_channel_returns_no_lines_at_timeout() {
        let mut port = MockPort::silent();
        let start = Instant::now();
        let lines = frame(&mut port, TIMEOUT).unwrap();
        assert!(lines.is_empty());
        assert!(start.elapsed() >= TIMEOUT);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_frame_flushes_trailing_partial_line() {
        let mut port = MockPort::with_chunks(&["Password correct\r\n", "  1200000  "]);
        let lines = frame(&mut port, TIMEOUT).unwrap();
        assert_eq!(lines, vec!["Password correct", "1200000"]);
    }

    #[test]
    fn test_frame_joins_chunks_arriving_within_timeout() {
        let mut port = MockPort::silent()
            .then(Duration::ZERO, "0001 date=2024")
            .then(Duration::from_millis(20), "-01-01\r\n")
            .then(Duration::from_millis(20), "0002 x\r\n");
        let lines = frame(&mut port, Duration::from_millis(150)).unwrap();
        assert_eq!(lines, vec!["0001 date=2024-01-01", "0002 x"]);
    }

    #[test]
    fn test_frame_stops_at_gap_longer_than_timeout() {
        let mut port = MockPort::silent()
            .then(Duration::ZERO, "first\r\n")
            .then(Duration::from_millis(400), "late\r\n");
        let lines = frame(&mut port, TIMEOUT).unwrap();
        assert_eq!(lines, vec!["first"]);

        // The late line is picked up by the next framing call.
        let lines = frame(&mut port, Duration::from_millis(600)).unwrap();
        assert_eq!(lines, vec!["late"]);
    }

    #[test]
    fn test_frame_line_count_matches_segments_plus_partial() {
        let segments = ["a", "", "b b", "c=1", ""];
        let stream = segments.join("\r\n") + "\r\ntail";
        let expected_full = segments.iter().filter(|s| !s.is_empty()).count();

        let mut port = MockPort::with_chunks(&[&stream[..5], &stream[5..]]);
        let lines = frame(&mut port, TIMEOUT).unwrap();
        assert_eq!(lines.len(), expected_full + 1);
        assert_eq!(lines.last().map(String::as_str), Some("tail"));
    }

    #[test]
    fn test_frame_propagates_transport_error() {
        let mut port = MockPort::failing(std::io::ErrorKind::BrokenPipe);
        let err = frame(&mut port, TIMEOUT).unwrap_err();
        assert!(err.is_transport());
    }
}
