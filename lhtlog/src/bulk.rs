//! Bulk datalogger retrieval with a smoothed ETA.
//!
//! `AT+PLDTA=<n>` makes the logger print its last `n` records. Large
//! requests take minutes and arrive in bursts, so the stream is consumed
//! record by record until the requested count is reached instead of
//! waiting for an inactivity timeout.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::AtCommand;
use crate::protocol::framer::{LineBuffer, read_pending};

/// Per-entry intervals kept for the windowed average.
pub const ETA_WINDOW: usize = 50;

/// Share of the requested entries during which no ETA is reported.
pub const WARMUP_FRACTION: f64 = 0.10;

/// Weight of the newest estimate in the exponential smoothing.
pub const ETA_SMOOTHING: f64 = 0.3;

/// Interval between polls of an idle channel while streaming.
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Progress of a running retrieval, reported once per captured entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulkProgress {
    /// Entries captured so far.
    pub captured: usize,
    /// Entries requested.
    pub expected: usize,
    /// Estimated time remaining, `None` during warm-up.
    pub eta: Option<Duration>,
}

impl BulkProgress {
    /// Completed fraction in `0.0..=1.0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.expected == 0 {
            1.0
        } else {
            self.captured as f64 / self.expected as f64
        }
    }
}

/// Remaining-time estimator blending the cumulative and windowed averages.
#[derive(Debug)]
pub struct EtaEstimator {
    expected: usize,
    captured: usize,
    warmup: usize,
    started: Instant,
    last: Instant,
    window: VecDeque<Duration>,
    capacity: usize,
    smoothing: f64,
    smoothed: Option<f64>,
}

impl EtaEstimator {
    /// Create an estimator for `expected` entries, starting now.
    pub fn new(expected: usize) -> Self {
        Self::starting_at(expected, Instant::now())
    }

    /// Create an estimator whose clock starts at `started`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn starting_at(expected: usize, started: Instant) -> Self {
        let warmup = ((expected as f64 * WARMUP_FRACTION).ceil() as usize).max(1);
        Self {
            expected,
            captured: 0,
            warmup,
            started,
            last: started,
            window: VecDeque::with_capacity(ETA_WINDOW),
            capacity: ETA_WINDOW,
            smoothing: ETA_SMOOTHING,
            smoothed: None,
        }
    }

    /// Use a different window capacity.
    #[must_use]
    pub fn with_window(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Number of entries during which the estimate is suppressed.
    pub fn warmup(&self) -> usize {
        self.warmup
    }

    /// Record one captured entry at `now` and return the displayable ETA.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, now: Instant) -> Option<Duration> {
        self.captured += 1;
        let interval = now.saturating_duration_since(self.last);
        self.last = now;

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(interval);

        let cumulative =
            now.saturating_duration_since(self.started).as_secs_f64() / self.captured as f64;
        let windowed = self.window.iter().map(Duration::as_secs_f64).sum::<f64>()
            / self.window.len() as f64;
        let per_entry = 0.5 * cumulative + 0.5 * windowed;
        let remaining = per_entry * self.expected.saturating_sub(self.captured) as f64;

        let smoothed = match self.smoothed {
            Some(previous) => self.smoothing * remaining + (1.0 - self.smoothing) * previous,
            None => remaining,
        };
        self.smoothed = Some(smoothed);

        if self.captured <= self.warmup {
            None
        } else {
            Some(Duration::from_secs_f64(smoothed.max(0.0)))
        }
    }
}

/// Streams a known number of records from the logger.
pub struct BulkRetriever<'a, P: Port + ?Sized> {
    port: &'a mut P,
}

impl<'a, P: Port + ?Sized> BulkRetriever<'a, P> {
    /// Create a retriever on an open channel.
    pub fn new(port: &'a mut P) -> Self {
        Self { port }
    }

    /// Request the last `expected` entries and read them as raw lines.
    ///
    /// Every non-empty line of the stream counts as one entry; surplus
    /// lines after the last requested one are discarded. `progress` is
    /// called once per captured entry. Callers clamp `expected` to
    /// [`DATALOGGER_CAPACITY`](crate::protocol::DATALOGGER_CAPACITY).
    pub fn retrieve<F>(&mut self, expected: usize, mut progress: F) -> Result<Vec<String>>
    where
        F: FnMut(BulkProgress),
    {
        if expected == 0 {
            return Ok(Vec::new());
        }

        let command = AtCommand::PrintLastEntries(expected);
        info!("Fetching the last {expected} datalogger entries");
        self.port.clear_input()?;
        self.port.write_line(&command.to_string())?;
        debug!("Sent {command}");

        let mut estimator = EtaEstimator::new(expected);
        let mut buffer = LineBuffer::records();
        let mut entries = Vec::with_capacity(expected);

        while entries.len() < expected {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            let chunk = read_pending(self.port)?;
            if chunk.is_empty() {
                thread::sleep(STREAM_POLL_INTERVAL);
                continue;
            }

            for line in buffer.push(&chunk) {
                if entries.len() == expected {
                    trace!("Discarding surplus line: {line:?}");
                    continue;
                }
                entries.push(line);
                let eta = estimator.record(Instant::now());
                progress(BulkProgress {
                    captured: entries.len(),
                    expected,
                    eta,
                });
            }
        }

        info!("Captured {} entries", entries.len());
        Ok(entries)
    }
}
