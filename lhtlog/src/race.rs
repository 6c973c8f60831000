//! Reboot detection racing an operator confirmation.
//!
//! After the operator is told to press the ACT button, two things can
//! happen first: the logger reboots and prints its banner, or the operator
//! confirms that nothing needs to happen. Both are watched by scoped
//! listener threads that report into one channel; the first report decides
//! the outcome and cancels the other listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::{debug, info, trace};

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::at::{BOOT_DIAGNOSTIC_LINES, BOOT_KEYWORD};
use crate::protocol::framer::{LineBuffer, read_pending};
use crate::session::Session;

/// Timing of a boot race and its follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceTiming {
    /// Poll interval of both listeners.
    pub poll_interval: Duration,
    /// Wait after the banner before resending the password.
    pub boot_settle: Duration,
    /// Wait after resending the password.
    pub unlock_settle: Duration,
}

impl Default for RaceTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            boot_settle: Duration::from_secs(6),
            unlock_settle: Duration::from_secs(3),
        }
    }
}

/// Which side of the race finished first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceOutcome {
    /// The device rebooted; keyword line plus diagnostic lines.
    DeviceBooted(Vec<String>),
    /// The operator confirmed before any reboot was seen.
    UserAborted,
}

/// Source of the operator's confirmation.
pub trait ConfirmSource: Send {
    /// Wait up to `timeout` for a confirmation.
    ///
    /// Returns `Ok(false)` when none arrived so the caller can check for
    /// cancellation between polls.
    fn poll_confirm(&mut self, timeout: Duration) -> Result<bool>;
}

enum RaceEvent {
    Booted(Vec<String>),
    Confirmed,
    Failed(Error),
}

/// Boot banner detector racing an operator confirmation.
#[derive(Debug, Clone)]
pub struct BootRace {
    keyword: String,
    lines_after_keyword: usize,
    timing: RaceTiming,
}

impl Default for BootRace {
    fn default() -> Self {
        Self::new(BOOT_KEYWORD, BOOT_DIAGNOSTIC_LINES)
    }
}

impl BootRace {
    /// Race for `keyword` followed by `lines_after_keyword` more lines.
    pub fn new(keyword: impl Into<String>, lines_after_keyword: usize) -> Self {
        Self {
            keyword: keyword.into(),
            lines_after_keyword,
            timing: RaceTiming::default(),
        }
    }

    /// Replace the timing parameters.
    #[must_use]
    pub fn with_timing(mut self, timing: RaceTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Timing in use.
    pub fn timing(&self) -> RaceTiming {
        self.timing
    }

    /// Run both listeners until one of them finishes.
    ///
    /// Blocks until the device reboots or the operator confirms; neither
    /// listener outlives the call.
    pub fn run<P>(&self, port: &mut P, confirm: &mut dyn ConfirmSource) -> Result<RaceOutcome>
    where
        P: Port + ?Sized,
    {
        let cancel = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel();

        let first = thread::scope(|scope| {
            let cancel = &cancel;

            let device_tx = tx.clone();
            scope.spawn(move || {
                let event = match self.listen_device(port, cancel) {
                    Ok(Some(lines)) => RaceEvent::Booted(lines),
                    Ok(None) => return,
                    Err(e) => RaceEvent::Failed(e),
                };
                let _ = device_tx.send(event);
            });

            let poll_interval = self.timing.poll_interval;
            scope.spawn(move || {
                let event = match listen_user(confirm, cancel, poll_interval) {
                    Ok(true) => RaceEvent::Confirmed,
                    Ok(false) => return,
                    Err(e) => RaceEvent::Failed(e),
                };
                let _ = tx.send(event);
            });

            let first = rx.recv();
            cancel.store(true, Ordering::SeqCst);
            first
        });

        match first {
            Ok(RaceEvent::Booted(lines)) => {
                info!("Device rebooted ({} banner lines)", lines.len());
                Ok(RaceOutcome::DeviceBooted(lines))
            },
            Ok(RaceEvent::Confirmed) => {
                info!("Operator confirmed, no reboot");
                Ok(RaceOutcome::UserAborted)
            },
            Ok(RaceEvent::Failed(e)) => Err(e),
            Err(_) => Err(Error::Protocol(
                "boot race ended without a result".to_string(),
            )),
        }
    }

    fn listen_device<P>(&self, port: &mut P, cancel: &AtomicBool) -> Result<Option<Vec<String>>>
    where
        P: Port + ?Sized,
    {
        let quota = self.lines_after_keyword + 1;
        let mut buffer = LineBuffer::records();
        let mut captured: Vec<String> = Vec::with_capacity(quota);

        loop {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            let chunk = read_pending(port)?;
            if chunk.is_empty() {
                if cancel.load(Ordering::SeqCst) {
                    if !captured.is_empty() {
                        debug!("Boot capture cut short after {} lines", captured.len());
                    }
                    return Ok(None);
                }
                thread::sleep(self.timing.poll_interval);
                continue;
            }

            for line in buffer.push(&chunk) {
                if captured.is_empty() {
                    if !line.contains(self.keyword.as_str()) {
                        trace!("Ignoring line before banner: {line:?}");
                        continue;
                    }
                    if cancel.load(Ordering::SeqCst) {
                        return Ok(None);
                    }
                    debug!("Boot keyword seen: {line:?}");
                }
                captured.push(line);
                if captured.len() == quota {
                    return Ok(Some(captured));
                }
            }
        }
    }
}

fn listen_user(
    confirm: &mut dyn ConfirmSource,
    cancel: &AtomicBool,
    poll_interval: Duration,
) -> Result<bool> {
    while !cancel.load(Ordering::SeqCst) {
        if confirm.poll_confirm(poll_interval)? {
            cancel.store(true, Ordering::SeqCst);
            return Ok(true);
        }
    }
    Ok(false)
}

impl<P: Port> Session<P> {
    /// Wait for a reboot or the operator, re-authenticating after a reboot.
    ///
    /// On [`RaceOutcome::DeviceBooted`] the banner is echoed, the session
    /// waits for the boot to settle, resends `password` and waits again.
    /// On [`RaceOutcome::UserAborted`] it returns at once.
    pub fn boot_race(
        &mut self,
        race: &BootRace,
        confirm: &mut dyn ConfirmSource,
        password: &str,
    ) -> Result<RaceOutcome> {
        let outcome = race.run(self.port_mut(), confirm)?;

        if let RaceOutcome::DeviceBooted(lines) = &outcome {
            self.echo_mut().boot_banner(lines);
            let timing = race.timing();
            thread::sleep(timing.boot_settle);
            info!("Resending password after reboot");
            self.send_line(password)?;
            thread::sleep(timing.unlock_settle);
            self.mark_unlocked();
        }
        Ok(outcome)
    }
}
