//! # lhtlog
//!
//! A library for talking to Dragino LHT65N temperature/humidity loggers over
//! their serial AT-command console.
//!
//! The console has no message framing: replies end when the device goes
//! quiet. This crate provides:
//!
//! - Inactivity-timeout line framing and response filtering
//! - A [`Session`] that owns the channel, unlocks the device and exchanges
//!   commands
//! - Bulk datalogger retrieval with a smoothed ETA
//! - A boot race that detects a reboot banner or an operator confirmation,
//!   whichever comes first
//! - Parsing of datalogger lines into CSV-ready entries
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use lhtlog::{NativePort, SerialConfig, Session, parse_entries};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!     let mut session = Session::new(port);
//!
//!     session.unlock("123456")?;
//!     let address = session.device_address()?;
//!
//!     let lines = session.retrieve_entries(100, |progress| {
//!         println!("{}/{}", progress.captured, progress.expected);
//!     })?;
//!     for entry in parse_entries(&lines) {
//!         println!("{address}: {entry}");
//!     }
//!
//!     session.close()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod bulk;
pub mod entry;
pub mod error;
pub mod host;
pub mod port;
pub mod protocol;
pub mod race;
pub mod session;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Framing, bulk
/// retrieval and the boot race poll it and end with [`Error::Interrupted`].
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use host::{auto_detect_port, discover_ports};
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    bulk::{BulkProgress, BulkRetriever, EtaEstimator},
    entry::{CSV_HEADER, Entry, parse_entries, parse_entry},
    error::{Error, Result},
    host::{DetectedPort, UsbBridge, format_port_list, pick_port},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{AtCommand, DATALOGGER_CAPACITY, clamp_entry_count, filter_response, frame},
    race::{BootRace, ConfirmSource, RaceOutcome, RaceTiming},
    session::{DeviceStatus, Echo, Session, SessionState, SessionTiming, SilentEcho, UnlockOutcome},
};
