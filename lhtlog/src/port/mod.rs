//! Channel abstraction for the serial link to the logger.
//!
//! The session and every protocol component talk to the device through the
//! [`Port`] trait, so the framing and retrieval logic is independent of the
//! actual serial backend:
//!
//! ```text
//! +-------------------------------+
//! |  Session / BulkRetriever /    |
//! |  BootRace / LineFramer        |
//! +---------------+---------------+
//!                 |
//!                 v
//! +---------------+---------------+
//! |           Port trait          |
//! +---------------+---------------+
//!                 |
//!        +--------+--------+
//!        v                 v
//! +------+------+   +------+------+
//! | NativePort  |   |  MockPort   |
//! | (serialport)|   |   (tests)   |
//! +-------------+   +-------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use lhtlog::port::Port;
//!
//! fn ping<P: Port>(port: &mut P) -> lhtlog::Result<()> {
//!     port.write_line("AT")?;
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Line terminator the device expects after every command.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Default baud rate of the logger's UART.
pub const DEFAULT_BAUD: u32 = 9600;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout.
    pub timeout: Duration,
    /// Data bits (typically 8).
    pub data_bits: DataBits,
    /// Parity (typically None).
    pub parity: Parity,
    /// Stop bits (typically One).
    pub stop_bits: StopBits,
    /// Flow control (typically None).
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_secs(1),
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// Hardware flow control (RTS/CTS).
    Hardware,
    /// Software flow control (XON/XOFF).
    Software,
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Full-duplex byte channel to the device.
///
/// Reads that time out (`TimedOut` / `WouldBlock`) mean "no data yet" and
/// are never treated as transport failures by the protocol layer.
pub trait Port: Read + Write + Send {
    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current read timeout.
    fn timeout(&self) -> Duration;

    /// Get the current baud rate.
    fn baud_rate(&self) -> u32;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Number of bytes waiting in the input buffer.
    fn bytes_to_read(&mut self) -> Result<usize>;

    /// Discard everything waiting in the input buffer.
    fn clear_input(&mut self) -> Result<()>;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write one command line followed by CRLF.
    fn write_line(&mut self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + LINE_TERMINATOR.len());
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(LINE_TERMINATOR.as_bytes());
        Write::write_all(self, &data)?;
        Write::flush(self)?;
        Ok(())
    }
}

impl<P: Port + ?Sized> Port for &mut P {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_timeout(timeout)
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        (**self).bytes_to_read()
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

/// Whether an I/O error only means that no byte arrived within the timeout.
pub(crate) fn is_no_data(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
