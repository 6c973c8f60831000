//! Error types for lhtlog.

use std::io;
use thiserror::Error;

/// Result type for lhtlog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for lhtlog operations.
///
/// Silence on the channel is never reported through this type: an
/// inactivity timeout is the normal end of a device response.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the channel (read/write failure).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error (including a port that cannot be opened).
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The operator interrupted a running operation.
    #[error("Interrupted by user")]
    Interrupted,

    /// A retrieved datalogger line could not be turned into an entry.
    #[error("Malformed entry: {0}")]
    MalformedEntry(String),

    /// The device answered with something the session cannot use.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No serial port found.
    #[error("No serial port found")]
    DeviceNotFound,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error is a transport failure that ends the session.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Io(_) => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            _ => false,
        }
    }
}
