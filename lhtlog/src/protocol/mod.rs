//! Wire protocol: AT commands, line framing and response filtering.

pub mod at;
pub mod filter;
pub mod framer;

// Re-export common types
pub use at::{AtCommand, DATALOGGER_CAPACITY, clamp_entry_count};
pub use filter::{compact_value, filter_response};
pub use framer::{LineBuffer, frame};
