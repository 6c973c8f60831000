//! Datalogger entry parsing.
//!
//! The firmware prints one record per line, mixing a bare row index, bare
//! date/time tokens and `key=value` pairs:
//!
//! ```text
//! 0001 date=2024-01-01 time=10:00:00 var=1 bat=3.6 temp=21.5 hum=45 light=100
//! ```
//!
//! [`parse_entry`] flattens such a line into column values. It does no I/O
//! and never validates the column count; schema checks belong to the writer.

use std::fmt;

use log::warn;

/// CSV header matching the column order of a parsed entry.
pub const CSV_HEADER: &str =
    "export_row,date,time,dragino_var,bat_voltage,temperature,humidity,light";

/// Lines up to this many characters are padding, not records.
pub const MIN_ENTRY_LEN: usize = 5;

/// Words that only occur in the firmware's diagnostic chatter.
pub const NOISE_WORDS: &[&str] = &["top", "Tx", "events", "when", "read", "sensor", "data"];

/// One datalogger record as ordered column values.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entry(Vec<String>);

impl Entry {
    /// Create an entry from column values.
    pub fn new(columns: Vec<String>) -> Self {
        Self(columns)
    }

    /// Column values in order.
    pub fn columns(&self) -> &[String] {
        &self.0
    }

    /// Row index as printed by the device.
    pub fn row(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Render as one CSV row (no line terminator).
    pub fn to_csv_row(&self) -> String {
        self.0.join(",")
    }

    /// Consume the entry and return its columns.
    pub fn into_columns(self) -> Vec<String> {
        self.0
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_csv_row())
    }
}

/// Parse one raw datalogger line.
///
/// Returns `None` (skip) for short padding lines, lines containing a
/// diagnostic noise word, and lines without any token.
pub fn parse_entry(raw: &str) -> Option<Entry> {
    let line = raw.trim();
    if line.len() <= MIN_ENTRY_LEN {
        return None;
    }
    if NOISE_WORDS.iter().any(|word| line.contains(word)) {
        return None;
    }

    let mut tokens = line.split_whitespace();
    let mut columns = vec![tokens.next()?.to_string()];
    for token in tokens {
        match token.split_once('=') {
            Some((_, value)) if !value.contains('=') => columns.push(value.to_string()),
            Some(_) => {},
            None => columns.push(token.to_string()),
        }
    }

    Some(Entry(columns))
}

/// Parse a batch of retrieved lines, skipping (and logging) unusable ones.
pub fn parse_entries<S: AsRef<str>>(lines: &[S]) -> Vec<Entry> {
    lines
        .iter()
        .filter_map(|line| {
            let line = line.as_ref();
            let entry = parse_entry(line);
            if entry.is_none() {
                warn!("{}", crate::Error::MalformedEntry(line.to_string()));
            }
            entry
        })
        .collect()
}
