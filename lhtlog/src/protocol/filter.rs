//! Response pruning.

use log::debug;

/// Prefix of the boot/noise lines the firmware interleaves with replies.
pub const NOISE_PREFIX: &str = "Start";

/// Bare acknowledgement token.
pub const ACK: &str = "OK";

/// Drop noise lines and redundant acknowledgements, preserving order.
///
/// A line starting with [`NOISE_PREFIX`] is always dropped. An [`ACK`] line
/// is dropped when real content was already kept before it; a lone or
/// leading acknowledgement is kept. Applying the filter twice gives the same
/// result as applying it once.
pub fn filter_response<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut kept: Vec<String> = Vec::new();
    for line in lines {
        let line = line.into();
        if line.starts_with(NOISE_PREFIX) {
            debug!("Dropping noise line: {line:?}");
            continue;
        }
        if line == ACK && !kept.is_empty() {
            debug!("Dropping redundant acknowledgement");
            continue;
        }
        kept.push(line);
    }
    kept
}

/// Concatenate response lines into one inline value.
///
/// One leading space is stripped from every line; the firmware pads
/// single-value answers that way.
pub fn compact_value(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| line.strip_prefix(' ').unwrap_or(line))
        .collect()
}
