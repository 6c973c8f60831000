//! AT command catalogue for the LHT65N firmware.
//!
//! Commands render without the line terminator; [`Port::write_line`]
//! appends it.
//!
//! [`Port::write_line`]: crate::port::Port::write_line

use std::fmt;

/// Number of entries the on-device datalogger can hold.
pub const DATALOGGER_CAPACITY: usize = 3328;

/// Factory default unlock password.
pub const DEFAULT_PASSWORD: &str = "123456";

/// Token the firmware includes in its reply to a password.
pub const PASSWORD_TOKEN: &str = "Password";

/// Keyword of the banner printed after a physical reactivation.
pub const BOOT_KEYWORD: &str = "Dragino";

/// Banner lines captured after the boot keyword.
pub const BOOT_DIAGNOSTIC_LINES: usize = 5;

/// An AT command understood by the logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtCommand {
    /// Query the device address.
    DeviceAddress,
    /// Query the device EUI.
    DeviceEui,
    /// Query the report interval in milliseconds.
    ReportInterval,
    /// Set the report interval in milliseconds.
    SetReportInterval(u64),
    /// Take one sensor reading.
    SensorValue,
    /// Query the device clock.
    Timestamp,
    /// Set the device clock (Unix seconds).
    SetTimestamp(u64),
    /// Set the transmit power index (5 is the lowest).
    TransmitPower(u8),
    /// Set the network join mode (0 = ABP, 1 = OTAA).
    JoinMode(u8),
    /// Print the last N datalogger entries.
    PrintLastEntries(usize),
    /// Print datalogger pages `from..=to`.
    PrintPages(u32, u32),
    /// Erase the datalogger.
    ClearDatalogger,
    /// Any other line, sent verbatim.
    Raw(String),
}

impl AtCommand {
    /// Whether the command changes device configuration or stored data.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::SetReportInterval(_)
                | Self::SetTimestamp(_)
                | Self::TransmitPower(_)
                | Self::JoinMode(_)
                | Self::ClearDatalogger
        )
    }
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceAddress => f.write_str("AT+DADDR=?"),
            Self::DeviceEui => f.write_str("AT+DEUI=?"),
            Self::ReportInterval => f.write_str("AT+TDC=?"),
            Self::SetReportInterval(ms) => write!(f, "AT+TDC={ms}"),
            Self::SensorValue => f.write_str("AT+GETSENSORVALUE=0"),
            Self::Timestamp => f.write_str("AT+TIMESTAMP=?"),
            Self::SetTimestamp(unix) => write!(f, "AT+TIMESTAMP={unix}"),
            Self::TransmitPower(level) => write!(f, "AT+TXP={level}"),
            Self::JoinMode(mode) => write!(f, "AT+NJM={mode}"),
            Self::PrintLastEntries(n) => write!(f, "AT+PLDTA={n}"),
            Self::PrintPages(from, to) => write!(f, "AT+PDTA={from},{to}"),
            Self::ClearDatalogger => f.write_str("AT+CLRDTA"),
            Self::Raw(line) => f.write_str(line),
        }
    }
}

impl From<&str> for AtCommand {
    fn from(line: &str) -> Self {
        Self::Raw(line.to_string())
    }
}

/// Clamp a requested entry count to the datalogger capacity.
///
/// Returns the usable count and whether the request had to be reduced.
pub fn clamp_entry_count(requested: usize) -> (usize, bool) {
    if requested > DATALOGGER_CAPACITY {
        (DATALOGGER_CAPACITY, true)
    } else {
        (requested, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_commands_render() {
        assert_eq!(AtCommand::DeviceAddress.to_string(), "AT+DADDR=?");
        assert_eq!(AtCommand::DeviceEui.to_string(), "AT+DEUI=?");
        assert_eq!(AtCommand::ReportInterval.to_string(), "AT+TDC=?");
        assert_eq!(AtCommand::SensorValue.to_string(), "AT+GETSENSORVALUE=0");
        assert_eq!(AtCommand::Timestamp.to_string(), "AT+TIMESTAMP=?");
    }

    #[test]
    fn test_parameterised_commands_render() {
        assert_eq!(AtCommand::SetReportInterval(3_600_000).to_string(), "AT+TDC=3600000");
        assert_eq!(AtCommand::SetTimestamp(1_700_000_000).to_string(), "AT+TIMESTAMP=1700000000");
        assert_eq!(AtCommand::TransmitPower(5).to_string(), "AT+TXP=5");
        assert_eq!(AtCommand::JoinMode(0).to_string(), "AT+NJM=0");
        assert_eq!(AtCommand::PrintLastEntries(7).to_string(), "AT+PLDTA=7");
        assert_eq!(AtCommand::PrintPages(1, 1).to_string(), "AT+PDTA=1,1");
        assert_eq!(AtCommand::ClearDatalogger.to_string(), "AT+CLRDTA");
        assert_eq!(AtCommand::from("AT+VER=?").to_string(), "AT+VER=?");
    }

    #[test]
    fn test_mutating_commands() {
        assert!(AtCommand::ClearDatalogger.is_mutating());
        assert!(AtCommand::SetReportInterval(1000).is_mutating());
        assert!(!AtCommand::PrintLastEntries(10).is_mutating());
        assert!(!AtCommand::Raw("AT".into()).is_mutating());
    }

    #[test]
    fn test_clamp_entry_count() {
        assert_eq!(clamp_entry_count(100), (100, false));
        assert_eq!(clamp_entry_count(DATALOGGER_CAPACITY), (DATALOGGER_CAPACITY, false));
        assert_eq!(clamp_entry_count(5000), (DATALOGGER_CAPACITY, true));
    }
}
