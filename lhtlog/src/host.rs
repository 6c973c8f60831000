//! Host-side serial port discovery.
//!
//! The logger is usually wired through an FTDI adapter. When no port was
//! named explicitly, FTDI ports win over other known bridges, which win over
//! anything else.

use log::{debug, info, trace};

use crate::error::{Error, Result};
use crate::port::{PortEnumerator, PortInfo};

/// Port used when discovery finds nothing better.
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Known USB VID/PID pairs for common USB-to-UART bridges.
const KNOWN_BRIDGES: &[(u16, &[u16], UsbBridge)] = &[
    (
        0x0403,
        &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015],
        UsbBridge::Ftdi,
    ),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71, 0xEA63], UsbBridge::Cp210x),
    (
        0x1A86,
        &[0x7523, 0x7522, 0x5523, 0x5512, 0x55D4],
        UsbBridge::Ch340,
    ),
    (0x067B, &[0x2303, 0x23A3, 0x23C3, 0x23D3], UsbBridge::Prolific),
];

/// USB-to-UART bridge chip behind a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UsbBridge {
    /// FTDI FT232 family.
    Ftdi,
    /// Silicon Labs CP210x.
    Cp210x,
    /// WCH CH340/CH341.
    Ch340,
    /// Prolific PL2303.
    Prolific,
    /// Not a recognised bridge.
    Unknown,
}

impl UsbBridge {
    /// Classify a VID/PID pair. An unlisted PID of a known vendor still
    /// counts as that vendor's bridge.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        let mut by_vendor = Self::Unknown;
        for (known_vid, pids, bridge) in KNOWN_BRIDGES {
            if *known_vid != vid {
                continue;
            }
            if pids.contains(&pid) {
                return *bridge;
            }
            by_vendor = *bridge;
        }
        by_vendor
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ftdi => "FTDI",
            Self::Cp210x => "CP210x",
            Self::Ch340 => "CH340/CH341",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether this is a recognised bridge.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A discovered serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectedPort {
    /// Port name/path (e.g. "/dev/ttyUSB0" or "COM3").
    pub name: String,
    /// Bridge chip, if recognised.
    pub bridge: UsbBridge,
    /// USB vendor ID.
    pub vid: Option<u16>,
    /// USB product ID.
    pub pid: Option<u16>,
    /// Manufacturer string.
    pub manufacturer: Option<String>,
    /// Product string.
    pub product: Option<String>,
    /// Serial number.
    pub serial: Option<String>,
}

impl From<PortInfo> for DetectedPort {
    fn from(info: PortInfo) -> Self {
        let bridge = match (info.vid, info.pid) {
            (Some(vid), Some(pid)) => UsbBridge::from_vid_pid(vid, pid),
            _ => UsbBridge::Unknown,
        };
        trace!("Port {} classified as {bridge:?}", info.name);
        Self {
            name: info.name,
            bridge,
            vid: info.vid,
            pid: info.pid,
            manufacturer: info.manufacturer,
            product: info.product,
            serial: info.serial_number,
        }
    }
}

/// List ports through an enumerator and classify them.
pub fn discover_with<E: PortEnumerator>() -> Vec<DetectedPort> {
    match E::list_ports() {
        Ok(ports) => ports.into_iter().map(DetectedPort::from).collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// List the host's serial ports.
#[cfg(feature = "native")]
#[must_use]
pub fn discover_ports() -> Vec<DetectedPort> {
    discover_with::<crate::port::NativePortEnumerator>()
}

/// Pick the best candidate: FTDI first, then any known bridge, then any port.
pub fn pick_port(ports: &[DetectedPort]) -> Result<DetectedPort> {
    let preferred = ports
        .iter()
        .find(|p| p.bridge == UsbBridge::Ftdi)
        .or_else(|| ports.iter().find(|p| p.bridge.is_known()));
    if let Some(port) = preferred {
        info!("Auto-detected {} bridge: {}", port.bridge.name(), port.name);
        return Ok(port.clone());
    }

    if let Some(port) = ports.first() {
        info!("Using first available port: {}", port.name);
        return Ok(port.clone());
    }

    Err(Error::DeviceNotFound)
}

/// Discover ports and pick the best candidate.
#[cfg(feature = "native")]
pub fn auto_detect_port() -> Result<DetectedPort> {
    pick_port(&discover_ports())
}

/// Format ports for display, one line each.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let bridge = if port.bridge.is_known() {
                format!(" [{}]", port.bridge.name())
            } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" [VID:{vid:04X} PID:{pid:04X}]")
            } else {
                String::new()
            };
            let product = port
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();
            format!("{}{bridge}{product}", port.name)
        })
        .collect()
}
