//! `list-ports`: show the host's serial ports.

use console::style;
use lhtlog::{DetectedPort, discover_ports, pick_port};

/// List serial ports, as JSON on stdout or styled lines on stderr.
pub(crate) fn cmd_list_ports(json: bool) {
    let detected = discover_ports();

    if json {
        println!("{}", ports_json(&detected));
        return;
    }

    eprintln!("{}", style("Serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return;
    }

    for port in &detected {
        let bridge = if port.bridge.is_known() {
            format!(" [{}]", style(port.bridge.name()).yellow())
        } else {
            String::new()
        };
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{bridge}{vid_pid}{product}",
            style("•").green(),
            style(&port.name).cyan(),
        );
    }

    if let Ok(best) = pick_port(&detected) {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&best.name).cyan().bold()
        );
    }
}

fn ports_json(ports: &[DetectedPort]) -> String {
    let ports: Vec<serde_json::Value> = ports
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "bridge": p.bridge.name(),
                "known": p.bridge.is_known(),
                "vid": p.vid,
                "pid": p.pid,
                "manufacturer": p.manufacturer,
                "product": p.product,
                "serial": p.serial,
            })
        })
        .collect();
    serde_json::to_string_pretty(&ports).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use lhtlog::UsbBridge;

    use super::*;

    #[test]
    fn test_ports_json_fields() {
        let ports = vec![DetectedPort {
            name: "/dev/ttyUSB0".to_string(),
            bridge: UsbBridge::Ftdi,
            vid: Some(0x0403),
            pid: Some(0x6001),
            manufacturer: Some("FTDI".to_string()),
            product: Some("FT232R USB UART".to_string()),
            serial: None,
        }];

        let value: serde_json::Value = serde_json::from_str(&ports_json(&ports)).unwrap();
        let first = &value[0];
        assert_eq!(first["name"], "/dev/ttyUSB0");
        assert_eq!(first["bridge"], "FTDI");
        assert_eq!(first["known"], true);
        assert_eq!(first["vid"], 0x0403);
        assert!(first["serial"].is_null());
    }

    #[test]
    fn test_ports_json_empty_is_array() {
        assert_eq!(ports_json(&[]), "[]");
    }
}
