//! Serial port selection.
//!
//! An explicit `--port` or a configured port is used as is. Otherwise the
//! host's ports are discovered, recognised USB-UART bridges are preferred
//! (FTDI first) and the operator picks when the choice is ambiguous.

use std::cmp::Ordering;
use std::io::IsTerminal;

use anyhow::Result;
use console::style;
use dialoguer::{Input, Select, theme::ColorfulTheme};
use lhtlog::host::DEFAULT_PORT;
use lhtlog::{DetectedPort, UsbBridge, discover_ports, format_port_list, pick_port};
use log::{debug, info};

use crate::CliError;
use crate::config::Config;
use crate::term::map_prompt_error;

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Non-interactive mode (never prompt).
    pub non_interactive: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Resolve the serial port to open.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<String> {
    if let Some(port_name) = &options.port {
        return Ok(port_name.clone());
    }

    if let Some(port_name) = &config.connection.serial {
        debug!("Using port from config: {port_name}");
        return Ok(port_name.clone());
    }

    let ports = discover_ports();
    if ports.is_empty() {
        if options.non_interactive {
            return Err(usage_err(
                "No serial ports found; pass --port to name the adapter",
            ));
        }
        ensure_interactive_terminal()?;
        return prompt_port_name();
    }

    let candidates = candidate_ports(ports);
    if options.non_interactive {
        return select_non_interactive_port(candidates);
    }

    match candidates.len().cmp(&1) {
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(candidates)
        },
        _ => {
            let port = pick_port(&candidates)?;
            info!("Auto-selected port: {}", port.name);
            Ok(port.name)
        },
    }
}

/// Recognised bridges if any, otherwise every port.
fn candidate_ports(ports: Vec<DetectedPort>) -> Vec<DetectedPort> {
    if ports.iter().any(|p| p.bridge.is_known()) {
        ports
            .into_iter()
            .filter(|p| p.bridge.is_known())
            .collect()
    } else {
        ports
    }
}

fn select_non_interactive_port(candidates: Vec<DetectedPort>) -> Result<String> {
    let mut ftdi = candidates
        .iter()
        .filter(|p| p.bridge == UsbBridge::Ftdi);
    if let (Some(port), None) = (ftdi.next(), ftdi.next()) {
        return Ok(port.name.clone());
    }

    if candidates.len() > 1 {
        return Err(usage_err(
            "Multiple serial ports found; pass --port to choose one",
        ));
    }
    candidates
        .into_iter()
        .next()
        .map(|p| p.name)
        .ok_or_else(|| usage_err("No serial ports available"))
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Port selection needs an interactive terminal; pass --port",
        ))
    }
}

fn prompt_port_name() -> Result<String> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt("Serial device")
        .default(DEFAULT_PORT.to_string())
        .interact_text()
        .map_err(map_prompt_error)
}

fn select_port_interactive(mut ports: Vec<DetectedPort>) -> Result<String> {
    eprintln!(
        "{} Found {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    ports.sort_by_key(|p| p.bridge != UsbBridge::Ftdi);
    let default = pick_port(&ports)
        .ok()
        .and_then(|best| ports.iter().position(|p| p.name == best.name))
        .unwrap_or(0);

    let term_width = usize::from(console::Term::stderr().size().1);
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = format_port_list(&ports)
        .into_iter()
        .map(|label| console::truncate_str(&label, max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the logger's serial port")
        .items(&labels)
        .default(default)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .into_iter()
            .nth(index)
            .map(|p| p.name)
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("Port selection cancelled".to_string()).into()),
    }
}
