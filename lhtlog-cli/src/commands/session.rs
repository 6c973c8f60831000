//! `session`: the guided configuration workflow.
//!
//! Unlock, show the current readings and the latest entries, set the clock
//! and report interval, wait for the mission to start, then print an
//! overview of the datalogger.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use console::style;
use lhtlog::{DeviceStatus, Port, RaceOutcome, Session};
use log::info;

use crate::config::Config;
use crate::term::{EnterKey, ask_number};
use crate::{Cli, CliError, open_session};

/// Entries shown before reconfiguring.
const DEFAULT_SHOWN_ENTRIES: u64 = 10;

/// Report interval offered by default, in seconds.
const DEFAULT_INTERVAL_S: u64 = 3600;

/// Pause before the overview.
const OVERVIEW_DELAY: Duration = Duration::from_millis(500);

/// Session command implementation.
pub(crate) fn cmd_session(cli: &Cli, config: &Config) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{}\n",
            style(
                "Unlocks the logger to show log data and, optionally, resynchronises its \
                 clock and reconfigures the recording interval."
            )
            .blue()
        );
    }

    let (mut session, password) = open_session(cli, config)?;
    show_status(&mut session)?;

    let shown = ask_number(
        "Number of datalogger entries to print",
        DEFAULT_SHOWN_ENTRIES,
        cli.non_interactive,
    )?;
    session.show_entries(usize::try_from(shown).unwrap_or(usize::MAX))?;

    let interval_s = ask_number(
        "Logging interval in seconds (Ctrl-C exits without reconfiguring)",
        DEFAULT_INTERVAL_S,
        cli.non_interactive,
    )
    .map_err(|e| match e.downcast_ref::<CliError>() {
        Some(CliError::Cancelled(_)) => {
            CliError::Cancelled("Exiting without reconfiguring".to_string()).into()
        },
        _ => e,
    })?;

    eprintln!("\n{}", style("Setting device parameters:").bold());
    session.configure(interval_s, unix_now())?;
    show_status(&mut session)?;

    if cli.non_interactive {
        info!("Skipping the boot race in non-interactive mode");
    } else {
        eprintln!(
            "\n{} Hold 'ACT' until green blinking to start logging immediately, \
             or press Enter to postpone the mission.",
            style(">_").cyan()
        );
        match session.boot_race(&config.boot_race(), &mut EnterKey, &password)? {
            RaceOutcome::DeviceBooted(_) => info!("Mission started, device re-authenticated"),
            RaceOutcome::UserAborted => info!("Mission postponed by operator"),
        }
    }

    eprintln!("\n{}", style("Data logger overview (first and last values):").bold());
    thread::sleep(OVERVIEW_DELAY);
    session.overview()?;

    eprintln!(
        "\n---\n\nThe logger will now record every {interval_s}s, starting when you long \
         press(ed) ACT until green blinking. To stop an ongoing mission, short press ACT \
         5 times. A long press until green blinking restarts a mission from that time."
    );
    Ok(())
}

/// Read and print the current readings; returns the device address.
pub(crate) fn show_status<P: Port>(session: &mut Session<P>) -> Result<String> {
    let status = session.read_status()?;
    eprintln!("\n{}", style("Current readings:").bold());
    for line in status_lines(&status) {
        eprintln!("{line}");
    }
    Ok(status.address)
}

fn status_lines(status: &DeviceStatus) -> Vec<String> {
    let interval = status
        .interval_ms
        .map_or_else(|| "unknown".to_string(), |ms| format!("{ms}ms"));
    let mut lines = vec![
        format!("Device address = {}", status.address),
        format!("Device EUI = {}", status.eui),
        format!("Interval = {interval}"),
    ];
    lines.extend(status.sensor_values.iter().cloned());
    if !status.timestamp.is_empty() {
        lines.push(status.timestamp.clone());
    }
    lines
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
