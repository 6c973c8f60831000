//! `send`: one raw command exchange.

use std::io::IsTerminal;
use std::time::Duration;

use anyhow::Result;
use lhtlog::AtCommand;

use crate::config::Config;
use crate::{Cli, open_session};

/// Send one line and print the filtered reply.
///
/// The reply is echoed on stderr; when stdout is redirected it is also
/// written there, one line per reply line.
pub(crate) fn cmd_send(cli: &Cli, config: &Config, command: &str, wait_ms: Option<u64>) -> Result<()> {
    let (mut session, _) = open_session(cli, config)?;
    let wait = wait_ms.map_or(session.timing().command_timeout, Duration::from_millis);

    let lines = session.exchange(&AtCommand::from(command), wait, false)?;

    if !std::io::stdout().is_terminal() {
        for line in &lines {
            println!("{line}");
        }
    }
    Ok(())
}
