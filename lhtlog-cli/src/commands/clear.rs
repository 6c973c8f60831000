//! `clear`: erase the datalogger after confirmation.

use anyhow::Result;
use console::style;
use lhtlog::{Port, Session};

use crate::config::Config;
use crate::term::ask_confirm;
use crate::{Cli, CliError, open_session};

/// Clear command implementation.
pub(crate) fn cmd_clear(cli: &Cli, config: &Config, yes: bool) -> Result<()> {
    let (mut session, _) = open_session(cli, config)?;
    clear_with_confirmation(&mut session, cli, yes)
}

/// Erase the datalogger once the operator agrees.
pub(crate) fn clear_with_confirmation<P: Port>(
    session: &mut Session<P>,
    cli: &Cli,
    yes: bool,
) -> Result<()> {
    if !confirm_clear(cli.non_interactive, yes)? {
        eprintln!("{}", style("Clear operation cancelled.").dim());
        return Ok(());
    }

    eprintln!("\n{} Clearing datalogger memory…", style("⏳").yellow());
    session.clear_datalogger()?;
    eprintln!("{} Datalogger memory cleared.", style("✓").green());
    Ok(())
}

fn confirm_clear(non_interactive: bool, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    if non_interactive {
        return Err(CliError::Usage(
            "Clearing the datalogger needs confirmation; pass --yes".to_string(),
        )
        .into());
    }
    ask_confirm(
        &style("Are you sure you want to clear the datalogger memory?")
            .yellow()
            .to_string(),
    )
}
