//! Terminal rendering of session traffic and operator input.

use std::io::Write as _;
use std::time::Duration;

use console::style;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use dialoguer::{Confirm, Error as DialoguerError, Input, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use lhtlog::{BulkProgress, ConfirmSource, Echo, UnlockOutcome};
use log::warn;

use crate::{CliError, use_fancy_output, was_interrupted};

/// Echoes session traffic to stderr.
pub struct ConsoleEcho {
    quiet: bool,
}

impl ConsoleEcho {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Echo for ConsoleEcho {
    fn command_sent(&mut self, command: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("Sending:").cyan(), command);
        }
    }

    fn lines_received(&mut self, lines: &[String]) {
        if self.quiet {
            return;
        }
        eprintln!("{} {}", style("Received:").green(), lines.join("\n"));
    }

    fn no_response(&mut self) {
        if !self.quiet {
            eprintln!("{}", style("No response").dim());
        }
    }

    fn inline_value(&mut self, value: &str) {
        eprint!("{value}");
        let _ = std::io::stderr().flush();
    }

    fn unlocked(&mut self, outcome: &UnlockOutcome) {
        if self.quiet {
            return;
        }
        match outcome {
            UnlockOutcome::Confirmed(line) => {
                eprintln!("{} {}", style("Received:").green(), line);
            },
            UnlockOutcome::AlreadyUnlocked => {
                eprintln!("{}", style("Device was already unlocked.").dim());
            },
        }
    }

    fn boot_banner(&mut self, lines: &[String]) {
        eprintln!("\n{}", style("Device booting…").yellow().bold());
        for line in lines {
            eprintln!("{line}");
        }
        eprintln!("\n{}\n", style("Making initial measurement…").yellow());
    }
}

/// Waits for the Enter key without blocking the boot race.
///
/// Raw mode is held only for the duration of one poll.
pub struct EnterKey;

impl ConfirmSource for EnterKey {
    fn poll_confirm(&mut self, timeout: Duration) -> lhtlog::Result<bool> {
        if was_interrupted() {
            return Err(lhtlog::Error::Interrupted);
        }

        crossterm::terminal::enable_raw_mode()?;
        let _raw_guard = RawModeGuard;

        if !event::poll(timeout)? {
            return Ok(false);
        }
        match event::read()? {
            Event::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }) => match (code, modifiers) {
                (KeyCode::Char('c'), KeyModifiers::CONTROL) => Err(lhtlog::Error::Interrupted),
                (KeyCode::Enter, _) => Ok(true),
                _ => Ok(false),
            },
            _ => Ok(false),
        }
    }
}

/// RAII guard to restore terminal mode on drop.
struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

/// Map a prompt failure to a CLI error class.
pub fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Prompt cancelled".to_string()).into()
            } else {
                CliError::Usage(format!("Prompt failed: {io_err}")).into()
            }
        },
    }
}

/// Ask for a number; an empty answer takes `default`.
///
/// In non-interactive mode the default is used without prompting.
pub fn ask_number(prompt: &str, default: u64, non_interactive: bool) -> anyhow::Result<u64> {
    if non_interactive {
        return Ok(default);
    }
    let answer = Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()
        .map_err(map_prompt_error)?;
    Ok(parse_number(&answer, default))
}

/// Parse a prompted number, falling back to `default` on garbage.
pub fn parse_number(answer: &str, default: u64) -> u64 {
    let answer = answer.trim();
    if answer.is_empty() {
        return default;
    }
    answer.parse().unwrap_or_else(|_| {
        warn!("Invalid number {answer:?}, using {default}");
        default
    })
}

/// Ask for a line of text; an empty answer takes `default`.
pub fn ask_text(prompt: &str, default: &str, non_interactive: bool) -> anyhow::Result<String> {
    if non_interactive {
        return Ok(default.to_string());
    }
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()
        .map_err(map_prompt_error)
}

/// Ask a yes/no question defaulting to no.
pub fn ask_confirm(prompt: &str) -> anyhow::Result<bool> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false))
}

/// Progress bar for bulk retrieval.
pub fn retrieval_bar(expected: usize, quiet: bool) -> ProgressBar {
    if quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(expected as u64);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} entries {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

/// Apply one progress report to the bar.
pub fn render_progress(pb: &ProgressBar, progress: BulkProgress) {
    pb.set_position(progress.captured as u64);
    pb.set_message(format_eta(progress.eta));
}

/// Format an ETA for display; empty while the estimate warms up.
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => {
            let secs = eta.as_secs();
            if secs >= 60 {
                format!("ETA {}m{:02}s", secs / 60, secs % 60)
            } else {
                format!("ETA {secs}s")
            }
        },
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("", 3600), 3600);
        assert_eq!(parse_number(" 1200 ", 3600), 1200);
        assert_eq!(parse_number("ten", 10), 10);
        assert_eq!(parse_number("-5", 10), 10);
    }

    #[test]
    fn test_non_interactive_prompts_take_defaults() {
        assert_eq!(ask_number("Entries", 10, true).unwrap(), 10);
        assert_eq!(ask_text("File", "260B1234.csv", true).unwrap(), "260B1234.csv");
    }

    #[test]
    fn test_format_eta_warmup_is_blank() {
        assert_eq!(format_eta(None), "");
    }

    #[test]
    fn test_format_eta_seconds_and_minutes() {
        assert_eq!(format_eta(Some(Duration::from_millis(4_900))), "ETA 4s");
        assert_eq!(format_eta(Some(Duration::from_secs(125))), "ETA 2m05s");
    }

    #[test]
    fn test_hidden_bar_when_quiet() {
        let pb = retrieval_bar(10, true);
        assert!(pb.is_hidden());
        render_progress(
            &pb,
            BulkProgress {
                captured: 3,
                expected: 10,
                eta: Some(Duration::from_secs(7)),
            },
        );
        assert_eq!(pb.position(), 3);
    }
}
