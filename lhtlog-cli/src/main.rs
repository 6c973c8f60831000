//! lhtlog CLI - Datalogger and configuration tool for Dragino LHT65N loggers.
//!
//! ## Features
//!
//! - Guided session: unlock, inspect, reconfigure and start a mission
//! - Export datalogger entries to CSV with a live ETA
//! - Merge per-device exports into one table
//! - Raw AT command exchange for diagnostics
//! - Serial port discovery (FTDI adapters preferred)
//! - Shell completion generation
//! - Environment variable support

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use lhtlog::port::DEFAULT_BAUD;
use lhtlog::protocol::at::DEFAULT_PASSWORD;
use lhtlog::{NativePort, SerialConfig, Session};
use log::debug;

mod commands;
mod config;
mod serial;
mod term;

use commands::export::{ExportOptions, FileAction};
use commands::merge::DEFAULT_TABLE;
use config::Config;
use serial::{SerialOptions, select_serial_port};
use term::{ConsoleEcho, ask_text};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the operator pressed Ctrl-C.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// lhtlog - Datalogger and configuration tool for Dragino LHT65N loggers.
///
/// The logger is reached through an FTDI adapter wired to the external
/// sensor port (E2 cable: white to RX, green to TX, black to GND).
///
/// Environment variables:
///   LHTLOG_PORT              - Default serial port
///   LHTLOG_BAUD              - Baud rate (default: 9600)
///   LHTLOG_PASSWORD          - Unlock password
///   LHTLOG_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "lhtlog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "LHTLOG_PORT")]
    port: Option<String>,

    /// Baud rate of the logger console.
    #[arg(short, long, global = true, env = "LHTLOG_BAUD")]
    baud: Option<u32>,

    /// Unlock password (prompted when not set).
    #[arg(long, global = true, env = "LHTLOG_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "LHTLOG_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Guided workflow: unlock, show values, reconfigure, start a mission (default).
    Session,

    /// Export the last datalogger entries to a CSV file.
    Export {
        /// Number of entries to export (prompted when omitted, max 3328).
        count: Option<usize>,

        /// CSV file name, relative to the data directory.
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Overwrite an existing file without asking.
        #[arg(long, conflicts_with = "append")]
        overwrite: bool,

        /// Append to an existing file without asking.
        #[arg(long)]
        append: bool,

        /// Clear the datalogger after a successful export.
        #[arg(long)]
        clear: bool,

        /// Do not ask before clearing.
        #[arg(short, long)]
        yes: bool,
    },

    /// Clear the datalogger memory.
    Clear {
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Send one raw AT command and print the reply.
    Send {
        /// Command line, e.g. AT+VER=?
        command: String,

        /// Inactivity timeout ending the reply, in milliseconds.
        #[arg(long, value_name = "MS")]
        wait: Option<u64>,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Merge per-device CSV exports into one file.
    Merge {
        /// Device table with an `id,device_address` header.
        #[arg(long, default_value = DEFAULT_TABLE, value_name = "CSV")]
        table: PathBuf,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (detected from $SHELL if not specified).
        #[arg(value_enum)]
        shell: Option<Shell>,
    },
}

/// Error classes with dedicated exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation or missing input in non-interactive mode.
    #[error("{0}")]
    Usage(String),
    /// The operator cancelled.
    #[error("{0}")]
    Cancelled(String),
    /// Unusable configuration.
    #[error("{0}")]
    Config(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Config(_) => 3,
            Self::Cancelled(_) => 130,
        }
    }
}

/// Map an error to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    match err.downcast_ref::<lhtlog::Error>() {
        Some(lhtlog::Error::Interrupted) => 130,
        Some(lhtlog::Error::Config(_)) => 3,
        _ if was_interrupted() => 130,
        _ => 1,
    }
}

fn main() -> ExitCode {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "lhtlog v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    install_interrupt_handler();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = exit_code_for(&err);
            if code == 130 {
                eprintln!("\n{} {err}", style("Exiting…").yellow());
            } else {
                eprintln!("{} {err:#}", style("Error:").red().bold());
            }
            ExitCode::from(code)
        },
    }
}

/// First Ctrl-C asks running loops to stop; a second one exits at once.
fn install_interrupt_handler() {
    let installed = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            let _ = crossterm::terminal::disable_raw_mode();
            std::process::exit(130);
        }
    });
    if let Err(e) = installed {
        debug!("Failed to install Ctrl-C handler: {e}");
    }
    lhtlog::set_interrupt_checker(was_interrupted);
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config_path {
        Some(path) if !path.exists() => Err(CliError::Config(format!(
            "Config file {} does not exist",
            path.display()
        ))
        .into()),
        Some(path) => Ok(Config::load_from_path(path)),
        None => Ok(Config::load()),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    let Some(command) = &cli.command else {
        return commands::session::cmd_session(cli, &config);
    };

    match command {
        Commands::Session => commands::session::cmd_session(cli, &config),
        Commands::Export {
            count,
            file,
            overwrite,
            append,
            clear,
            yes,
        } => commands::export::cmd_export(
            cli,
            &config,
            &ExportOptions {
                count: *count,
                file: file.clone(),
                action: FileAction::from_flags(*overwrite, *append),
                clear: *clear,
                yes: *yes,
            },
        ),
        Commands::Clear { yes } => commands::clear::cmd_clear(cli, &config, *yes),
        Commands::Send { command, wait } => {
            commands::send::cmd_send(cli, &config, command, *wait)
        },
        Commands::ListPorts { json } => {
            commands::ports::cmd_list_ports(*json);
            Ok(())
        },
        Commands::Merge { table } => commands::merge::cmd_merge(&config, table),
        Commands::Completions { shell } => commands::completions::cmd_completions(*shell),
    }
}

/// Open the logger's port and unlock it.
///
/// Returns the session together with the password, which the boot race
/// needs again after a reboot.
fn open_session(cli: &Cli, config: &Config) -> Result<(Session<NativePort>, String)> {
    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };
    let port_name = select_serial_port(&options, config)?;
    let baud = cli
        .baud
        .or(config.connection.baud)
        .unwrap_or(DEFAULT_BAUD);
    let password = resolve_password(cli, config)?;

    if !cli.quiet {
        eprintln!(
            "{} Using {} at {} baud",
            style("🔌").cyan(),
            port_name,
            baud
        );
    }
    let port = NativePort::open(&SerialConfig::new(port_name.as_str(), baud))
        .with_context(|| format!("Failed to open serial port {port_name}"))?;

    let mut session = Session::new(port)
        .with_timing(config.session_timing())
        .with_echo(Box::new(ConsoleEcho::new(cli.quiet)));
    session.unlock(&password)?;
    Ok((session, password))
}

fn resolve_password(cli: &Cli, config: &Config) -> Result<String> {
    if let Some(password) = cli.password.as_deref().or(config.password()) {
        return Ok(password.to_string());
    }
    ask_text(
        "Password to unlock the device",
        DEFAULT_PASSWORD,
        cli.non_interactive,
    )
}
