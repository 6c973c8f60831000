//! `export`: stream datalogger entries into a per-device CSV file.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Select, theme::ColorfulTheme};
use lhtlog::{CSV_HEADER, DATALOGGER_CAPACITY, Entry, clamp_entry_count, parse_entries};
use log::info;

use super::clear::clear_with_confirmation;
use crate::config::Config;
use crate::term::{ask_number, ask_text, map_prompt_error, render_progress, retrieval_bar};
use crate::{Cli, CliError, open_session};

/// Entries exported when no count is given.
pub(crate) const DEFAULT_EXPORT_COUNT: u64 = 100;

/// What to do with the target CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileAction {
    /// The file does not exist yet.
    Create,
    /// Replace the existing file.
    Overwrite,
    /// Add rows to the existing file.
    Append,
    /// Leave the file alone and stop.
    Cancel,
}

impl FileAction {
    /// Action requested by command-line flags, if any.
    pub(crate) fn from_flags(overwrite: bool, append: bool) -> Option<Self> {
        if overwrite {
            Some(Self::Overwrite)
        } else if append {
            Some(Self::Append)
        } else {
            None
        }
    }

    fn truncates(self) -> bool {
        matches!(self, Self::Create | Self::Overwrite)
    }
}

/// Options of one export run.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExportOptions {
    pub count: Option<usize>,
    pub file: Option<PathBuf>,
    pub action: Option<FileAction>,
    pub clear: bool,
    pub yes: bool,
}

/// Export command implementation.
pub(crate) fn cmd_export(cli: &Cli, config: &Config, options: &ExportOptions) -> Result<()> {
    let (mut session, _) = open_session(cli, config)?;
    let address = session.device_address()?;
    if !cli.quiet {
        eprintln!("{} Device address = {}", style("ℹ").blue(), address);
    }

    let requested = match options.count {
        Some(count) => count,
        None => {
            let prompt = format!(
                "Number of datalogger entries to export (max: {DATALOGGER_CAPACITY})"
            );
            usize::try_from(ask_number(&prompt, DEFAULT_EXPORT_COUNT, cli.non_interactive)?)
                .unwrap_or(DATALOGGER_CAPACITY)
        },
    };
    let (count, clamped) = clamp_entry_count(requested);
    if clamped {
        eprintln!(
            "{} Export size too high, changed to the maximal datalogger export value: {count}.",
            style("⚠").yellow()
        );
    }

    let data_dir = config.data_dir();
    let file_name = match &options.file {
        Some(file) => file.clone(),
        None => {
            let default_file = format!("{address}.csv");
            PathBuf::from(ask_text(
                "Filename for CSV export",
                &default_file,
                cli.non_interactive,
            )?)
        },
    };
    let path = data_dir.join(file_name);

    let action = choose_action(&path, options.action, cli.non_interactive)?;
    if action == FileAction::Cancel {
        eprintln!("{}", style("Export cancelled.").dim());
        return Ok(());
    }

    if !cli.quiet {
        eprintln!(
            "{} Fetching the last {count} datalogger entries…",
            style("⏳").yellow()
        );
    }
    let pb = retrieval_bar(count, cli.quiet);
    let lines = session.retrieve_entries(count, |progress| render_progress(&pb, progress))?;
    pb.finish_and_clear();

    let entries = parse_entries(&lines);
    let written = write_entries(&path, &entries, action)?;
    info!("Wrote {written} of {} retrieved entries", lines.len());
    eprintln!(
        "{} Data {} to {}",
        style("✓").green(),
        if action == FileAction::Append {
            "appended"
        } else {
            "saved"
        },
        path.display()
    );

    if options.clear {
        clear_with_confirmation(&mut session, cli, options.yes)?;
    }
    Ok(())
}

/// Decide how to treat the target file.
fn choose_action(
    path: &Path,
    requested: Option<FileAction>,
    non_interactive: bool,
) -> Result<FileAction> {
    if !path.exists() {
        return Ok(FileAction::Create);
    }
    if let Some(action) = requested {
        return Ok(action);
    }
    if non_interactive {
        return Err(CliError::Usage(format!(
            "File '{}' already exists; pass --overwrite or --append",
            path.display()
        ))
        .into());
    }

    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("File '{}' already exists", path.display()))
        .items(&["Overwrite", "Append", "Cancel"])
        .default(2)
        .interact_opt()
        .map_err(map_prompt_error)?;
    Ok(match choice {
        Some(0) => FileAction::Overwrite,
        Some(1) => FileAction::Append,
        _ => FileAction::Cancel,
    })
}

/// Write entries as CSV rows.
///
/// The header is written when the file is created, overwritten or still
/// empty. Returns the number of rows written.
pub(crate) fn write_entries(path: &Path, entries: &[Entry], action: FileAction) -> Result<usize> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let mut options = OpenOptions::new();
    if action.truncates() {
        options.write(true).create(true).truncate(true);
    } else {
        options.append(true).create(true);
    }
    let file = options
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let is_empty = file.metadata().map(|m| m.len() == 0).unwrap_or(true);

    let mut writer = BufWriter::new(file);
    if action.truncates() || is_empty {
        writeln!(writer, "{CSV_HEADER}")?;
    }
    for entry in entries {
        writeln!(writer, "{}", entry.to_csv_row())?;
    }
    writer.flush()?;
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use lhtlog::parse_entry;
    use tempfile::tempdir;

    use super::*;

    fn sample_entries() -> Vec<Entry> {
        [
            "0001 date=2024-01-01 time=10:00:00 var=1 bat=3.6 temp=21.5 hum=45 light=100",
            "0002 date=2024-01-01 time=10:20:00 var=1 bat=3.6 temp=21.4 hum=46 light=98",
        ]
        .iter()
        .filter_map(|line| parse_entry(line))
        .collect()
    }

    #[test]
    fn test_from_flags() {
        assert_eq!(FileAction::from_flags(true, false), Some(FileAction::Overwrite));
        assert_eq!(FileAction::from_flags(false, true), Some(FileAction::Append));
        assert_eq!(FileAction::from_flags(false, false), None);
    }

    #[test]
    fn test_new_file_is_created_regardless_of_flags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("260B1234.csv");
        assert_eq!(
            choose_action(&path, Some(FileAction::Append), true).unwrap(),
            FileAction::Create
        );
    }

    #[test]
    fn test_existing_file_non_interactive_needs_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("260B1234.csv");
        fs::write(&path, "x\n").unwrap();

        let err = choose_action(&path, None, true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
        assert_eq!(
            choose_action(&path, Some(FileAction::Overwrite), true).unwrap(),
            FileAction::Overwrite
        );
    }

    #[test]
    fn test_create_writes_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("260B1234.csv");

        let written = write_entries(&path, &sample_entries(), FileAction::Create).unwrap();
        assert_eq!(written, 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "0001,2024-01-01,10:00:00,1,3.6,21.5,45,100");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_append_skips_header_on_non_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        write_entries(&path, &sample_entries(), FileAction::Create).unwrap();
        write_entries(&path, &sample_entries()[..1], FileAction::Append).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(CSV_HEADER).count(), 1);
        assert_eq!(content.lines().count(), 4);
    }

    #[test]
    fn test_append_to_empty_file_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").unwrap();

        write_entries(&path, &sample_entries(), FileAction::Append).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(CSV_HEADER));
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "stale,row\nmore,stale\n").unwrap();

        write_entries(&path, &sample_entries()[1..], FileAction::Overwrite).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("stale"));
        assert_eq!(content.lines().count(), 2);
    }
}
