//! `merge`: combine per-device CSV exports into one table.
//!
//! The device table is a CSV with an `id,device_address` header. Rows of
//! `<data_dir>/<address>.csv` are prefixed with the table row and written to
//! `<data_dir>/merged_<YYYYmmdd_HHMMSS>.csv`.

use std::fs;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use log::{debug, warn};

use crate::config::Config;

/// Default device table file.
pub(crate) const DEFAULT_TABLE: &str = "device_addresses.csv";

/// Outcome of a merge.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct MergeSummary {
    /// Device files merged.
    pub devices: usize,
    /// Data rows written.
    pub rows: usize,
    /// Addresses without a device file.
    pub missing: Vec<String>,
}

/// Merge command implementation.
pub(crate) fn cmd_merge(config: &Config, table: &Path) -> Result<()> {
    let data_dir = config.data_dir();
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let output = data_dir.join(format!("merged_{stamp}.csv"));

    let summary = merge_device_files(table, &data_dir, &output)?;
    for address in &summary.missing {
        warn!("No export found for device {address}");
    }
    eprintln!(
        "{} Merged {} rows from {} devices into {}",
        style("✓").green(),
        summary.rows,
        summary.devices,
        output.display()
    );
    Ok(())
}

/// Merge the device files listed in `table` into `output`.
pub(crate) fn merge_device_files(table: &Path, data_dir: &Path, output: &Path) -> Result<MergeSummary> {
    let table_content = fs::read_to_string(table)
        .with_context(|| format!("Failed to read device table {}", table.display()))?;
    let mut table_lines = table_content.lines().filter(|l| !l.trim().is_empty());
    let table_header = table_lines
        .next()
        .with_context(|| format!("Device table {} is empty", table.display()))?
        .trim();

    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create directory {}", data_dir.display()))?;
    let file = fs::File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);

    let mut summary = MergeSummary::default();
    let mut header_written = false;

    for row in table_lines {
        let Some((id, address)) = row.trim().split_once(',') else {
            warn!("Skipping malformed device table row: {row}");
            continue;
        };
        let (id, address) = (id.trim(), address.trim());

        let device_path = device_file(data_dir, address);
        if !device_path.exists() {
            summary.missing.push(address.to_string());
            continue;
        }
        debug!("Merging {}", device_path.display());

        let content = fs::read_to_string(&device_path)
            .with_context(|| format!("Failed to read {}", device_path.display()))?;
        let mut device_lines = content.lines();
        let device_header = device_lines.next().unwrap_or_default().trim();
        if !header_written {
            writeln!(writer, "{table_header},{device_header}")?;
            header_written = true;
        }

        for line in device_lines.map(str::trim).filter(|l| !l.is_empty()) {
            writeln!(writer, "{id},{address},{line}")?;
            summary.rows += 1;
        }
        summary.devices += 1;
    }

    writer.flush()?;
    Ok(summary)
}

fn device_file(data_dir: &Path, address: &str) -> PathBuf {
    data_dir.join(format!("{address}.csv"))
}
