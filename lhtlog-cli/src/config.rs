//! Configuration file support for lhtlog.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (LHTLOG_*)
//! 3. Local config file (./lhtlog.toml)
//! 4. Global config file (~/.config/lhtlog/config.toml)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use lhtlog::protocol::at::{BOOT_DIAGNOSTIC_LINES, BOOT_KEYWORD};
use lhtlog::{BootRace, SessionTiming};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Name of the local configuration file.
pub const LOCAL_CONFIG: &str = "lhtlog.toml";

/// Default directory for exported CSV files.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Device configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unlock password.
    pub password: Option<String>,
    /// Inactivity timeout ending a command reply, in milliseconds.
    pub command_timeout_ms: Option<u64>,
    /// Keyword of the boot banner.
    pub boot_keyword: Option<String>,
    /// Banner lines captured after the keyword.
    pub boot_lines: Option<usize>,
}

/// Export configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory holding per-device CSV files.
    pub data_dir: Option<PathBuf>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Device configuration.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Export configuration.
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lhtlog").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; set values in `other` win.
    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }

        if other.device.password.is_some() {
            self.device.password = other.device.password;
        }
        if other.device.command_timeout_ms.is_some() {
            self.device.command_timeout_ms = other.device.command_timeout_ms;
        }
        if other.device.boot_keyword.is_some() {
            self.device.boot_keyword = other.device.boot_keyword;
        }
        if other.device.boot_lines.is_some() {
            self.device.boot_lines = other.device.boot_lines;
        }

        if other.export.data_dir.is_some() {
            self.export.data_dir = other.export.data_dir;
        }
    }

    /// Configured password, if any.
    pub fn password(&self) -> Option<&str> {
        self.device.password.as_deref()
    }

    /// Session timing with the configured command timeout applied.
    pub fn session_timing(&self) -> SessionTiming {
        let mut timing = SessionTiming::default();
        if let Some(ms) = self.device.command_timeout_ms {
            timing.command_timeout = Duration::from_millis(ms);
        }
        timing
    }

    /// Boot race with the configured keyword and line count.
    pub fn boot_race(&self) -> BootRace {
        BootRace::new(
            self.device
                .boot_keyword
                .as_deref()
                .unwrap_or(BOOT_KEYWORD),
            self.device
                .boot_lines
                .unwrap_or(BOOT_DIAGNOSTIC_LINES),
        )
    }

    /// Directory holding exported CSV files.
    pub fn data_dir(&self) -> PathBuf {
        self.export
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }
}
