//! Per-OS directory lookup for config and log files.

use std::path::PathBuf;
use crate::constants::APP_NAME;
use crate::error::{CourierError, CourierResult};

/// Operating system family the binary was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Platform selected at compile time.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Directory holding `config.toml`.
    ///
    /// - Windows: `%APPDATA%/Courier`
    /// - macOS: `~/Library/Application Support/Courier`
    /// - Linux: `~/.config/Courier`
    pub fn config_dir() -> CourierResult<PathBuf> {
        dirs::config_dir()
            .map(|base| base.join(APP_NAME))
            .ok_or_else(|| CourierError::Config("could not determine config directory".into()))
    }

    /// Directory for rotated log files (`<data dir>/Courier/logs`).
    pub fn log_dir() -> CourierResult<PathBuf> {
        dirs::data_dir()
            .map(|base| base.join(APP_NAME).join("logs"))
            .ok_or_else(|| CourierError::Config("could not determine data directory".into()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
