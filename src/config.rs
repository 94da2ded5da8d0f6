// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Settings live in `config.toml` under the user's config directory and
//! are written with defaults on first run.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::obex::MAX_PACKET_SIZE;
use crate::soap::JobTicket;

const APP_DIR: &str = "bpp-print";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the share database lives.
    #[serde(skip)]
    pub data_dir: PathBuf,

    pub bluetooth: BluetoothConfig,

    pub printer: PrinterConfig,

    pub transfer: TransferConfig,

    /// Print options sent with CreateJob.
    pub job: JobTicket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Give up on an RFCOMM connect after this many seconds.
    pub connect_timeout_secs: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Formats assumed when the printer's own list is not cached yet.
    /// Empty accepts everything.
    pub supported_formats: Vec<String>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            supported_formats: [
                "text/plain",
                "text/x-vcard",
                "text/x-vcalendar",
                "application/vnd.pwg-xhtml-print+xml",
                "image/jpeg",
                "image/gif",
                "application/pdf",
                "application/postscript",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Sleep between job-channel iterations with nothing to do.
    pub idle_poll_ms: u64,
    /// Interval between GetEvent requests on the status channel.
    pub event_poll_ms: u64,
    /// Pause before marking a batch failed.
    pub fail_debounce_ms: u64,
    /// Largest OBEX packet proposed on CONNECT.
    pub max_packet_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: 500,
            event_poll_ms: 1000,
            fail_debounce_ms: 1000,
            max_packet_size: MAX_PACKET_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        std::fs::create_dir_all(&config_dir)?;

        let mut config = Self::load_from(&config_dir.join("config.toml"))?;
        config.data_dir = Self::default_data_dir()?;
        Ok(config)
    }

    /// Per-user data directory, created if missing.
    pub fn default_data_dir() -> Result<PathBuf> {
        let dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Read `path`, writing the defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_written_on_first_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.bluetooth.connect_timeout_secs, 20);
        assert_eq!(config.transfer.max_packet_size, MAX_PACKET_SIZE);

        let again = Config::load_from(&path).unwrap();
        assert_eq!(again.printer.supported_formats, config.printer.supported_formats);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[transfer]\nevent_poll_ms = 250\n\n[job]\ncopies = 3\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.transfer.event_poll_ms, 250);
        assert_eq!(config.transfer.idle_poll_ms, 500);
        assert_eq!(config.job.copies, 3);
        assert_eq!(config.job.sides, "one-sided");
    }
}
