//! Session configuration, loaded from TOML.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::payload::FirmwareImage;
use crate::protocol::constants::{
    BOOT_POLL_RETRIES, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_STARTUP_TIMEOUT_MS,
    WAKEUP_POLL_RETRIES,
};
use crate::securelink::{MacKey, SecureLinkMode};

/// Configuration for a driver session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Path to the firmware image (security header plus payload).
    pub firmware_path: Option<String>,
    /// Path to the PDS file, one compressed-JSON chunk per line.
    pub pds_path: Option<String>,
    /// Confirmation wait in milliseconds.
    pub command_timeout_ms: u64,
    /// Startup indication wait in milliseconds.
    pub startup_timeout_ms: u64,
    /// Polls of the ready bit before the chip is declared absent.
    pub wakeup_poll_retries: u32,
    /// Polls of each bootloader handshake word.
    pub boot_poll_retries: u32,
    /// Secure link mode to run the session in.
    pub secure_link_mode: SecureLinkMode,
    /// Secure link MAC key as 64 hex digits.
    pub secure_link_key: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            firmware_path: None,
            pds_path: None,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            wakeup_poll_retries: WAKEUP_POLL_RETRIES,
            boot_poll_retries: BOOT_POLL_RETRIES,
            secure_link_mode: SecureLinkMode::NotApplicable,
            secure_link_key: None,
        }
    }
}

impl DriverConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DriverConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reads and parses the firmware image named by `firmware_path`.
    pub fn load_firmware(&self) -> Result<FirmwareImage> {
        let path = self
            .firmware_path
            .as_deref()
            .ok_or_else(|| anyhow!("no firmware path configured"))?;
        info!(path = %path, "Loading firmware image");
        Ok(FirmwareImage::from_file(std::path::Path::new(path))?)
    }

    /// Reads the PDS file into per-line chunks. No file means no chunks.
    pub fn load_pds(&self) -> Result<Vec<String>> {
        let Some(path) = self.pds_path.as_deref() else {
            return Ok(Vec::new());
        };
        info!(path = %path, "Loading PDS");
        let content = std::fs::read_to_string(path)?;
        Ok(parse_pds(&content))
    }

    /// Decodes the configured MAC key. The trusted modes require one.
    pub fn mac_key(&self) -> Result<Option<MacKey>> {
        match self.secure_link_key.as_deref() {
            Some(digits) => Ok(Some(MacKey::from_hex(digits)?)),
            None if self.secure_link_mode.uses_encryption() => Err(anyhow!(
                "secure link mode {} needs a MAC key",
                self.secure_link_mode
            )),
            None => Ok(None),
        }
    }
}

/// Splits a PDS file into chunks, dropping blank lines and `#` comments.
fn parse_pds(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}
