//! TOML configuration
//!
//! Missing sections and keys fall back to the defaults below, which describe
//! a Vader 4 Pro on the observed firmware.

use crate::bridge::BridgeSettings;
use crate::controller::ButtonMapVariant;
use crate::device::{DeviceTarget, PhysSignature};
use color_eyre::eyre::{eyre, Result, WrapErr};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "flydigi-bridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub bridge: LoopConfig,
    pub hiding: HidingConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    #[serde(with = "hex_id")]
    pub vendor_id: u16,
    #[serde(with = "hex_id")]
    pub product_id: u16,
    pub variant: ButtonMapVariant,
    /// Name of the virtual joystick
    pub name: String,
    /// Kept last so it serializes after the plain keys
    pub phys: PhysSignature,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x04b4,
            product_id: 0x2412,
            variant: ButtonMapVariant::Standard,
            name: "Vader4Pro DInput".to_string(),
            phys: PhysSignature::Exact("usb-0000:0b:00.3-3.3.1.2/input2".to_string()),
        }
    }
}

impl DeviceConfig {
    pub fn target(&self) -> DeviceTarget {
        DeviceTarget {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            phys: self.phys.clone(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct LoopConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_consecutive_short_reads: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HidingConfig {
    pub enabled: bool,
    pub rule_path: PathBuf,
}

impl Default for HidingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rule_path: PathBuf::from("/etc/udev/rules.d/99-flydigi-bridge-hide.rules"),
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Loads `explicit` if given (it must exist), otherwise the default
    /// location, writing the defaults there when nothing exists yet.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::read(path).await?,
            None => match Self::default_path() {
                Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => {
                    Self::read(&path).await?
                }
                Some(path) => {
                    let config = Self::default();
                    if let Err(e) = config.write(&path).await {
                        warn!(
                            "Could not write default config to {}: {}",
                            path.display(),
                            e
                        );
                    }
                    config
                }
                None => {
                    warn!("No config directory available, using defaults");
                    Self::default()
                }
            },
        };

        config.validate()?;
        debug!("Effective config: {:?}", config);
        Ok(config)
    }

    async fn read(path: &Path) -> Result<Self> {
        info!("Loading config from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;
        info!("Wrote default config to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.name.trim().is_empty() {
            return Err(eyre!("device.name must not be empty"));
        }
        if self.bridge.read_timeout_ms == Some(0) {
            return Err(eyre!("bridge.read_timeout_ms must be positive"));
        }
        if self.bridge.max_consecutive_short_reads == Some(0) {
            return Err(eyre!("bridge.max_consecutive_short_reads must be positive"));
        }
        if let PhysSignature::Pattern(pattern) = &self.device.phys {
            Regex::new(pattern).map_err(|e| eyre!("Invalid device.phys pattern: {}", e))?;
        }
        Ok(())
    }

    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            variant: self.device.variant,
            read_timeout: self.bridge.read_timeout_ms.map(Duration::from_millis),
            max_consecutive_short_reads: self.bridge.max_consecutive_short_reads,
            ..BridgeSettings::default()
        }
    }
}

/// USB ids as the 4-digit hex strings used by sysfs and lsusb.
mod hex_id {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &u16, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:04x}", id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let digits = raw.trim_start_matches("0x");
        u16::from_str_radix(digits, 16)
            .map_err(|_| de::Error::custom(format!("'{}' is not a 16-bit hex id", raw)))
    }
}
