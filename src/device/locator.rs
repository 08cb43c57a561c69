//! hidraw discovery through sysfs
//!
//! Each `/dev/hidrawN` has a `uevent` file under
//! `/sys/class/hidraw/hidrawN/device/` carrying the USB identity and the
//! physical port path:
//!
//! ```text
//! HID_ID=0003:000004B4:00002412
//! HID_PHYS=usb-0000:0b:00.3-3.3.1.2/input2
//! ```
//!
//! The controller exposes several HID interfaces with the same identity, so
//! the port path is what singles out the one carrying gamepad reports.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

const USB_BUS: u32 = 0x0003;

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("Invalid HID_PHYS pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to list {path}: {source}")]
    ListDevices {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How the `HID_PHYS` value of a candidate is matched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhysSignature {
    /// First interface with the right identity wins
    #[default]
    Any,
    Exact(String),
    /// Regular expression searched in the value
    Pattern(String),
}

/// Identity of the physical controller to bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub vendor_id: u16,
    pub product_id: u16,
    pub phys: PhysSignature,
}

/// Fields of a hidraw `uevent` file relevant for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidIdentity {
    pub bus: u32,
    pub vendor_id: u32,
    pub product_id: u32,
    pub phys: String,
}

impl HidIdentity {
    /// Parses `uevent` content. Returns `None` when `HID_ID` or `HID_PHYS`
    /// is missing or malformed.
    pub fn parse(uevent: &str) -> Option<Self> {
        let mut id = None;
        let mut phys = None;

        for line in uevent.lines() {
            if let Some(value) = line.strip_prefix("HID_ID=") {
                id = parse_hid_id(value.trim());
            } else if let Some(value) = line.strip_prefix("HID_PHYS=") {
                phys = Some(value.trim().to_string());
            }
        }

        let (bus, vendor_id, product_id) = id?;
        Some(Self {
            bus,
            vendor_id,
            product_id,
            phys: phys.filter(|p| !p.is_empty())?,
        })
    }
}

fn parse_hid_id(value: &str) -> Option<(u32, u32, u32)> {
    let mut parts = value.split(':');
    let bus = u32::from_str_radix(parts.next()?, 16).ok()?;
    let vendor = u32::from_str_radix(parts.next()?, 16).ok()?;
    let product = u32::from_str_radix(parts.next()?, 16).ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((bus, vendor, product))
}

enum PhysMatcher {
    Any,
    Exact(String),
    Pattern(Regex),
}

impl PhysMatcher {
    fn matches(&self, phys: &str) -> bool {
        match self {
            PhysMatcher::Any => true,
            PhysMatcher::Exact(expected) => phys == expected,
            PhysMatcher::Pattern(regex) => regex.is_match(phys),
        }
    }
}

/// Finds the hidraw node of a [`DeviceTarget`].
pub struct SysfsLocator {
    dev_dir: PathBuf,
    sysfs_dir: PathBuf,
    vendor_id: u16,
    product_id: u16,
    phys: PhysMatcher,
}

impl SysfsLocator {
    pub fn new(target: &DeviceTarget) -> Result<Self, LocatorError> {
        Self::with_roots(target, "/dev", "/sys/class/hidraw")
    }

    /// Locator rooted somewhere else than `/dev` and `/sys/class/hidraw`.
    pub fn with_roots(
        target: &DeviceTarget,
        dev_dir: impl Into<PathBuf>,
        sysfs_dir: impl Into<PathBuf>,
    ) -> Result<Self, LocatorError> {
        let phys = match &target.phys {
            PhysSignature::Any => PhysMatcher::Any,
            PhysSignature::Exact(value) => PhysMatcher::Exact(value.clone()),
            PhysSignature::Pattern(pattern) => PhysMatcher::Pattern(
                Regex::new(pattern).map_err(|source| LocatorError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?,
            ),
        };

        Ok(Self {
            dev_dir: dev_dir.into(),
            sysfs_dir: sysfs_dir.into(),
            vendor_id: target.vendor_id,
            product_id: target.product_id,
            phys,
        })
    }

    /// Path of the first matching hidraw node in name order, `None` when no
    /// candidate matches.
    pub fn locate(&self) -> Result<Option<PathBuf>, LocatorError> {
        let entries = fs::read_dir(&self.dev_dir).map_err(|source| LocatorError::ListDevices {
            path: self.dev_dir.clone(),
            source,
        })?;

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with("hidraw"))
            .collect();
        names.sort_by_key(|name| hidraw_index(name));
        debug!("Found {} hidraw candidates", names.len());

        for name in names {
            let Some(identity) = self.read_identity(&name) else {
                continue;
            };
            debug!(
                "{}: bus {:04x} id {:04x}:{:04x} phys {}",
                name, identity.bus, identity.vendor_id, identity.product_id, identity.phys
            );

            if self.matches(&identity) {
                let path = self.dev_dir.join(&name);
                info!("Matched controller at {}", path.display());
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    fn read_identity(&self, name: &str) -> Option<HidIdentity> {
        let uevent_path = self.sysfs_dir.join(name).join("device").join("uevent");
        match fs::read_to_string(&uevent_path) {
            Ok(content) => HidIdentity::parse(&content),
            Err(e) => {
                warn!("Skipping {}: {}", uevent_path.display(), e);
                None
            }
        }
    }

    fn matches(&self, identity: &HidIdentity) -> bool {
        identity.bus == USB_BUS
            && identity.vendor_id == u32::from(self.vendor_id)
            && identity.product_id == u32::from(self.product_id)
            && self.phys.matches(&identity.phys)
    }
}

/// Numeric order so that `hidraw10` sorts after `hidraw9`.
fn hidraw_index(name: &str) -> (u32, String) {
    let index = name
        .strip_prefix("hidraw")
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX);
    (index, name.to_string())
}
