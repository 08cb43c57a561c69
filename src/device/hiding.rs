//! Hides the physical controller's evdev/joystick nodes from applications
//! while the bridge runs, so games only see the virtual joystick.
//!
//! Best effort: callers log failures and carry on. The hidraw node is not
//! touched.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum HideError {
    #[error("Failed to write {path}: {source}")]
    WriteRule {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    RemoveRule {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to run udevadm {args}: {source}")]
    Spawn {
        args: String,
        #[source]
        source: io::Error,
    },

    #[error("udevadm {args} exited with {status}")]
    Udevadm {
        args: String,
        status: std::process::ExitStatus,
    },
}

pub struct UdevHider {
    rule_path: PathBuf,
    vendor_id: u16,
    product_id: u16,
}

impl UdevHider {
    pub fn new(rule_path: impl Into<PathBuf>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            rule_path: rule_path.into(),
            vendor_id,
            product_id,
        }
    }

    pub fn rule_path(&self) -> &Path {
        &self.rule_path
    }

    pub fn render_rule(&self) -> String {
        format!(
            "# Installed by flydigi-bridge; removed again on exit.\n\
             SUBSYSTEM==\"input\", KERNEL==\"event*|js*\", \
             ATTRS{{idVendor}}==\"{:04x}\", ATTRS{{idProduct}}==\"{:04x}\", \
             MODE=\"0000\", ENV{{ID_INPUT_JOYSTICK}}=\"\"\n",
            self.vendor_id, self.product_id
        )
    }

    pub async fn install_hide_rule(&self) -> Result<(), HideError> {
        self.write_rule().await?;
        reload_rules().await?;
        info!(
            "Physical controller hidden via {}",
            self.rule_path.display()
        );
        Ok(())
    }

    pub async fn remove_hide_rule(&self) -> Result<(), HideError> {
        if self.remove_rule().await? {
            reload_rules().await?;
            info!("Physical controller visible again");
        }
        Ok(())
    }

    async fn write_rule(&self) -> Result<(), HideError> {
        if let Some(parent) = self.rule_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| HideError::WriteRule {
                    path: self.rule_path.clone(),
                    source,
                })?;
        }
        tokio::fs::write(&self.rule_path, self.render_rule())
            .await
            .map_err(|source| HideError::WriteRule {
                path: self.rule_path.clone(),
                source,
            })
    }

    /// Returns whether a rule file was actually removed.
    async fn remove_rule(&self) -> Result<bool, HideError> {
        match tokio::fs::remove_file(&self.rule_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No hide rule at {}", self.rule_path.display());
                Ok(false)
            }
            Err(source) => Err(HideError::RemoveRule {
                path: self.rule_path.clone(),
                source,
            }),
        }
    }
}

async fn reload_rules() -> Result<(), HideError> {
    udevadm(&["control", "--reload-rules"]).await?;
    udevadm(&["trigger", "--subsystem-match=input"]).await
}

async fn udevadm(args: &[&str]) -> Result<(), HideError> {
    let joined = args.join(" ");
    debug!("Running udevadm {}", joined);
    let status = Command::new("udevadm")
        .args(args)
        .status()
        .await
        .map_err(|source| HideError::Spawn {
            args: joined.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(HideError::Udevadm {
            args: joined,
            status,
        })
    }
}
