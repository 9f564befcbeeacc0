//! Network boot configuration.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use corral_core::MacAddress;
use corral_store::{BootFrom, Node};
use tracing::debug;

use crate::Result;

/// What a node should do on its next network boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootEntry<'a> {
    /// Boot the installer for a software profile.
    Install {
        /// Software profile name.
        software_profile: &'a str,
    },
    /// Hand over to the local disk.
    LocalDisk,
}

impl<'a> BootEntry<'a> {
    /// The entry matching the node's `boot_from` setting.
    #[must_use]
    pub fn for_node(node: &Node, software_profile: &'a str) -> Self {
        match node.boot_from {
            BootFrom::Network => Self::Install { software_profile },
            BootFrom::Local => Self::LocalDisk,
        }
    }
}

/// Writes and removes per-node boot configuration.
#[async_trait]
pub trait BootConfigWriter: Send + Sync {
    /// Write the boot configuration of a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    async fn write(&self, node: &Node, entry: BootEntry<'_>) -> Result<()>;

    /// Remove the boot configuration of a node. Missing files are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be removed.
    async fn remove(&self, node: &Node) -> Result<()>;
}

/// PXELINUX configuration files under a TFTP root.
#[derive(Debug, Clone)]
pub struct PxeBootWriter {
    tftp_root: PathBuf,
}

impl PxeBootWriter {
    /// Create a writer rooted at `tftp_root`.
    #[must_use]
    pub fn new(tftp_root: impl Into<PathBuf>) -> Self {
        Self {
            tftp_root: tftp_root.into(),
        }
    }

    /// The TFTP root.
    #[must_use]
    pub fn tftp_root(&self) -> &Path {
        &self.tftp_root
    }

    /// Path of the configuration file for a MAC address.
    #[must_use]
    pub fn config_path(&self, mac: &MacAddress) -> PathBuf {
        self.tftp_root
            .join("pxelinux.cfg")
            .join(format!("01-{}", mac.to_string_with("-")))
    }

    fn render(node: &Node, entry: BootEntry<'_>) -> String {
        match entry {
            BootEntry::Install { software_profile } => format!(
                "# {name}\n\
                 DEFAULT install\n\
                 PROMPT 0\n\
                 TIMEOUT 0\n\
                 \n\
                 LABEL install\n  \
                 KERNEL profiles/{software_profile}/vmlinuz\n  \
                 APPEND initrd=profiles/{software_profile}/initrd.img hostname={name}\n",
                name = node.name,
            ),
            BootEntry::LocalDisk => format!(
                "# {name}\n\
                 DEFAULT localboot\n\
                 PROMPT 0\n\
                 TIMEOUT 0\n\
                 \n\
                 LABEL localboot\n  \
                 LOCALBOOT 0\n",
                name = node.name,
            ),
        }
    }
}

#[async_trait]
impl BootConfigWriter for PxeBootWriter {
    async fn write(&self, node: &Node, entry: BootEntry<'_>) -> Result<()> {
        let Some(mac) = node.provisioning_nic().and_then(|nic| nic.mac) else {
            debug!(node = %node.name, "no provisioning MAC, skipping boot configuration");
            return Ok(());
        };

        let path = self.config_path(&mac);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, Self::render(node, entry)).await?;

        debug!(node = %node.name, path = %path.display(), ?entry, "boot configuration written");
        Ok(())
    }

    async fn remove(&self, node: &Node) -> Result<()> {
        for mac in node.macs() {
            match tokio::fs::remove_file(self.config_path(&mac)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
