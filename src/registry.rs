//! Device registry: which badge belongs to which participant.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// One registered badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistryEntry {
    #[serde(alias = "Participant Id")]
    pub participant_id: u16,
    /// Link-layer address of the badge.
    #[serde(alias = "Mac Address")]
    pub address: String,
    /// Whether the badge takes part in runs restricted to in-use devices.
    #[serde(alias = "Use", default = "in_use")]
    pub use_flag: bool,
}

fn in_use() -> bool {
    true
}

impl DeviceRegistryEntry {
    pub fn new(participant_id: u16, address: impl Into<String>) -> Self {
        Self {
            participant_id,
            address: address.into(),
            use_flag: true,
        }
    }

    /// Log prefix for this device.
    pub fn label(&self) -> String {
        format!("{}@{}", self.participant_id, self.address)
    }
}

/// Parse a JSON array of registry entries.
pub fn load_registry(json: &str) -> anyhow::Result<Vec<DeviceRegistryEntry>> {
    let entries: Vec<DeviceRegistryEntry> =
        serde_json::from_str(json).context("parsing device registry")?;
    let mut seen = HashSet::new();
    for entry in &entries {
        if !seen.insert(entry.participant_id) {
            bail!("duplicate participant id {}", entry.participant_id);
        }
        if entry.address.trim().is_empty() {
            bail!("participant {} has no address", entry.participant_id);
        }
    }
    Ok(entries)
}

pub fn load_registry_file(path: &Path) -> anyhow::Result<Vec<DeviceRegistryEntry>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading device registry {}", path.display()))?;
    load_registry(&json)
}
