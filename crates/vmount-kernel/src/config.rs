//! Drive configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the claimed drive: letter and volume label.
///
/// Passed explicitly into [`crate::ResourceMountingService::new`]; there is
/// no process-global drive state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Drive letter the virtual volume claims.
    pub drive_letter: char,
    /// Volume label reported to the operating system.
    #[serde(default = "default_volume_label")]
    pub volume_label: String,
}

fn default_volume_label() -> String {
    "Virtual resource access".to_string()
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            drive_letter: 'V',
            volume_label: default_volume_label(),
        }
    }
}

impl MountConfig {
    /// Create a config for the given drive letter with the default label.
    pub fn new(drive_letter: char) -> Self {
        Self {
            drive_letter,
            ..Self::default()
        }
    }

    /// The drive's mount point, e.g. `V:\`.
    pub fn mount_point(&self) -> String {
        format!("{}:\\", self.drive_letter)
    }
}
