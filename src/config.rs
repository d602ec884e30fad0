//! Release operator input to `create-update-package`: the fields of a
//! [`update_manifest::Manifest`] that aren't computed by the directory diff.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReleaseConfig {
    #[serde(default)]
    pub version_id: u64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub from_version_id: u64,
    #[serde(default)]
    pub release_name: Option<String>,
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default = "default_true")]
    pub restart_required: bool,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub fallback_installer_file: Option<String>,
    #[serde(default)]
    pub fallback_installer_hash: Option<String>,
    #[serde(default)]
    pub fallback_installer_arguments: Option<String>,
    #[serde(default)]
    pub full_package_file: Option<String>,
    #[serde(default)]
    pub full_package_hash: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ReleaseConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, crate::Error> {
        let text = std::fs::read_to_string(path).map_err(|err| crate::Error::Io(path.to_path_buf(), err))?;
        serde_json::from_str(&text).map_err(|err| crate::Error::MalformedManifest(err.to_string()))
    }
}
