//! Extension manifests
//!
//! Every extension archive is a directory carrying an `extension.json`
//! manifest with two required attributes: the manager type name and the
//! extension's registered name.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ExtensionError;

/// File name of the manifest inside an extension archive.
pub const MANIFEST_FILE: &str = "extension.json";

/// Parsed manifest of one extension archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionManifest {
    /// Name primitives are qualified with (`name:prim`).
    pub extension_name: String,
    /// Catalog type name of the plugin implementing the load/unload and
    /// primitive-registration contract.
    pub class_manager: String,
    /// Extension API version the archive was built against. A mismatch is
    /// a soft, user-confirmable warning.
    #[serde(default)]
    pub api_version: Option<String>,
    /// Whether unqualified primitive lookups may resolve into this
    /// extension.
    #[serde(default)]
    pub auto_import: bool,
}

/// Read and parse the manifest inside `archive`.
pub fn read_manifest(archive: &Path) -> Result<ExtensionManifest, ExtensionError> {
    let path: PathBuf = archive.join(MANIFEST_FILE);
    if !path.is_file() {
        return Err(ExtensionError::MissingManifest(archive.to_path_buf()));
    }
    let data = std::fs::read_to_string(&path)?;
    serde_json::from_str(&data).map_err(|e| ExtensionError::InvalidManifest {
        path,
        detail: e.to_string(),
    })
}
