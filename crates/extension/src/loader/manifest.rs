//! `parabox-extension.toml`, the metadata file of an installed extension package.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    config_item::ConfigItem,
    descriptor::{ExternalPackage, LoadError, qualify_class},
};

pub const MANIFEST_FILE: &str = "parabox-extension.toml";

/// Capability marker a package must declare to be treated as an extension.
pub const EXTENSION_FEATURE: &str = "parabox.extension";

#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionManifest {
    pub package: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub version: String,
    #[serde(default)]
    pub version_code: i64,
    pub lib_version: u32,
    #[serde(default)]
    pub features: Vec<String>,
    /// Entry class. A leading `.` is relative to `package`.
    pub class: String,
    #[serde(default)]
    pub config: Vec<ConfigItem>,
}

impl ExtensionManifest {
    pub fn parse(raw: &str) -> Result<Self, LoadError> {
        let manifest: Self =
            toml::from_str(raw).map_err(|e| LoadError::Malformed(e.message().to_string()))?;
        if manifest.package.trim().is_empty() {
            return Err(LoadError::Malformed("package is empty".into()));
        }
        if manifest.class.trim().is_empty() {
            return Err(LoadError::Malformed("class is empty".into()));
        }
        Ok(manifest)
    }

    pub fn is_extension(&self) -> bool {
        self.features.iter().any(|f| f == EXTENSION_FEATURE)
    }

    pub fn into_package(self, root: PathBuf) -> (ExternalPackage, ManifestInfo) {
        let class = qualify_class(&self.package, &self.class);
        let package = ExternalPackage {
            package: self.package,
            class,
            version: self.version,
            version_code: self.version_code,
            lib_version: self.lib_version,
            root,
        };
        let info = ManifestInfo {
            name: self.name,
            description: self.description,
            icon: self.icon,
            config: self.config,
        };
        (package, info)
    }
}

/// Display fields of a manifest, split off from the package identity.
pub struct ManifestInfo {
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub config: Vec<ConfigItem>,
}

/// The `package` key alone, read without validating the rest of the file.
/// Lets a lookup by package name find a manifest that fails [`ExtensionManifest::parse`].
pub fn declared_package(raw: &str) -> Option<String> {
    let table: toml::Table = raw.parse().ok()?;
    table
        .get("package")?
        .as_str()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}
