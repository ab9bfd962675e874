//! Extension identity and discovery errors.

use std::{fmt, path::PathBuf};

use serde::Serialize;

use crate::config_item::ConfigItem;

/// Where an extension's code comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "provenance", rename_all = "snake_case")]
pub enum Provenance {
    /// Compiled into the host.
    BuiltIn,
    /// Installed as a separate package.
    External(ExternalPackage),
}

/// Metadata of an installed extension package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalPackage {
    pub package: String,
    /// Fully qualified connection class, already expanded against `package`.
    pub class: String,
    pub version: String,
    pub version_code: i64,
    /// Interface version the package was built against.
    pub lib_version: u32,
    pub root: PathBuf,
}

impl ExternalPackage {
    pub fn key(&self) -> String {
        external_key(&self.package, &self.class)
    }
}

/// Stable key of an external extension.
pub fn external_key(package: &str, class: &str) -> String {
    format!("{package}+{class}")
}

/// Expand a class name that starts with `.` against its package, the way
/// manifests abbreviate classes living in the package's own namespace.
pub fn qualify_class(package: &str, class: &str) -> String {
    if class.starts_with('.') {
        format!("{package}{class}")
    } else {
        class.to_string()
    }
}

/// Identity and metadata of a loadable extension.
///
/// Created at scan time and never mutated; a rescan builds fresh values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub icon: Option<String>,
    pub description: String,
    pub key: String,
    #[serde(flatten)]
    pub provenance: Provenance,
    /// Settings the setup wizard asks for before the first init.
    pub config_items: Vec<ConfigItem>,
}

impl ExtensionDescriptor {
    pub fn built_in(
        key: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            icon: None,
            description: description.into(),
            key: key.into(),
            provenance: Provenance::BuiltIn,
            config_items: Vec::new(),
        }
    }

    pub fn with_config_items(mut self, items: Vec<ConfigItem>) -> Self {
        self.config_items = items;
        self
    }

    pub fn is_built_in(&self) -> bool {
        matches!(self.provenance, Provenance::BuiltIn)
    }

    pub fn external(&self) -> Option<&ExternalPackage> {
        match &self.provenance {
            Provenance::External(pkg) => Some(pkg),
            Provenance::BuiltIn => None,
        }
    }
}

/// Why one extension could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("malformed metadata: {0}")]
    Malformed(String),

    #[error("incompatible version")]
    IncompatibleVersion { declared: u32, minimum: u32 },

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("instantiation failed: {0}")]
    Instantiation(String),
}

/// A per-candidate discovery failure. Scans collect these alongside the
/// descriptors that did load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionError {
    pub key: Option<String>,
    pub source_path: Option<PathBuf>,
    pub reason: LoadError,
}

impl ExtensionError {
    pub fn new(reason: LoadError) -> Self {
        Self {
            key: None,
            source_path: None,
            reason,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn at(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}

impl fmt::Display for ExtensionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.key, &self.source_path) {
            (Some(key), _) => write!(f, "{key}: {}", self.reason),
            (None, Some(path)) => write!(f, "{}: {}", path.display(), self.reason),
            (None, None) => write!(f, "{}", self.reason),
        }
    }
}

impl std::error::Error for ExtensionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}
