//! Config schema types (database, extension discovery, runtime limits, connections).

use std::{path::PathBuf, time::Duration};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParaboxConfig {
    pub database: DatabaseConfig,
    pub extensions: ExtensionsConfig,
    pub runtime: RuntimeConfig,
    /// Connections created at startup, in order.
    pub connections: Vec<ConnectionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to `parabox.db` in the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// Directories holding one extension package per subdirectory.
    /// Defaults to `extensions/` in the data directory.
    pub search_paths: Vec<PathBuf>,
    /// Packages built against an older interface version are rejected.
    pub min_lib_version: u32,
    /// Resolve package classes from shared libraries.
    pub native: bool,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            min_lib_version: 1,
            native: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub init_timeout_secs: u64,
    pub call_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            init_timeout_secs: 30,
            call_timeout_secs: 15,
        }
    }
}

impl RuntimeConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// One configured connection: which extension serves it and its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub alias: String,
    /// Extension key, e.g. `onebot11` or `package+class`.
    pub extension: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl ParaboxConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| crate::data_dir().join("parabox.db"))
    }

    pub fn extension_search_paths(&self) -> Vec<PathBuf> {
        if self.extensions.search_paths.is_empty() {
            vec![crate::data_dir().join("extensions")]
        } else {
            self.extensions.search_paths.clone()
        }
    }

    /// Aliases that appear more than once.
    pub fn duplicate_aliases(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates = Vec::new();
        for entry in &self.connections {
            if !seen.insert(entry.alias.as_str()) && !duplicates.contains(&entry.alias.as_str()) {
                duplicates.push(entry.alias.as_str());
            }
        }
        duplicates
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config: ParaboxConfig = toml::from_str("").unwrap();
        assert_eq!(config, ParaboxConfig::default());
        assert_eq!(config.extensions.min_lib_version, 1);
        assert_eq!(config.runtime.init_timeout(), Duration::from_secs(30));
        assert_eq!(config.runtime.call_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn connections_keep_free_form_config() {
        let config: ParaboxConfig = toml::from_str(
            r#"
            [runtime]
            init_timeout_secs = 5

            [[connections]]
            alias = "qq"
            extension = "onebot11"
            config = { host = "127.0.0.1", port = 6700, auto_reconnect = true }

            [[connections]]
            alias = "qq"
            extension = "onebot11"
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.init_timeout_secs, 5);
        assert_eq!(config.runtime.call_timeout_secs, 15);
        assert_eq!(config.connections[0].config["port"], 6700);
        assert!(config.connections[1].config.is_empty());
        assert_eq!(config.duplicate_aliases(), ["qq"]);
    }

    #[test]
    fn explicit_paths_win() {
        let mut config = ParaboxConfig::default();
        config.database.path = Some(PathBuf::from("/var/lib/parabox/inbox.db"));
        config.extensions.search_paths = vec![PathBuf::from("/opt/parabox/ext")];
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/parabox/inbox.db")
        );
        assert_eq!(config.extension_search_paths(), vec![PathBuf::from(
            "/opt/parabox/ext"
        )]);
    }
}
