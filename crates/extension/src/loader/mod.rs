//! Extension discovery and instantiation.
//!
//! Built-ins come first, then every package directory under the configured
//! search paths. A candidate that fails validation becomes an error entry in
//! the scan result; it never stops the scan.

pub mod builtin;
pub mod manifest;
#[cfg(feature = "native")]
pub mod native;
pub mod resolver;

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

use crate::{
    bridge::ParaboxConnection,
    connection::{Connection, ConnectionRecord},
    descriptor::{ExtensionDescriptor, ExtensionError, LoadError, Provenance},
};

use self::{
    builtin::BuiltInRegistry,
    manifest::{ExtensionManifest, declared_package, manifest_path},
    resolver::{ClassResolver, StaticClassTable},
};

pub type ScanResult = Result<ExtensionDescriptor, ExtensionError>;

/// Lowest interface version the host still accepts by default.
pub const DEFAULT_MIN_LIB_VERSION: u32 = 1;

/// Builds fresh instances of one extension class.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn ParaboxConnection>, LoadError>;
}

#[async_trait]
pub trait ExtensionLoader: Send + Sync {
    async fn scan_all(&self) -> Vec<ScanResult>;

    /// Same validation as [`scan_all`](Self::scan_all), narrowed to one
    /// package name or built-in key.
    async fn scan_one(&self, package: &str) -> Vec<ScanResult>;

    /// Build a `Pending` connection around a fresh instance, or a `Failed`
    /// one if the class cannot be resolved or constructed.
    fn instantiate_connection(&self, record: ConnectionRecord) -> Connection;
}

pub struct DefaultLoader {
    builtins: BuiltInRegistry,
    search_paths: Vec<PathBuf>,
    min_lib_version: u32,
    resolver: Arc<dyn ClassResolver>,
}

impl DefaultLoader {
    pub fn new(builtins: BuiltInRegistry) -> Self {
        Self {
            builtins,
            search_paths: Vec::new(),
            min_lib_version: DEFAULT_MIN_LIB_VERSION,
            resolver: Arc::new(StaticClassTable::new()),
        }
    }

    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn with_min_lib_version(mut self, version: u32) -> Self {
        self.min_lib_version = version;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ClassResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn builtins(&self) -> &BuiltInRegistry {
        &self.builtins
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Package directories under every search path, sorted per path so scan
    /// order is stable.
    fn package_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for base in &self.search_paths {
            if !base.is_dir() {
                continue;
            }
            let entries = match std::fs::read_dir(base) {
                Ok(e) => e,
                Err(e) => {
                    warn!(path = %base.display(), error = %e, "failed to read extension directory");
                    continue;
                },
            };
            let mut found: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_dir() && manifest_path(path).is_file())
                .collect();
            found.sort();
            dirs.extend(found);
        }
        dirs
    }

    /// Validate one package directory. `None` means it is not an extension.
    fn scan_dir(&self, dir: &Path) -> Option<ScanResult> {
        let path = manifest_path(dir);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                return Some(Err(
                    ExtensionError::new(LoadError::Io(e.to_string())).at(&path)
                ));
            },
        };
        let manifest = match ExtensionManifest::parse(&raw) {
            Ok(m) => m,
            Err(reason) => return Some(Err(ExtensionError::new(reason).at(&path))),
        };
        if !manifest.is_extension() {
            debug!(path = %path.display(), "package does not declare the extension feature");
            return None;
        }
        Some(self.validate(manifest, dir))
    }

    fn validate(&self, manifest: ExtensionManifest, dir: &Path) -> ScanResult {
        let (package, info) = manifest.into_package(dir.to_path_buf());
        let key = package.key();
        let fail = |reason: LoadError| {
            ExtensionError::new(reason)
                .with_key(key.clone())
                .at(dir.to_path_buf())
        };

        if package.lib_version < self.min_lib_version {
            return Err(fail(LoadError::IncompatibleVersion {
                declared: package.lib_version,
                minimum: self.min_lib_version,
            }));
        }
        self.resolver.resolve(&package).map_err(&fail)?;

        Ok(ExtensionDescriptor {
            name: info.name,
            icon: info.icon,
            description: info.description,
            key,
            provenance: Provenance::External(package),
            config_items: info.config,
        })
    }

    /// Package a directory claims to hold. A manifest too broken to name
    /// its package is attributed to the directory name, so narrowed scans
    /// still report it.
    fn package_name_of(dir: &Path) -> Option<String> {
        std::fs::read_to_string(manifest_path(dir))
            .ok()
            .as_deref()
            .and_then(declared_package)
            .or_else(|| dir.file_name().map(|name| name.to_string_lossy().into_owned()))
    }

    fn log_results(results: &[ScanResult]) {
        for result in results {
            match result {
                Ok(d) => debug!(key = %d.key, name = %d.name, "extension found"),
                Err(e) => warn!(error = %e, "extension rejected"),
            }
        }
    }
}

#[async_trait]
impl ExtensionLoader for DefaultLoader {
    async fn scan_all(&self) -> Vec<ScanResult> {
        let mut results: Vec<ScanResult> = self.builtins.descriptors().cloned().map(Ok).collect();
        results.extend(
            self.package_dirs()
                .iter()
                .filter_map(|dir| self.scan_dir(dir)),
        );
        Self::log_results(&results);
        info!(
            loaded = results.iter().filter(|r| r.is_ok()).count(),
            rejected = results.iter().filter(|r| r.is_err()).count(),
            "extension scan complete"
        );
        results
    }

    async fn scan_one(&self, package: &str) -> Vec<ScanResult> {
        if let Some(builtin) = self.builtins.get(package) {
            return vec![Ok(builtin.descriptor.clone())];
        }
        let results: Vec<ScanResult> = self
            .package_dirs()
            .iter()
            .filter(|dir| Self::package_name_of(dir).as_deref() == Some(package))
            .filter_map(|dir| self.scan_dir(dir))
            .collect();
        Self::log_results(&results);
        results
    }

    fn instantiate_connection(&self, record: ConnectionRecord) -> Connection {
        let factory = match &record.descriptor.provenance {
            Provenance::BuiltIn => self
                .builtins
                .factory(&record.descriptor.key)
                .ok_or_else(|| LoadError::ClassNotFound(record.descriptor.key.clone())),
            Provenance::External(package) => self.resolver.resolve(package),
        };
        let created = factory.and_then(|factory| {
            catch_unwind(AssertUnwindSafe(|| factory.create())).unwrap_or_else(|_| {
                Err(LoadError::Instantiation("factory panicked".into()))
            })
        });

        match created {
            Ok(instance) => {
                debug!(
                    connection_id = record.connection_id,
                    key = %record.descriptor.key,
                    "extension instance created"
                );
                Connection::pending(record, instance)
            },
            Err(reason) => {
                warn!(
                    connection_id = record.connection_id,
                    key = %record.descriptor.key,
                    error = %reason,
                    "failed to instantiate extension"
                );
                Connection::failed(record, reason.to_string())
            },
        }
    }
}
