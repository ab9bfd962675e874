//! Shared-library extensions.
//!
//! A package ships `lib<package>.{so,dylib,dll}` next to its manifest. The
//! library exports two symbols built with the same toolchain as the host:
//!
//! - `parabox_extension_lib_version: fn() -> u32`
//! - `parabox_connection_<Class>: fn() -> Box<dyn ParaboxConnection>`, where
//!   `<Class>` is the entry class with every non-alphanumeric byte replaced by `_`.
#![allow(unsafe_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use {
    libloading::{Library, Symbol},
    tracing::debug,
};

use crate::{
    bridge::ParaboxConnection,
    descriptor::{ExternalPackage, LoadError},
    loader::{ConnectionFactory, resolver::ClassResolver},
};

const LIB_VERSION_SYMBOL: &[u8] = b"parabox_extension_lib_version";

type LibVersionFn = fn() -> u32;
type ConstructorFn = fn() -> Box<dyn ParaboxConnection>;

/// Opens extension libraries and keeps them loaded for the life of the process.
pub struct NativeClassResolver {
    min_lib_version: u32,
    libraries: Mutex<HashMap<PathBuf, Arc<Library>>>,
}

impl NativeClassResolver {
    pub fn new(min_lib_version: u32) -> Self {
        Self {
            min_lib_version,
            libraries: Mutex::new(HashMap::new()),
        }
    }

    fn open(&self, path: &Path) -> Result<Arc<Library>, LoadError> {
        let mut libraries = self.libraries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lib) = libraries.get(path) {
            return Ok(Arc::clone(lib));
        }
        let lib = unsafe { Library::new(path) }.map_err(|e| LoadError::Io(e.to_string()))?;
        let lib = Arc::new(lib);
        libraries.insert(path.to_path_buf(), Arc::clone(&lib));
        debug!(path = %path.display(), "extension library loaded");
        Ok(lib)
    }
}

pub fn library_path(package: &ExternalPackage) -> PathBuf {
    let stem = package.package.replace(['.', '-'], "_");
    package.root.join(libloading::library_filename(stem))
}

pub fn constructor_symbol(class: &str) -> Vec<u8> {
    let mangled: String = class
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("parabox_connection_{mangled}").into_bytes()
}

impl ClassResolver for NativeClassResolver {
    fn resolve(&self, package: &ExternalPackage) -> Result<Arc<dyn ConnectionFactory>, LoadError> {
        let path = library_path(package);
        if !path.is_file() {
            return Err(LoadError::ClassNotFound(package.class.clone()));
        }
        let library = self.open(&path)?;

        let declared = unsafe {
            let version: Symbol<'_, LibVersionFn> = library
                .get(LIB_VERSION_SYMBOL)
                .map_err(|e| LoadError::TypeMismatch(e.to_string()))?;
            version()
        };
        if declared < self.min_lib_version {
            return Err(LoadError::IncompatibleVersion {
                declared,
                minimum: self.min_lib_version,
            });
        }

        let symbol = constructor_symbol(&package.class);
        let constructor = unsafe {
            let ctor: Symbol<'_, ConstructorFn> = library
                .get(&symbol)
                .map_err(|_| LoadError::ClassNotFound(package.class.clone()))?;
            *ctor
        };
        Ok(Arc::new(NativeFactory {
            constructor,
            _library: library,
        }))
    }
}

struct NativeFactory {
    constructor: ConstructorFn,
    // Keeps the code behind `constructor` mapped.
    _library: Arc<Library>,
}

impl ConnectionFactory for NativeFactory {
    fn create(&self) -> Result<Arc<dyn ParaboxConnection>, LoadError> {
        Ok(Arc::from((self.constructor)()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_symbol_is_mangled() {
        assert_eq!(
            constructor_symbol("org.example.tg.TgConnection"),
            b"parabox_connection_org_example_tg_TgConnection".to_vec()
        );
    }

    #[test]
    fn missing_library_is_class_not_found() {
        let resolver = NativeClassResolver::new(1);
        let pkg = ExternalPackage {
            package: "org.example.none".into(),
            class: "org.example.none.Conn".into(),
            version: "1".into(),
            version_code: 1,
            lib_version: 1,
            root: PathBuf::from("/nonexistent"),
        };
        assert!(matches!(
            resolver.resolve(&pkg),
            Err(LoadError::ClassNotFound(_))
        ));
    }
}
