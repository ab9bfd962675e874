//! Mapping an external package's entry class to something that can build instances.

use std::{collections::HashMap, sync::Arc};

use crate::{
    descriptor::{ExternalPackage, LoadError, external_key},
    loader::ConnectionFactory,
};

pub trait ClassResolver: Send + Sync {
    fn resolve(&self, package: &ExternalPackage) -> Result<Arc<dyn ConnectionFactory>, LoadError>;
}

/// Classes linked into the host process, keyed by `package+class`.
#[derive(Default)]
pub struct StaticClassTable {
    classes: HashMap<String, Arc<dyn ConnectionFactory>>,
}

impl StaticClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, package: &str, class: &str, factory: Arc<dyn ConnectionFactory>) {
        self.classes.insert(external_key(package, class), factory);
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassResolver for StaticClassTable {
    fn resolve(&self, package: &ExternalPackage) -> Result<Arc<dyn ConnectionFactory>, LoadError> {
        self.classes
            .get(&package.key())
            .cloned()
            .ok_or_else(|| LoadError::ClassNotFound(package.class.clone()))
    }
}

/// Tries each resolver in order. The first that does not report
/// `ClassNotFound` decides.
#[derive(Default)]
pub struct CompositeResolver {
    resolvers: Vec<Arc<dyn ClassResolver>>,
}

impl CompositeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, resolver: Arc<dyn ClassResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }
}

impl ClassResolver for CompositeResolver {
    fn resolve(&self, package: &ExternalPackage) -> Result<Arc<dyn ConnectionFactory>, LoadError> {
        for resolver in &self.resolvers {
            match resolver.resolve(package) {
                Err(LoadError::ClassNotFound(_)) => continue,
                decided => return decided,
            }
        }
        Err(LoadError::ClassNotFound(package.class.clone()))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::bridge::testing::{FakeFactory, InitBehavior},
        std::path::PathBuf,
    };

    struct Mismatch;

    impl ClassResolver for Mismatch {
        fn resolve(&self, package: &ExternalPackage) -> Result<Arc<dyn ConnectionFactory>, LoadError> {
            Err(LoadError::TypeMismatch(package.class.clone()))
        }
    }

    fn package(class: &str) -> ExternalPackage {
        ExternalPackage {
            package: "org.example".into(),
            class: class.into(),
            version: "1".into(),
            version_code: 1,
            lib_version: 1,
            root: PathBuf::from("/ext"),
        }
    }

    #[test]
    fn composite_falls_through_not_found_only() {
        let mut table = StaticClassTable::new();
        table.register(
            "org.example",
            "org.example.Conn",
            Arc::new(FakeFactory::new(InitBehavior::Succeed)),
        );
        let composite = CompositeResolver::new()
            .push(Arc::new(StaticClassTable::new()))
            .push(Arc::new(table))
            .push(Arc::new(Mismatch));

        assert!(composite.resolve(&package("org.example.Conn")).is_ok());
        assert!(matches!(
            composite.resolve(&package("org.example.Other")),
            Err(LoadError::TypeMismatch(_))
        ));
    }

    #[test]
    fn empty_composite_reports_not_found() {
        assert!(matches!(
            CompositeResolver::new().resolve(&package("x.Y")),
            Err(LoadError::ClassNotFound(class)) if class == "x.Y"
        ));
    }
}
