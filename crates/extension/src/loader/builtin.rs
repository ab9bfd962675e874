use std::sync::Arc;

use crate::{descriptor::ExtensionDescriptor, loader::ConnectionFactory};

/// An extension compiled into the host.
pub struct BuiltInExtension {
    pub descriptor: ExtensionDescriptor,
    pub factory: Arc<dyn ConnectionFactory>,
}

/// Registry of built-in extensions, in registration order.
#[derive(Default)]
pub struct BuiltInRegistry {
    extensions: Vec<BuiltInExtension>,
}

impl BuiltInRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension. A later registration with the same key replaces
    /// the earlier one.
    pub fn register(&mut self, descriptor: ExtensionDescriptor, factory: Arc<dyn ConnectionFactory>) {
        let entry = BuiltInExtension {
            descriptor,
            factory,
        };
        match self
            .extensions
            .iter_mut()
            .find(|e| e.descriptor.key == entry.descriptor.key)
        {
            Some(existing) => *existing = entry,
            None => self.extensions.push(entry),
        }
    }

    pub fn get(&self, key: &str) -> Option<&BuiltInExtension> {
        self.extensions.iter().find(|e| e.descriptor.key == key)
    }

    pub fn factory(&self, key: &str) -> Option<Arc<dyn ConnectionFactory>> {
        self.get(key).map(|e| Arc::clone(&e.factory))
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ExtensionDescriptor> {
        self.extensions.iter().map(|e| &e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
