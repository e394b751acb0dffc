//! Named adapters, built once at startup (see [`crate::settings`]) and
//! handed to whatever needs to pick an adapter by configuration key.
use std::fmt;
use std::sync::Arc;

use crate::change_set::ChangeSetPersister;
use crate::datatype::Id;
use crate::error::{CofferError, Result};
use crate::persistence::MetadataAdapter;
use crate::storage::StorageAdapter;

/// Adapters of one kind, in registration order.
pub struct AdapterRegistry<T: ?Sized> {
    kind: &'static str,
    adapters: Vec<(String, Arc<T>)>,
}

impl<T: ?Sized> AdapterRegistry<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            adapters: Vec::new(),
        }
    }
    /// Registering a name again replaces the earlier adapter.
    pub fn register(&mut self, name: &str, adapter: Arc<T>) {
        match self.adapters.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = adapter,
            None => self.adapters.push((name.to_owned(), adapter)),
        }
    }
    pub fn find(&self, name: &str) -> Result<Arc<T>> {
        self.adapters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a.clone())
            .ok_or_else(|| CofferError::Config(format!("no {} adapter named '{name}'", self.kind)))
    }
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.iter().map(|(n, _)| n.as_str())
    }
    pub fn len(&self) -> usize {
        self.adapters.len()
    }
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl<T: ?Sized> fmt::Debug for AdapterRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[derive(Debug)]
pub struct Registry {
    pub metadata: AdapterRegistry<dyn MetadataAdapter>,
    pub storage: AdapterRegistry<dyn StorageAdapter>,
    default_metadata: String,
    default_storage: String,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            metadata: AdapterRegistry::new("metadata"),
            storage: AdapterRegistry::new("storage"),
            default_metadata: "default".to_owned(),
            default_storage: "default".to_owned(),
        }
    }
    pub fn with_defaults(mut self, metadata: &str, storage: &str) -> Self {
        self.default_metadata = metadata.to_owned();
        self.default_storage = storage.to_owned();
        self
    }
    pub fn metadata_adapter(&self) -> Result<Arc<dyn MetadataAdapter>> {
        self.metadata.find(&self.default_metadata)
    }
    pub fn storage_adapter(&self) -> Result<Arc<dyn StorageAdapter>> {
        self.storage.find(&self.default_storage)
    }
    /// The first storage adapter claiming the identifier.
    pub fn storage_for(&self, id: &Id) -> Result<Arc<dyn StorageAdapter>> {
        self.storage
            .adapters
            .iter()
            .find(|(_, a)| a.handles(id))
            .map(|(_, a)| a.clone())
            .ok_or_else(|| CofferError::FileNotFound(format!("no storage adapter handles {id}")))
    }
    /// The default metadata and storage adapters, bound together.
    pub fn change_set_persister(&self) -> Result<ChangeSetPersister> {
        Ok(ChangeSetPersister::new(
            self.metadata_adapter()?,
            self.storage_adapter()?,
        ))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
