//! In-process backend. The reference behaviour for every other adapter:
//! saving over an existing identifier overwrites it unless the lock token
//! is stale, and deleting an absent resource is not an error.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::debug;

use crate::datatype::{Id, OptimisticLockToken, Value};
use crate::error::{CofferError, Result};
use crate::persistence::{MetadataAdapter, Persister, QueryService, Resources, adapter_id, check_lock};
use crate::resource::Resource;

#[derive(Debug, Default)]
struct MemoryStore {
    resources: RwLock<BTreeMap<Id, Resource>>,
}

pub struct MemoryAdapter {
    id: Id,
    persister: MemoryPersister,
    query_service: MemoryQueryService,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::named("memory")
    }
    pub fn named(name: &str) -> Self {
        let id = adapter_id(&["memory", name]);
        let store = Arc::new(MemoryStore::default());
        Self {
            persister: MemoryPersister {
                adapter: id.clone(),
                store: store.clone(),
                sequence: AtomicU64::new(0),
            },
            query_service: MemoryQueryService { store },
            id,
        }
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataAdapter for MemoryAdapter {
    fn id(&self) -> &Id {
        &self.id
    }
    fn persister(&self) -> &dyn Persister {
        &self.persister
    }
    fn query_service(&self) -> &dyn QueryService {
        &self.query_service
    }
}

pub struct MemoryPersister {
    adapter: Id,
    store: Arc<MemoryStore>,
    sequence: AtomicU64,
}

impl Persister for MemoryPersister {
    fn save(&self, resource: &Resource) -> Result<Resource> {
        let mut saved = resource.clone();
        saved.assign_id_if_absent();
        let id = saved.require_id()?.clone();
        // the write lock spans the token comparison and the insert
        let mut resources = self.store.resources.write()?;
        let current = resources
            .get(&id)
            .and_then(|stored| stored.lock_token_for(&self.adapter))
            .map(|t| t.token().to_owned());
        check_lock(&saved, &self.adapter, current.as_deref())?;
        saved.stamp(Utc::now());
        if saved.schema().locks_optimistically() {
            let next = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            saved.set_lock_token(OptimisticLockToken::new(self.adapter.clone(), next.to_string()));
        }
        saved.mark_persisted();
        resources.insert(id.clone(), saved.clone());
        debug!(%id, adapter = %self.adapter, "saved in memory");
        Ok(saved)
    }

    fn delete(&self, resource: &Resource) -> Result<()> {
        let id = resource.require_id()?;
        if self.store.resources.write()?.remove(id).is_none() {
            debug!(%id, "nothing to delete");
        }
        Ok(())
    }

    fn wipe(&self) -> Result<()> {
        self.store.resources.write()?.clear();
        Ok(())
    }
}

pub struct MemoryQueryService {
    store: Arc<MemoryStore>,
}

impl MemoryQueryService {
    fn snapshot(&self, keep: impl Fn(&Resource) -> bool) -> Result<Vec<Resource>> {
        Ok(self
            .store
            .resources
            .read()?
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect())
    }
}

impl QueryService for MemoryQueryService {
    fn find_by(&self, id: &Id) -> Result<Resource> {
        self.store
            .resources
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| CofferError::NotFound(id.clone()))
    }

    fn find_all(&self) -> Result<Resources<'_>> {
        Ok(Box::new(self.snapshot(|_| true)?.into_iter().map(Ok)))
    }

    fn find_all_of_model(&self, model: &str) -> Result<Resources<'_>> {
        Ok(Box::new(self.snapshot(|r| r.tag() == model)?.into_iter().map(Ok)))
    }

    fn find_inverse_references_by(&self, resource: &Resource, property: &str) -> Result<Resources<'_>> {
        let target = Value::Id(resource.require_id()?.clone());
        let found = self.snapshot(|r| r.get(property).contains(&target))?;
        Ok(Box::new(found.into_iter().map(Ok)))
    }

    fn count_all_of_model(&self, model: &str) -> Result<usize> {
        Ok(self
            .store
            .resources
            .read()?
            .values()
            .filter(|r| r.tag() == model)
            .count())
    }
}
