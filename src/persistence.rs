//! The contract every metadata backend implements: a [`Persister`] for
//! writes, a [`QueryService`] for reads, bundled by a [`MetadataAdapter`].
use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use crate::datatype::{Id, Value};
use crate::error::{CofferError, Result};
use crate::resource::{MEMBER_IDS, Resource};

/// Lazily produced query results. Calling the query again restarts it.
pub type Resources<'a> = Box<dyn Iterator<Item = Result<Resource>> + 'a>;

pub const STALE_BATCH: &str = "One or more resources have been updated since retrieval";

pub trait Persister: Send + Sync {
    /// Writes a copy of the resource and returns it with an identifier,
    /// fresh timestamps and, for locking types, a new lock token.
    fn save(&self, resource: &Resource) -> Result<Resource>;

    /// Saves one by one; whatever committed before a failure stays.
    fn save_all(&self, resources: &[Resource]) -> Result<Vec<Resource>> {
        let mut saved = Vec::with_capacity(resources.len());
        for resource in resources {
            match self.save(resource) {
                Ok(r) => saved.push(r),
                Err(CofferError::StaleObject(_)) => {
                    return Err(CofferError::StaleObject(STALE_BATCH.to_owned()));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(saved)
    }

    fn delete(&self, resource: &Resource) -> Result<()>;

    /// Removes every resource from the backend.
    fn wipe(&self) -> Result<()>;
}

pub trait QueryService: Send + Sync {
    fn find_by(&self, id: &Id) -> Result<Resource>;

    fn find_all(&self) -> Result<Resources<'_>>;

    fn find_all_of_model(&self, model: &str) -> Result<Resources<'_>>;

    /// Found resources in request order; missing and repeated IDs are dropped.
    fn find_many_by_ids(&self, ids: &[Id]) -> Result<Vec<Resource>> {
        let mut seen = HashSet::new();
        let unique: Vec<Id> = ids.iter().filter(|id| seen.insert(*id)).cloned().collect();
        resolve_ids(self, unique, None).collect()
    }

    fn find_members(&self, resource: &Resource, model: Option<&str>) -> Result<Resources<'_>> {
        Ok(resolve_ids(self, resource.member_ids(), model))
    }

    fn find_parents(&self, resource: &Resource) -> Result<Resources<'_>> {
        self.find_inverse_references_by(resource, MEMBER_IDS)
    }

    /// Resources named by `property`, in attribute order. The default reads
    /// the values of the resource passed in; the SQLite and search-index
    /// backends resolve the reference inside the store from the saved copy
    /// instead, so results only agree across backends for a resource as it
    /// was last saved.
    fn find_references_by(&self, resource: &Resource, property: &str) -> Result<Resources<'_>> {
        Ok(resolve_ids(self, id_values(resource.get(property)), None))
    }

    fn find_inverse_references_by(&self, resource: &Resource, property: &str) -> Result<Resources<'_>>;

    fn count_all_of_model(&self, model: &str) -> Result<usize> {
        let mut count = 0;
        for resource in self.find_all_of_model(model)? {
            resource?;
            count += 1;
        }
        Ok(count)
    }
}

pub trait MetadataAdapter: Send + Sync {
    /// Stable identity, used to scope the lock tokens this adapter issues.
    fn id(&self) -> &Id;
    fn persister(&self) -> &dyn Persister;
    fn query_service(&self) -> &dyn QueryService;
    /// The adapter whose token guards saves made through this one. Only
    /// composites that delegate writes answer with something other than
    /// [`MetadataAdapter::id`].
    fn lock_owner(&self) -> &Id {
        self.id()
    }
}

/// Identity derived from whatever distinguishes one adapter instance from
/// another (kind, connection string, base path).
pub fn adapter_id(parts: &[&str]) -> Id {
    let digest = blake3::hash(parts.join("|").as_bytes());
    Id::new(&digest.to_hex()[..16])
}

pub fn id_values(values: &[Value]) -> Vec<Id> {
    values.iter().filter_map(|v| v.as_id().cloned()).collect()
}

/// Resolves identifiers one at a time, in order, skipping dangling ones.
pub fn resolve_ids<'a, Q: QueryService + ?Sized>(
    query: &'a Q,
    ids: Vec<Id>,
    model: Option<&str>,
) -> Resources<'a> {
    let model = model.map(str::to_owned);
    Box::new(ids.into_iter().filter_map(move |id| match query.find_by(&id) {
        Ok(found) => match &model {
            Some(m) if found.tag() != m => None,
            _ => Some(Ok(found)),
        },
        Err(e) if e.is_not_found() => {
            debug!(%id, "skipping dangling reference");
            None
        }
        Err(e) => Some(Err(e)),
    }))
}

/// Rejects a save whose lock token for this adapter is not the stored one.
/// Resources without a token for the adapter are not checked.
pub fn check_lock(resource: &Resource, adapter: &Id, current: Option<&str>) -> Result<()> {
    let (Some(carried), Some(current)) = (resource.lock_token_for(adapter), current) else {
        return Ok(());
    };
    if carried.token() == current {
        return Ok(());
    }
    warn!(id = ?resource.id(), carried = carried.token(), current, "stale lock token");
    Err(CofferError::StaleObject(format!(
        "{} has been updated since retrieval",
        resource
    )))
}

/// Pulls pages from `fetch` until a short page signals the end.
pub struct Paginated<T, F> {
    fetch: F,
    page: usize,
    per_page: usize,
    buffer: VecDeque<T>,
    done: bool,
}

impl<T, F> Paginated<T, F>
where
    F: FnMut(usize, usize) -> Result<Vec<T>>,
{
    /// `fetch` receives the page index and the page size.
    pub fn new(per_page: usize, fetch: F) -> Self {
        Self {
            fetch,
            page: 0,
            per_page: per_page.max(1),
            buffer: VecDeque::new(),
            done: false,
        }
    }
}

impl<T, F> Iterator for Paginated<T, F>
where
    F: FnMut(usize, usize) -> Result<Vec<T>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            match (self.fetch)(self.page, self.per_page) {
                Ok(items) => {
                    self.done = items.len() < self.per_page;
                    self.page += 1;
                    self.buffer.extend(items);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
