//! A metadata adapter that writes through a primary store and keeps a
//! search index in step with it. Reads are answered by the index.
use std::sync::Arc;

use tracing::debug;

use crate::datatype::Id;
use crate::error::Result;
use crate::persistence::{MetadataAdapter, Persister, QueryService, adapter_id};
use crate::resource::Resource;

pub struct IndexingAdapter {
    id: Id,
    persister: IndexingPersister,
    index: Arc<dyn MetadataAdapter>,
}

impl IndexingAdapter {
    pub fn new(primary: Arc<dyn MetadataAdapter>, index: Arc<dyn MetadataAdapter>) -> Self {
        Self {
            id: adapter_id(&["indexing", primary.id().as_str(), index.id().as_str()]),
            persister: IndexingPersister {
                primary,
                index: index.clone(),
            },
            index,
        }
    }
    pub fn primary(&self) -> &Arc<dyn MetadataAdapter> {
        &self.persister.primary
    }
    pub fn index(&self) -> &Arc<dyn MetadataAdapter> {
        &self.index
    }
}

impl MetadataAdapter for IndexingAdapter {
    fn id(&self) -> &Id {
        &self.id
    }
    fn persister(&self) -> &dyn Persister {
        &self.persister
    }
    fn query_service(&self) -> &dyn QueryService {
        self.index.query_service()
    }
    fn lock_owner(&self) -> &Id {
        self.persister.primary.lock_owner()
    }
}

pub struct IndexingPersister {
    primary: Arc<dyn MetadataAdapter>,
    index: Arc<dyn MetadataAdapter>,
}

impl Persister for IndexingPersister {
    /// The primary store decides the identifier and timestamps; the index
    /// records the result, tokens of both included.
    fn save(&self, resource: &Resource) -> Result<Resource> {
        let saved = self.primary.persister().save(resource)?;
        let indexed = self.index.persister().save(&saved)?;
        debug!(id = ?indexed.id(), "saved and indexed");
        Ok(indexed)
    }

    fn delete(&self, resource: &Resource) -> Result<()> {
        self.primary.persister().delete(resource)?;
        self.index.persister().delete(resource)
    }

    fn wipe(&self) -> Result<()> {
        self.primary.persister().wipe()?;
        self.index.persister().wipe()
    }
}
