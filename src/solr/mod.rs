//! Search-index backend: one flat document per resource (see [`mapper`]).
//!
//! The index is normally fed by an indexing adapter after the resource has
//! been saved elsewhere, so saving a resource without an identifier works
//! but logs a warning. Lock tokens are the document `_version_`; tokens
//! issued by other adapters are kept in the document so resources read from
//! the index can still be saved through them. Deleting a missing document
//! is not an error.
pub mod client;
pub mod mapper;
pub mod query;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::datatype::{Id, OptimisticLockToken, Value};
use crate::error::{CofferError, Result};
use crate::persistence::{
    MetadataAdapter, Paginated, Persister, QueryService, Resources, adapter_id, id_values,
};
use crate::resource::{AttributeKind, MEMBER_IDS, OPTIMISTIC_LOCK, Resource, TypeRegistry};

use client::{Select, SolrClient};
use mapper::{Document, DocumentMapper, VERSION, document_id, exact_field, strings};
use query::Query;

pub const PAGE_SIZE: usize = 100;

struct Shared {
    adapter: Id,
    client: Arc<dyn SolrClient>,
    mapper: DocumentMapper,
}

impl Shared {
    fn to_document(&self, resource: &Resource) -> Result<Document> {
        let mut document = self.mapper.to_document(resource)?;
        let foreign: Vec<String> = resource
            .lock_tokens()
            .iter()
            .filter(|t| t.adapter_id() != &self.adapter)
            .map(OptimisticLockToken::serialize)
            .collect();
        if !foreign.is_empty() {
            document.insert(exact_field(OPTIMISTIC_LOCK), json!(foreign));
        }
        if let Some(token) = resource.lock_token_for(&self.adapter) {
            let version: i64 = token.token().parse().map_err(|_| {
                CofferError::InvalidValue(format!("{} is not an index version", token.token()))
            })?;
            document.insert(VERSION.to_owned(), json!(version));
        }
        Ok(document)
    }

    fn to_resource(&self, mut document: Document) -> Result<Resource> {
        let version = document.remove(VERSION).and_then(|v| v.as_i64());
        let foreign = document
            .remove(&exact_field(OPTIMISTIC_LOCK))
            .map(|t| strings(&t))
            .unwrap_or_default();
        let mut resource = self.mapper.to_resource(document)?;
        for token in foreign {
            resource.set_lock_token(OptimisticLockToken::deserialize(&token)?);
        }
        let locks = resource.schema().locks_optimistically();
        if let Some(version) = version.filter(|_| locks) {
            resource.set_lock_token(OptimisticLockToken::new(self.adapter.clone(), version.to_string()));
        }
        resource.mark_persisted();
        Ok(resource)
    }

    fn select(&self, select: &Select) -> Result<Vec<Resource>> {
        self.client
            .select(select)?
            .docs
            .into_iter()
            .map(|d| self.to_resource(d))
            .collect()
    }

    /// Every page of a query, fetched on demand.
    fn paged(self: &Arc<Self>, select: Select) -> Resources<'static> {
        let shared = self.clone();
        Box::new(Paginated::new(PAGE_SIZE, move |page, per_page| {
            shared.select(&select.clone().page(page, per_page))
        }))
    }
}

pub struct SolrAdapter {
    id: Id,
    persister: SolrPersister,
    query_service: SolrQueryService,
}

impl SolrAdapter {
    /// `core` names the index, usually its URL; it scopes the lock tokens.
    pub fn new(client: Arc<dyn SolrClient>, core: &str, types: Arc<TypeRegistry>) -> Self {
        let id = adapter_id(&["solr", core]);
        info!(adapter = %id, core, "search index ready");
        let shared = Arc::new(Shared {
            adapter: id.clone(),
            client,
            mapper: DocumentMapper::new(types),
        });
        Self {
            id,
            persister: SolrPersister {
                shared: shared.clone(),
            },
            query_service: SolrQueryService { shared },
        }
    }
}

impl MetadataAdapter for SolrAdapter {
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

pub struct SolrPersister {
    shared: Arc<Shared>,
}

impl Persister for SolrPersister {
    fn save(&self, resource: &Resource) -> Result<Resource> {
        let mut saved = resource.clone();
        if saved.assign_id_if_absent() {
            warn!(id = ?saved.id(), "the search index is not meant to persist new resources, generated an ID");
        }
        saved.stamp(Utc::now());
        let document = self.shared.to_document(&saved)?;
        let version = self.shared.client.add(document)?;
        if saved.schema().locks_optimistically() {
            saved.set_lock_token(OptimisticLockToken::new(
                self.shared.adapter.clone(),
                version.to_string(),
            ));
        }
        saved.mark_persisted();
        debug!(id = ?saved.id(), version, "indexed");
        Ok(saved)
    }

    fn delete(&self, resource: &Resource) -> Result<()> {
        let id = resource.require_id()?;
        self.shared.client.delete_by_id(&document_id(id))?;
        debug!(%id, "removed from index");
        Ok(())
    }

    fn wipe(&self) -> Result<()> {
        self.shared.client.delete_all()
    }
}

pub struct SolrQueryService {
    shared: Arc<Shared>,
}

impl SolrQueryService {
    /// Runs a join and hands back its hits in the order of `ids`, which may
    /// repeat. Joins answer in index order.
    fn in_order(&self, query: Query, ids: Vec<Id>, model: Option<&str>) -> Result<Resources<'_>> {
        let mut select = Select::new(query);
        if let Some(model) = model {
            select = select.filter(Query::of_model(model));
        }
        let mut found = HashMap::new();
        for resource in self.shared.paged(select) {
            let resource = resource?;
            if let Some(id) = resource.id().cloned() {
                found.insert(id, resource);
            }
        }
        Ok(Box::new(
            ids.into_iter()
                .filter_map(move |id| found.get(&id).cloned())
                .map(Ok),
        ))
    }
}

impl QueryService for SolrQueryService {
    fn find_by(&self, id: &Id) -> Result<Resource> {
        if id.is_blank() {
            return Err(CofferError::InvalidIdentifier("blank identifier".to_owned()));
        }
        self.shared
            .select(&Select::new(Query::by_id(id)).page(0, 1))?
            .pop()
            .ok_or_else(|| CofferError::NotFound(id.clone()))
    }

    fn find_all(&self) -> Result<Resources<'_>> {
        Ok(self.shared.paged(Select::new(Query::All)))
    }

    fn find_all_of_model(&self, model: &str) -> Result<Resources<'_>> {
        Ok(self
            .shared
            .paged(Select::new(Query::All).filter(Query::of_model(model))))
    }

    fn find_members(&self, resource: &Resource, model: Option<&str>) -> Result<Resources<'_>> {
        let Some(id) = resource.id() else {
            return Ok(Box::new(std::iter::empty()));
        };
        self.in_order(Query::references(id, MEMBER_IDS), resource.member_ids(), model)
    }

    fn find_references_by(&self, resource: &Resource, property: &str) -> Result<Resources<'_>> {
        let Some(id) = resource.id() else {
            return Ok(Box::new(std::iter::empty()));
        };
        let ids = id_values(resource.get(property));
        self.in_order(Query::references(id, property), ids, None)
    }

    fn find_inverse_references_by(&self, resource: &Resource, property: &str) -> Result<Resources<'_>> {
        let id = resource.require_id()?.clone();
        let found = self
            .shared
            .paged(Select::new(Query::inverse_references(&id, property)));
        let property = property.to_owned();
        let target = Value::Id(id);
        // the index can lag behind the store; ordered attributes are confirmed
        Ok(Box::new(found.filter(move |r| match r {
            Ok(referrer) if referrer.schema().kind_of(&property) == AttributeKind::Sequence => {
                referrer.get(&property).contains(&target)
            }
            _ => true,
        })))
    }

    fn count_all_of_model(&self, model: &str) -> Result<usize> {
        let select = Select::new(Query::All)
            .filter(Query::of_model(model))
            .page(0, 0);
        Ok(self.shared.client.select(&select)?.num_found)
    }
}
