//! Linked-data backend: every resource is a container below a base path,
//! its attributes are the triples of that container, and `member_ids` is
//! a proxy list (see [`ordered_list`]).
//!
//! Writes replace the whole graph of a container. Creating a resource over
//! an existing container is an illegal operation, deleting a missing one
//! fails with NotFound. The entity tag of a container is its lock token.
//!
//! Only `member_ids` keeps its order and duplicates in this store. Other
//! attributes come back in graph order without repeated values.
pub mod client;
pub mod graph;
pub mod ordered_list;
pub mod reader;
pub mod schema;
pub mod writer;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::datatype::{Id, OptimisticLockToken, Value};
use crate::error::{CofferError, Result};
use crate::persistence::{
    MetadataAdapter, Persister, QueryService, Resources, adapter_id, check_lock, resolve_ids,
};
use crate::resource::{MEMBER_IDS, Resource, TypeRegistry};

use client::{Container, LdpClient};
use graph::Term;
use reader::GraphReader;
use schema::{ORE_PROXY_FOR, PermissiveSchema, Vocabulary};
use writer::GraphWriter;

struct Shared {
    adapter: Id,
    client: Arc<dyn LdpClient>,
    vocabulary: Arc<Vocabulary>,
    writer: GraphWriter,
    reader: GraphReader,
}

impl Shared {
    fn to_resource(&self, uri: &str, container: Container) -> Result<Option<Resource>> {
        let Some(mut resource) = self.reader.read(container.graph, uri)? else {
            return Ok(None);
        };
        if let Some(id) = self.vocabulary.uri_to_id(uri) {
            resource.set_id(id);
        }
        if resource.schema().locks_optimistically() {
            resource.set_lock_token(OptimisticLockToken::new(self.adapter.clone(), container.etag));
        }
        resource.mark_persisted();
        Ok(Some(resource))
    }

    /// Identifiers of the containers holding the given statements' subjects.
    fn subject_ids<'a>(&self, subjects: impl Iterator<Item = &'a Term>) -> Vec<Id> {
        let mut seen = HashSet::new();
        subjects
            .filter_map(Term::as_iri)
            .filter_map(|s| self.vocabulary.uri_to_id(s))
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

pub struct LdpAdapter {
    id: Id,
    persister: LdpPersister,
    query_service: LdpQueryService,
}

impl LdpAdapter {
    /// `base_uri` is the container every resource is created below.
    pub fn new(
        client: Arc<dyn LdpClient>,
        base_uri: &str,
        schema: PermissiveSchema,
        types: Arc<TypeRegistry>,
    ) -> Self {
        let vocabulary = Arc::new(Vocabulary::new(base_uri, schema));
        let id = adapter_id(&["ldp", vocabulary.prefix()]);
        info!(adapter = %id, base = vocabulary.prefix(), "linked-data store ready");
        let shared = Arc::new(Shared {
            adapter: id.clone(),
            client,
            writer: GraphWriter::new(vocabulary.clone()),
            reader: GraphReader::new(vocabulary.clone(), types),
            vocabulary,
        });
        Self {
            id,
            persister: LdpPersister {
                shared: shared.clone(),
            },
            query_service: LdpQueryService { shared },
        }
    }
    pub fn id_to_uri(&self, id: &Id) -> String {
        self.persister.shared.vocabulary.id_to_uri(id)
    }
    pub fn uri_to_id(&self, uri: &str) -> Option<Id> {
        self.persister.shared.vocabulary.uri_to_id(uri)
    }
}

impl MetadataAdapter for LdpAdapter {
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

pub struct LdpPersister {
    shared: Arc<Shared>,
}

impl Persister for LdpPersister {
    fn save(&self, resource: &Resource) -> Result<Resource> {
        let shared = &self.shared;
        let mut saved = resource.clone();
        saved.assign_id_if_absent();
        let id = saved.require_id()?.clone();
        let uri = shared.vocabulary.id_to_uri(&id);
        let existing = shared.client.get(&uri)?;
        if saved.is_new() && existing.is_some() {
            return Err(CofferError::IllegalOperation(format!(
                "attempted to recreate existing resource {id}"
            )));
        }
        let current = existing.as_ref().map(|c| c.etag.as_str());
        check_lock(&saved, &shared.adapter, current)?;
        saved.stamp(Utc::now());
        let graph = shared.writer.write(&saved, &uri)?;
        // a writer that slipped in since the read above fails the put
        let if_match = saved
            .lock_token_for(&shared.adapter)
            .map(|t| t.token().to_owned());
        let etag = shared.client.put(&uri, &graph, if_match.as_deref())?;
        if saved.schema().locks_optimistically() {
            saved.set_lock_token(OptimisticLockToken::new(shared.adapter.clone(), etag));
        }
        saved.mark_persisted();
        debug!(%id, triples = graph.len(), "saved container");
        Ok(saved)
    }

    /// Containment cascades as it does on the server: identifiers with a `/`
    /// live below their prefix, so deleting `a` also removes `a/b` and any
    /// binaries stored under it.
    fn delete(&self, resource: &Resource) -> Result<()> {
        let id = resource.require_id()?;
        let uri = self.shared.vocabulary.id_to_uri(id);
        if !self.shared.client.delete(&uri)? {
            return Err(CofferError::NotFound(id.clone()));
        }
        debug!(%id, "deleted container");
        Ok(())
    }

    fn wipe(&self) -> Result<()> {
        self.shared.client.delete(self.shared.vocabulary.prefix())?;
        Ok(())
    }
}

pub struct LdpQueryService {
    shared: Arc<Shared>,
}

impl LdpQueryService {
    fn find_uri(&self, uri: &str) -> Result<Option<Resource>> {
        match self.shared.client.get(uri)? {
            Some(container) => self.shared.to_resource(uri, container),
            None => Ok(None),
        }
    }
}

impl QueryService for LdpQueryService {
    fn find_by(&self, id: &Id) -> Result<Resource> {
        if id.is_blank() {
            return Err(CofferError::InvalidIdentifier("blank identifier".to_owned()));
        }
        self.find_uri(&self.shared.vocabulary.id_to_uri(id))?
            .ok_or_else(|| CofferError::NotFound(id.clone()))
    }

    /// Breadth first over the container tree below the base container.
    fn find_all(&self) -> Result<Resources<'_>> {
        let mut queue: VecDeque<String> = self
            .shared
            .client
            .children(self.shared.vocabulary.prefix())?
            .into();
        Ok(Box::new(std::iter::from_fn(move || {
            while let Some(uri) = queue.pop_front() {
                match self.shared.client.children(&uri) {
                    Ok(children) => queue.extend(children),
                    Err(e) => return Some(Err(e)),
                }
                match self.find_uri(&uri) {
                    Ok(Some(resource)) => return Some(Ok(resource)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                }
            }
            None
        })))
    }

    fn find_all_of_model(&self, model: &str) -> Result<Resources<'_>> {
        let model = model.to_owned();
        Ok(Box::new(self.find_all()?.filter(move |r| match r {
            Ok(resource) => resource.tag() == model,
            Err(_) => true,
        })))
    }

    /// Containers holding a proxy for this resource.
    fn find_parents(&self, resource: &Resource) -> Result<Resources<'_>> {
        let uri = self.shared.vocabulary.id_to_uri(resource.require_id()?);
        let inbound = self.shared.client.inbound(&uri)?;
        let parents = self
            .shared
            .subject_ids(inbound.iter().filter(|t| t.predicate == ORE_PROXY_FOR).map(|t| &t.subject));
        Ok(resolve_ids(self, parents, None))
    }

    fn find_inverse_references_by(&self, resource: &Resource, property: &str) -> Result<Resources<'_>> {
        if !resource.persisted() {
            return Err(CofferError::InvalidValue(format!("{resource} is not saved")));
        }
        let id = resource.require_id()?.clone();
        let uri = self.shared.vocabulary.id_to_uri(&id);
        let inbound = self.shared.client.inbound(&uri)?;
        if property == MEMBER_IDS {
            // proxies can outlive a membership, so confirm each candidate
            let candidates = self
                .shared
                .subject_ids(inbound.iter().filter(|t| t.predicate == ORE_PROXY_FOR).map(|t| &t.subject));
            let property = property.to_owned();
            let target = Value::Id(id);
            return Ok(Box::new(resolve_ids(self, candidates, None).filter(move |r| match r {
                Ok(found) => found.get(&property).contains(&target),
                Err(_) => true,
            })));
        }
        let predicate = self.shared.vocabulary.predicate(property);
        let referrers = self
            .shared
            .subject_ids(inbound.iter().filter(|t| t.predicate == predicate).map(|t| &t.subject));
        Ok(resolve_ids(self, referrers, None))
    }
}
