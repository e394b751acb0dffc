//! Relational backend: one row per resource in SQLite, all attributes in a
//! single JSON column.
//!
//! Creating a resource whose identifier already has a row is an illegal
//! operation rather than an overwrite. The row's `lock_version` doubles as
//! the optimistic lock token. Deleting a missing row is not an error.
pub mod mapper;
pub mod query;

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::datatype::{Id, OptimisticLockToken};
use crate::error::{CofferError, Result};
use crate::persistence::{
    MetadataAdapter, Paginated, Persister, QueryService, Resources, adapter_id, check_lock,
};
use crate::resource::{Resource, TypeRegistry};

use mapper::JsonCodec;

pub const PAGE_SIZE: usize = 100;

/// Columns of one row, before the metadata has been decoded.
struct StoredRow {
    id: String,
    internal_resource: String,
    metadata: String,
    lock_version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StoredRow {
    fn read(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            internal_resource: row.get(1)?,
            metadata: row.get(2)?,
            lock_version: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

/// Connection, codec and type registry shared by the persister and the
/// query service of one adapter.
struct Shared {
    adapter: Id,
    connection: Mutex<Connection>,
    codec: JsonCodec,
    types: Arc<TypeRegistry>,
}

impl Shared {
    fn decode(&self, row: StoredRow) -> Result<Resource> {
        let mut resource = self.types.resource(&row.internal_resource);
        resource.set_id(Id::new(row.id));
        resource.set_timestamps(Some(row.created_at), Some(row.updated_at));
        self.codec
            .decode_into(&mut resource, serde_json::from_str(&row.metadata)?)?;
        if resource.schema().locks_optimistically() {
            resource.set_lock_token(OptimisticLockToken::new(
                self.adapter.clone(),
                row.lock_version.to_string(),
            ));
        }
        resource.mark_persisted();
        Ok(resource)
    }

    fn rows(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Resource>> {
        let rows = {
            let connection = self.connection.lock()?;
            let mut statement = connection.prepare(sql)?;
            let rows = statement
                .query_map(params, StoredRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter().map(|row| self.decode(row)).collect()
    }
}

pub struct SqliteAdapter {
    id: Id,
    persister: SqlitePersister,
    query_service: SqliteQueryService,
}

impl SqliteAdapter {
    pub fn open(path: impl AsRef<Path>, types: Arc<TypeRegistry>) -> Result<Self> {
        let path = path.as_ref();
        let id = adapter_id(&["sqlite", &path.to_string_lossy()]);
        Self::new(Connection::open(path)?, id, types)
    }
    /// A private database that lives as long as the adapter.
    pub fn in_memory(types: Arc<TypeRegistry>) -> Result<Self> {
        let id = adapter_id(&["sqlite", &Id::generate().to_string()]);
        Self::new(Connection::open_in_memory()?, id, types)
    }
    pub fn new(connection: Connection, id: Id, types: Arc<TypeRegistry>) -> Result<Self> {
        connection.execute_batch(query::CREATE_SCHEMA)?;
        info!(adapter = %id, "relational store ready");
        let shared = Arc::new(Shared {
            adapter: id.clone(),
            connection: Mutex::new(connection),
            codec: JsonCodec::new(),
            types,
        });
        Ok(Self {
            id,
            persister: SqlitePersister {
                shared: shared.clone(),
            },
            query_service: SqliteQueryService { shared },
        })
    }
}

impl MetadataAdapter for SqliteAdapter {
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

pub struct SqlitePersister {
    shared: Arc<Shared>,
}

impl Persister for SqlitePersister {
    fn save(&self, resource: &Resource) -> Result<Resource> {
        let shared = &self.shared;
        let mut saved = resource.clone();
        saved.assign_id_if_absent();
        let id = saved.require_id()?.clone();
        let connection = shared.connection.lock()?;
        let current: Option<i64> = connection
            .query_row(query::LOCK_VERSION, params![id.as_str()], |r| r.get(0))
            .optional()?;
        if saved.is_new() && current.is_some() {
            return Err(CofferError::IllegalOperation(format!(
                "attempted to recreate existing resource {id}"
            )));
        }
        let current_token = current.map(|v| v.to_string());
        check_lock(&saved, &shared.adapter, current_token.as_deref())?;
        saved.stamp(Utc::now());
        let metadata = shared.codec.encode(&saved)?.to_string();
        let version = match current {
            None => {
                let created_at = saved.created_at().copied().unwrap_or_else(Utc::now);
                connection.execute(
                    query::INSERT,
                    params![id.as_str(), saved.tag(), metadata, created_at, saved.updated_at()],
                )?;
                1
            }
            Some(version) => {
                let changed = connection.execute(
                    query::UPDATE,
                    params![id.as_str(), saved.tag(), metadata, saved.updated_at(), version],
                )?;
                if changed == 0 {
                    return Err(CofferError::StaleObject(format!(
                        "{saved} has been updated since retrieval"
                    )));
                }
                version + 1
            }
        };
        if saved.schema().locks_optimistically() {
            saved.set_lock_token(OptimisticLockToken::new(
                shared.adapter.clone(),
                version.to_string(),
            ));
        }
        saved.mark_persisted();
        debug!(%id, version, "saved row");
        Ok(saved)
    }

    fn delete(&self, resource: &Resource) -> Result<()> {
        let id = resource.require_id()?;
        let connection = self.shared.connection.lock()?;
        if connection.execute(query::DELETE, params![id.as_str()])? == 0 {
            debug!(%id, "no row to delete");
        }
        Ok(())
    }

    fn wipe(&self) -> Result<()> {
        self.shared.connection.lock()?.execute(query::WIPE, [])?;
        Ok(())
    }
}

pub struct SqliteQueryService {
    shared: Arc<Shared>,
}

impl SqliteQueryService {
    fn paged(&self, model: Option<&str>) -> Resources<'_> {
        let model = model.map(str::to_owned);
        let mut last = String::new();
        Box::new(Paginated::new(PAGE_SIZE, move |_, per_page| {
            let page = self.shared.rows(
                query::PAGE_AFTER,
                params![last, model, per_page as i64],
            )?;
            if let Some(id) = page.last().and_then(Resource::id) {
                last = id.to_string();
            }
            Ok(page)
        }))
    }
}

impl QueryService for SqliteQueryService {
    fn find_by(&self, id: &Id) -> Result<Resource> {
        self.shared
            .rows(query::FIND_BY, params![id.as_str()])?
            .pop()
            .ok_or_else(|| CofferError::NotFound(id.clone()))
    }

    fn find_all(&self) -> Result<Resources<'_>> {
        Ok(self.paged(None))
    }

    fn find_all_of_model(&self, model: &str) -> Result<Resources<'_>> {
        Ok(self.paged(Some(model)))
    }

    fn find_members(&self, resource: &Resource, model: Option<&str>) -> Result<Resources<'_>> {
        let Some(id) = resource.id() else {
            return Ok(Box::new(std::iter::empty()));
        };
        let members = self
            .shared
            .rows(query::FIND_MEMBERS, params![id.as_str(), model])?;
        Ok(Box::new(members.into_iter().map(Ok)))
    }

    /// Joins against the stored row; unsaved edits to `property` are not seen.
    fn find_references_by(&self, resource: &Resource, property: &str) -> Result<Resources<'_>> {
        let Some(id) = resource.id() else {
            return Ok(Box::new(std::iter::empty()));
        };
        let path = query::property_path(property)?;
        let found = self
            .shared
            .rows(query::FIND_REFERENCES, params![id.as_str(), path])?;
        Ok(Box::new(found.into_iter().map(Ok)))
    }

    fn find_inverse_references_by(&self, resource: &Resource, property: &str) -> Result<Resources<'_>> {
        let id = resource.require_id()?;
        let path = query::property_path(property)?;
        let found = self
            .shared
            .rows(query::FIND_INVERSE_REFERENCES, params![path, id.as_str()])?;
        Ok(Box::new(found.into_iter().map(Ok)))
    }

    fn count_all_of_model(&self, model: &str) -> Result<usize> {
        let count: i64 = self
            .shared
            .connection
            .lock()?
            .query_row(query::COUNT_OF_MODEL, params![model], |r| r.get(0))?;
        Ok(count as usize)
    }
}
