//! Coffer – persistence for typed, attribute-bearing resources that does not
//! care which store is underneath.
//!
//! A [`resource::Resource`] is a record with a type tag, an identifier and
//! multi-valued attributes. Attributes are either sets (deduplicated, blanks
//! dropped) or sequences (ordered, duplicates kept); `member_ids` is always
//! a sequence. Values are typed: strings, language-tagged literals, numbers,
//! booleans, UTC timestamps, URIs, references to other resources and nested
//! resources.
//!
//! Every backend implements the same pair of traits from [`persistence`]:
//! a [`persistence::Persister`] that saves and deletes, and a
//! [`persistence::QueryService`] that finds by identifier, by type, by
//! membership and by reference.
//!
//! ## Modules
//! * [`resource`] – Schemas, the type registry and attribute coercion.
//! * [`datatype`] – Identifiers, values and optimistic lock tokens.
//! * [`mapping`] – First-match value mapping, the machinery behind every codec.
//! * [`memory`] – The in-process reference backend.
//! * [`sqlite`] – One row per resource with a JSON attribute column.
//! * [`ldp`] – Linked-data containers, with members kept as a proxy list.
//! * [`solr`] – Flat search-index documents.
//! * [`indexing`] – Write through one backend and index into another.
//! * [`storage`] – Binary content in memory, on disk or in a linked-data store.
//! * [`change_set`] – Resources saved together with files and parents.
//! * [`registry`] / [`settings`] – Named adapters, configured once at startup.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use coffer::memory::MemoryAdapter;
//! use coffer::persistence::MetadataAdapter;
//! use coffer::resource::{ResourceSchema, TypeRegistry};
//!
//! let types = Arc::new(TypeRegistry::new().with(ResourceSchema::new("Book").attribute("title")));
//! let adapter = MemoryAdapter::new();
//! let mut book = types.resource("Book");
//! book.set("title", vec!["Dune", "", "Dune"]).unwrap();
//! let saved = adapter.persister().save(&book).unwrap();
//! let found = adapter.query_service().find_by(saved.id().unwrap()).unwrap();
//! assert_eq!(found["title"].len(), 1);
//! ```
//!
//! ## Consistency
//! Saves are guarded by optimistic lock tokens for types that enable them.
//! Multi-step operations (a change set with files and a parent) are not
//! transactional: each step commits on its own and a failure is reported
//! without undoing earlier steps.

pub mod change_set;
pub mod datatype;
pub mod error;
pub mod indexing;
pub mod ldp;
pub mod logging;
pub mod mapping;
pub mod memory;
pub mod persistence;
pub mod registry;
pub mod resource;
pub mod settings;
pub mod solr;
pub mod sqlite;
pub mod storage;

pub use error::{CofferError, Result};
