//! Adapter configuration.
//!
//! Settings are layered with the `config` crate: an optional file (format
//! picked by its extension) overridden by `COFFER__...` environment
//! variables, e.g. `COFFER__DEFAULT_METADATA=catalog`.
//!
//! ```toml
//! default_metadata = "catalog"
//! default_storage = "files"
//!
//! [metadata.catalog]
//! kind = "sqlite"
//! path = "catalog.db"
//!
//! [storage.files]
//! kind = "disk"
//! base_path = "/var/lib/coffer"
//! ```
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::info;

use crate::error::Result;
use crate::indexing::IndexingAdapter;
use crate::ldp::LdpAdapter;
use crate::ldp::client::HttpLdpClient;
use crate::ldp::schema::PermissiveSchema;
use crate::memory::MemoryAdapter;
use crate::persistence::MetadataAdapter;
use crate::registry::Registry;
use crate::resource::TypeRegistry;
use crate::solr::SolrAdapter;
use crate::solr::client::HttpSolrClient;
use crate::sqlite::SqliteAdapter;
use crate::storage::{DiskStorage, LdpStorage, MemoryStorage, StorageAdapter};

pub const ENV_PREFIX: &str = "COFFER";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetadataSettings {
    Memory,
    /// `path` of `:memory:` opens a private in-memory database.
    Sqlite {
        path: PathBuf,
    },
    Ldp {
        url: String,
        base_path: String,
        #[serde(default)]
        predicate_prefix: Option<String>,
    },
    Solr {
        url: String,
    },
    /// Saves through `primary` and indexes into `index`, both named
    /// metadata adapters of a kind other than indexing.
    Indexing {
        primary: String,
        index: String,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageSettings {
    Memory,
    Disk { base_path: PathBuf },
    Ldp { url: String, base_path: String },
}

fn default_name() -> String {
    "default".to_owned()
}

fn join_uri(url: &str, path: &str) -> String {
    format!("{}/{}", url.trim_end_matches('/'), path.trim_matches('/'))
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_name")]
    pub default_metadata: String,
    #[serde(default = "default_name")]
    pub default_storage: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataSettings>,
    #[serde(default)]
    pub storage: BTreeMap<String, StorageSettings>,
}

impl Default for Settings {
    /// Everything in memory.
    fn default() -> Self {
        Self {
            default_metadata: default_name(),
            default_storage: default_name(),
            metadata: BTreeMap::from([(default_name(), MetadataSettings::Memory)]),
            storage: BTreeMap::from([(default_name(), StorageSettings::Memory)]),
        }
    }
}

impl Settings {
    /// Reads the optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }

    /// Instantiates every adapter, indexing adapters last since they refer
    /// to the others by name.
    pub fn build(&self, types: Arc<TypeRegistry>) -> Result<Registry> {
        let mut registry =
            Registry::new().with_defaults(&self.default_metadata, &self.default_storage);
        let (composites, plain): (Vec<_>, Vec<_>) = self
            .metadata
            .iter()
            .partition(|(_, s)| matches!(s, MetadataSettings::Indexing { .. }));
        for (name, settings) in plain {
            let adapter: Arc<dyn MetadataAdapter> = match settings {
                MetadataSettings::Memory => Arc::new(MemoryAdapter::named(name)),
                MetadataSettings::Sqlite { path } if path.as_os_str() == ":memory:" => {
                    Arc::new(SqliteAdapter::in_memory(types.clone())?)
                }
                MetadataSettings::Sqlite { path } => Arc::new(SqliteAdapter::open(path, types.clone())?),
                MetadataSettings::Ldp {
                    url,
                    base_path,
                    predicate_prefix,
                } => {
                    let schema = match predicate_prefix {
                        Some(prefix) => PermissiveSchema::with_prefix(prefix),
                        None => PermissiveSchema::new(),
                    };
                    Arc::new(LdpAdapter::new(
                        Arc::new(HttpLdpClient::new()?),
                        &join_uri(url, base_path),
                        schema,
                        types.clone(),
                    ))
                }
                MetadataSettings::Solr { url } => Arc::new(SolrAdapter::new(
                    Arc::new(HttpSolrClient::new(url)?),
                    url,
                    types.clone(),
                )),
                MetadataSettings::Indexing { .. } => continue,
            };
            info!(name = name.as_str(), "metadata adapter configured");
            registry.metadata.register(name, adapter);
        }
        for (name, settings) in composites {
            let MetadataSettings::Indexing { primary, index } = settings else {
                continue;
            };
            let adapter = IndexingAdapter::new(
                registry.metadata.find(primary)?,
                registry.metadata.find(index)?,
            );
            registry.metadata.register(name, Arc::new(adapter));
        }
        for (name, settings) in &self.storage {
            let adapter: Arc<dyn StorageAdapter> = match settings {
                StorageSettings::Memory => Arc::new(MemoryStorage::new()),
                StorageSettings::Disk { base_path } => Arc::new(DiskStorage::new(base_path)),
                StorageSettings::Ldp { url, base_path } => Arc::new(LdpStorage::new(
                    Arc::new(HttpLdpClient::new()?),
                    &join_uri(url, base_path),
                )),
            };
            registry.storage.register(name, adapter);
        }
        // fail at startup rather than on first use
        registry.metadata_adapter()?;
        registry.storage_adapter()?;
        Ok(registry)
    }
}
