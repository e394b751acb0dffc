//! Transport to a search index. [`HttpSolrClient`] speaks the JSON update
//! and select handlers of a real core; [`MemorySolrCore`] evaluates the
//! same queries in process.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::RwLock;

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value as Json, json};
use tracing::debug;

use crate::error::{CofferError, Result};
use crate::solr::mapper::{DOCUMENT_ID, Document, VERSION, strings};
use crate::solr::query::Query;

/// One page of a query.
#[derive(Clone, Debug)]
pub struct Select {
    pub query: Query,
    pub filters: Vec<Query>,
    pub start: usize,
    pub rows: usize,
}

impl Select {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            filters: Vec::new(),
            start: 0,
            rows: 10,
        }
    }
    pub fn filter(mut self, filter: Query) -> Self {
        self.filters.push(filter);
        self
    }
    pub fn page(mut self, page: usize, per_page: usize) -> Self {
        self.start = page * per_page;
        self.rows = per_page;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct Page {
    pub num_found: usize,
    pub docs: Vec<Document>,
}

pub trait SolrClient: Send + Sync {
    /// Adds or replaces a document and returns its new `_version_`. A
    /// positive `_version_` in the document makes the add conditional on
    /// the stored version; a mismatch is a stale object error.
    fn add(&self, document: Document) -> Result<i64>;
    /// Absent documents are ignored.
    fn delete_by_id(&self, id: &str) -> Result<()>;
    fn delete_all(&self) -> Result<()>;
    /// Matching documents in identifier order.
    fn select(&self, select: &Select) -> Result<Page>;
}

// ------------- HTTP -------------
pub struct HttpSolrClient {
    client: Client,
    url: String,
}

impl HttpSolrClient {
    /// `url` is the core, e.g. `http://localhost:8983/solr/coffer`.
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self::with_client(Client::builder().build()?, url))
    }
    pub fn with_client(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.trim_end_matches('/').to_owned(),
        }
    }
    fn update(&self, body: Json) -> Result<Json> {
        let response = self
            .client
            .post(format!("{}/update", self.url))
            .query(&[("softCommit", "true"), ("versions", "true"), ("wt", "json")])
            .json(&body)
            .send()?;
        if response.status() == StatusCode::CONFLICT {
            return Err(CofferError::StaleObject(
                "document has been updated since retrieval".to_owned(),
            ));
        }
        Ok(response.error_for_status()?.json()?)
    }
}

impl SolrClient for HttpSolrClient {
    fn add(&self, document: Document) -> Result<i64> {
        let reply = self.update(json!([document]))?;
        // versions=true answers with "adds": [id, version, ...]
        reply["adds"]
            .get(1)
            .and_then(Json::as_i64)
            .ok_or_else(|| CofferError::Transport(format!("no version in update reply {reply}")))
    }

    fn delete_by_id(&self, id: &str) -> Result<()> {
        self.update(json!({ "delete": { "id": id } }))?;
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.update(json!({ "delete": { "query": Query::All.to_string() } }))?;
        Ok(())
    }

    fn select(&self, select: &Select) -> Result<Page> {
        let mut params = vec![
            ("q", select.query.to_string()),
            ("start", select.start.to_string()),
            ("rows", select.rows.to_string()),
            ("sort", format!("{DOCUMENT_ID} asc")),
            ("wt", "json".to_owned()),
        ];
        params.extend(select.filters.iter().map(|f| ("fq", f.to_string())));
        let reply: Json = self
            .client
            .get(format!("{}/select", self.url))
            .query(&params)
            .send()?
            .error_for_status()?
            .json()?;
        let response = &reply["response"];
        let docs = match &response["docs"] {
            Json::Array(docs) => docs
                .iter()
                .filter_map(|d| d.as_object().cloned())
                .collect(),
            _ => Vec::new(),
        };
        Ok(Page {
            num_found: response["numFound"].as_u64().unwrap_or_default() as usize,
            docs,
        })
    }
}

// ------------- in process -------------
#[derive(Default)]
struct Core {
    docs: BTreeMap<String, Document>,
    version: i64,
}

/// An in-process index with the optimistic concurrency rules of a real
/// core: a positive `_version_` must match, a negative one requires the
/// document to be absent, and `1` only requires it to exist.
#[derive(Default)]
pub struct MemorySolrCore {
    core: RwLock<Core>,
}

fn values(document: &Document, field: &str) -> Vec<String> {
    document.get(field).map(strings).unwrap_or_default()
}

fn matching<'a>(docs: &'a BTreeMap<String, Document>, query: &Query) -> BTreeSet<&'a str> {
    match query {
        Query::All => docs.keys().map(String::as_str).collect(),
        Query::Term { field, value } => docs
            .iter()
            .filter(|(_, d)| values(d, field).contains(value))
            .map(|(id, _)| id.as_str())
            .collect(),
        Query::Join { from, to, inner } => {
            let keys: HashSet<String> = matching(docs, inner)
                .into_iter()
                .filter_map(|id| docs.get(id))
                .flat_map(|d| values(d, from))
                .collect();
            docs.iter()
                .filter(|(_, d)| values(d, to).iter().any(|v| keys.contains(v)))
                .map(|(id, _)| id.as_str())
                .collect()
        }
    }
}

impl MemorySolrCore {
    pub fn new() -> Self {
        Self::default()
    }
    /// Accepts query syntax the way the select handler does.
    pub fn query(&self, q: &str) -> Result<Page> {
        self.select(&Select::new(Query::parse(q)?).page(0, usize::MAX / 2))
    }
    pub fn len(&self) -> Result<usize> {
        Ok(self.core.read()?.docs.len())
    }
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl SolrClient for MemorySolrCore {
    fn add(&self, mut document: Document) -> Result<i64> {
        let id = match document.get(DOCUMENT_ID) {
            Some(Json::String(id)) => id.clone(),
            _ => return Err(CofferError::InvalidValue("document without an id".to_owned())),
        };
        let mut core = self.core.write()?;
        let stored = core
            .docs
            .get(&id)
            .and_then(|d| d.get(VERSION))
            .and_then(Json::as_i64);
        let conflict = match document.get(VERSION).and_then(Json::as_i64) {
            None | Some(0) => false,
            Some(1) => stored.is_none(),
            Some(v) if v < 0 => stored.is_some(),
            expected => stored != expected,
        };
        if conflict {
            debug!(id = %id, ?stored, "version conflict");
            return Err(CofferError::StaleObject(format!(
                "{id} has been updated since retrieval"
            )));
        }
        // clock based, as on a real core
        core.version = (core.version + 1).max(Utc::now().timestamp_micros());
        let version = core.version;
        document.insert(VERSION.to_owned(), json!(version));
        core.docs.insert(id, document);
        Ok(version)
    }

    fn delete_by_id(&self, id: &str) -> Result<()> {
        self.core.write()?.docs.remove(id);
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.core.write()?.docs.clear();
        Ok(())
    }

    fn select(&self, select: &Select) -> Result<Page> {
        let core = self.core.read()?;
        let mut hits = matching(&core.docs, &select.query);
        for filter in &select.filters {
            let allowed = matching(&core.docs, filter);
            hits.retain(|id| allowed.contains(id));
        }
        let docs = hits
            .iter()
            .skip(select.start)
            .take(select.rows)
            .filter_map(|id| core.docs.get(*id).cloned())
            .collect();
        Ok(Page {
            num_found: hits.len(),
            docs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, members: &[&str]) -> Document {
        let Json::Object(document) = json!({
            "id": id,
            "internal_resource_ssim": ["Book"],
            "member_ids_ssim": members,
        }) else {
            unreachable!()
        };
        document
    }

    #[test]
    fn joins_follow_field_values() {
        let core = MemorySolrCore::new();
        core.add(doc("id-a", &["id-b", "id-c"])).unwrap();
        core.add(doc("id-b", &[])).unwrap();
        core.add(doc("id-c", &["id-b"])).unwrap();
        let members = core
            .query("{!join from=member_ids_ssim to=id}id:\"id-a\"")
            .unwrap();
        let ids: Vec<&str> = members.docs.iter().filter_map(|d| d["id"].as_str()).collect();
        assert_eq!(ids, ["id-b", "id-c"]);
        let parents = core.query("member_ids_ssim:id-b").unwrap();
        assert_eq!(parents.num_found, 2);
    }

    #[test]
    fn versions_guard_concurrent_adds() {
        let core = MemorySolrCore::new();
        let first = core.add(doc("id-a", &[])).unwrap();
        let mut update = doc("id-a", &["id-x"]);
        update.insert(VERSION.to_owned(), json!(first));
        let second = core.add(update.clone()).unwrap();
        assert!(second > first);
        assert!(matches!(core.add(update), Err(CofferError::StaleObject(_))));
        let mut fresh = doc("id-a", &[]);
        fresh.insert(VERSION.to_owned(), json!(-1));
        assert!(matches!(core.add(fresh), Err(CofferError::StaleObject(_))));
    }

    #[test]
    fn pages_and_filters() {
        let core = MemorySolrCore::new();
        for id in ["id-1", "id-2", "id-3"] {
            core.add(doc(id, &[])).unwrap();
        }
        let select = Select::new(Query::All)
            .filter(Query::of_model("Book"))
            .page(1, 2);
        let page = core.select(&select).unwrap();
        assert_eq!(page.num_found, 3);
        assert_eq!(page.docs.len(), 1);
        assert_eq!(page.docs[0]["id"], json!("id-3"));
    }
}
