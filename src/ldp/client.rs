//! Transport to a linked-data store. [`HttpLdpClient`] talks to a real LDP
//! server over HTTP; [`MemoryLdpServer`] keeps a container tree in process
//! and behaves the same way for the operations the adapter uses.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE, ETAG, IF_MATCH};
use tracing::debug;

use crate::error::{CofferError, Result};
use crate::ldp::graph::{Graph, Term, Triple};
use crate::ldp::schema::LDP_CONTAINS;

const NTRIPLES: &str = "application/n-triples";
const PREFER_CONTAINMENT: &str = "return=representation; include=\"http://www.w3.org/ns/ldp#PreferContainment\"";
const PREFER_INBOUND: &str = "return=representation; include=\"http://fedora.info/definitions/fcrepo#PreferInboundReferences\"";
const PREFER_LENIENT: &str = "handling=lenient; received=\"minimal\"";

/// A container's graph and the entity tag it was served with.
#[derive(Clone, Debug)]
pub struct Container {
    pub graph: Graph,
    pub etag: String,
}

pub trait LdpClient: Send + Sync {
    /// None when nothing lives at `uri`.
    fn get(&self, uri: &str) -> Result<Option<Container>>;
    /// Replaces the container's graph. With `if_match`, a different current
    /// entity tag fails with a stale object error. Returns the new tag.
    fn put(&self, uri: &str, graph: &Graph, if_match: Option<&str>) -> Result<String>;
    /// Removes `uri` and everything below it; false when it did not exist.
    fn delete(&self, uri: &str) -> Result<bool>;
    fn children(&self, uri: &str) -> Result<Vec<String>>;
    /// Statements held by other containers whose object is `uri`.
    fn inbound(&self, uri: &str) -> Result<Graph>;
    fn put_binary(&self, uri: &str, content: &[u8], filename: &str) -> Result<()>;
    fn get_binary(&self, uri: &str) -> Result<Option<Vec<u8>>>;
}

// ------------- HTTP -------------
pub struct HttpLdpClient {
    client: Client,
}

impl HttpLdpClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
        })
    }
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
    fn fetch(&self, uri: &str, prefer: &str) -> Result<Option<Container>> {
        let response = self
            .client
            .get(uri)
            .header(ACCEPT, NTRIPLES)
            .header("Prefer", prefer)
            .send()?;
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        let etag = header(&response, ETAG);
        let graph = Graph::from_ntriples(&response.text()?)?;
        Ok(Some(Container { graph, etag }))
    }
}

fn header(response: &reqwest::blocking::Response, name: reqwest::header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

impl LdpClient for HttpLdpClient {
    fn get(&self, uri: &str) -> Result<Option<Container>> {
        self.fetch(uri, PREFER_CONTAINMENT)
    }

    fn put(&self, uri: &str, graph: &Graph, if_match: Option<&str>) -> Result<String> {
        let mut request = self
            .client
            .put(uri)
            .header(CONTENT_TYPE, NTRIPLES)
            .header("Prefer", PREFER_LENIENT)
            .body(graph.to_ntriples());
        if let Some(etag) = if_match {
            request = request.header(IF_MATCH, etag);
        }
        let response = request.send()?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            return Err(CofferError::StaleObject(format!(
                "{uri} has been updated since retrieval"
            )));
        }
        let response = response.error_for_status()?;
        let etag = header(&response, ETAG);
        if !etag.is_empty() {
            return Ok(etag);
        }
        // some servers only report the tag on reads
        Ok(self.get(uri)?.map(|c| c.etag).unwrap_or_default())
    }

    fn delete(&self, uri: &str) -> Result<bool> {
        let response = self.client.delete(uri).send()?;
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok(false);
        }
        response.error_for_status()?;
        // free the path for reuse; servers without tombstones answer 404
        let tombstone = self.client.delete(format!("{uri}/fcr:tombstone")).send()?;
        debug!(uri, status = %tombstone.status(), "removed tombstone");
        Ok(true)
    }

    fn children(&self, uri: &str) -> Result<Vec<String>> {
        Ok(match self.get(uri)? {
            Some(container) => container
                .graph
                .objects(uri, LDP_CONTAINS)
                .filter_map(Term::as_iri)
                .map(str::to_owned)
                .collect(),
            None => Vec::new(),
        })
    }

    fn inbound(&self, uri: &str) -> Result<Graph> {
        let target = Term::iri(uri);
        Ok(match self.fetch(uri, PREFER_INBOUND)? {
            Some(container) => container
                .graph
                .into_iter()
                .filter(|t| t.object == target && t.subject_iri() != Some(uri))
                .collect(),
            None => Graph::new(),
        })
    }

    fn put_binary(&self, uri: &str, content: &[u8], filename: &str) -> Result<()> {
        self.client
            .put(uri)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\""))
            .body(content.to_vec())
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn get_binary(&self, uri: &str) -> Result<Option<Vec<u8>>> {
        let response = self.client.get(uri).send()?;
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.bytes()?.to_vec()))
    }
}

// ------------- in process -------------
#[derive(Default)]
struct Tree {
    // N-Triples text, the way a server would hold it
    containers: BTreeMap<String, String>,
    binaries: BTreeMap<String, (Vec<u8>, String)>,
}

/// An in-process container tree with entity tags derived from content.
#[derive(Default)]
pub struct MemoryLdpServer {
    tree: RwLock<Tree>,
}

fn etag_of(body: &str) -> String {
    format!("W/\"{}\"", blake3::hash(body.as_bytes()).to_hex())
}

fn below<'a>(uri: &str, candidate: &'a str) -> Option<&'a str> {
    candidate
        .strip_prefix(uri)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
}

impl MemoryLdpServer {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> Result<usize> {
        Ok(self.tree.read()?.containers.len())
    }
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl LdpClient for MemoryLdpServer {
    fn get(&self, uri: &str) -> Result<Option<Container>> {
        let tree = self.tree.read()?;
        match tree.containers.get(uri) {
            Some(body) => Ok(Some(Container {
                graph: Graph::from_ntriples(body)?,
                etag: etag_of(body),
            })),
            None => Ok(None),
        }
    }

    fn put(&self, uri: &str, graph: &Graph, if_match: Option<&str>) -> Result<String> {
        let mut tree = self.tree.write()?;
        if let Some(expected) = if_match {
            let current = tree.containers.get(uri).map(|body| etag_of(body));
            if current.as_deref() != Some(expected) {
                return Err(CofferError::StaleObject(format!(
                    "{uri} has been updated since retrieval"
                )));
            }
        }
        let body = graph.to_ntriples();
        let etag = etag_of(&body);
        tree.containers.insert(uri.to_owned(), body);
        Ok(etag)
    }

    fn delete(&self, uri: &str) -> Result<bool> {
        let mut tree = self.tree.write()?;
        let before = tree.containers.len() + tree.binaries.len();
        tree.containers
            .retain(|key, _| key != uri && below(uri, key).is_none());
        tree.binaries
            .retain(|key, _| key != uri && below(uri, key).is_none());
        Ok(tree.containers.len() + tree.binaries.len() < before)
    }

    /// Immediate children, including intermediate path segments that only
    /// exist because something deeper was stored.
    fn children(&self, uri: &str) -> Result<Vec<String>> {
        let tree = self.tree.read()?;
        let children: BTreeSet<String> = tree
            .containers
            .keys()
            .chain(tree.binaries.keys())
            .filter_map(|key| below(uri, key))
            .filter_map(|rest| rest.split('/').next())
            .map(|segment| format!("{uri}/{segment}"))
            .collect();
        Ok(children.into_iter().collect())
    }

    fn inbound(&self, uri: &str) -> Result<Graph> {
        let tree = self.tree.read()?;
        let target = Term::iri(uri);
        let mut inbound = Graph::new();
        for (key, body) in &tree.containers {
            if key == uri {
                continue;
            }
            let graph = Graph::from_ntriples(body)?;
            inbound.merge(
                graph
                    .into_iter()
                    .filter(|t: &Triple| t.object == target)
                    .collect(),
            );
        }
        Ok(inbound)
    }

    fn put_binary(&self, uri: &str, content: &[u8], filename: &str) -> Result<()> {
        self.tree
            .write()?
            .binaries
            .insert(uri.to_owned(), (content.to_vec(), filename.to_owned()));
        Ok(())
    }

    fn get_binary(&self, uri: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.read()?.binaries.get(uri).map(|(content, _)| content.clone()))
    }
}
