//! Predicates: the fixed vocabularies the store understands, and the
//! mapping between attribute names and predicate IRIs.
use bimap::BiMap;

use crate::datatype::Id;

pub const IANA_FIRST: &str = "http://www.iana.org/assignments/relation/first";
pub const IANA_LAST: &str = "http://www.iana.org/assignments/relation/last";
pub const IANA_NEXT: &str = "http://www.iana.org/assignments/relation/next";
pub const IANA_PREV: &str = "http://www.iana.org/assignments/relation/prev";
pub const ORE_PROXY_FOR: &str = "http://www.openarchives.org/ore/terms/proxyFor";
pub const ORE_PROXY_IN: &str = "http://www.openarchives.org/ore/terms/proxyIn";
pub const LDP: &str = "http://www.w3.org/ns/ldp";
pub const LDP_CONTAINS: &str = "http://www.w3.org/ns/ldp#contains";
pub const FEDORA: &str = "http://fedora.info";

pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_DATETIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

pub const DEFAULT_PREFIX: &str = "http://example.com/predicate";

/// Attribute names with an explicit predicate, and a generated
/// `<prefix>/<name>` predicate for everything else.
#[derive(Clone, Debug)]
pub struct PermissiveSchema {
    prefix: String,
    mapping: BiMap<String, String>,
}

impl PermissiveSchema {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_owned(),
            mapping: BiMap::new(),
        }
    }
    pub fn map(mut self, property: &str, predicate: &str) -> Self {
        self.mapping.insert(property.to_owned(), predicate.to_owned());
        self
    }
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
    pub fn predicate_for(&self, property: &str) -> String {
        match self.mapping.get_by_left(property) {
            Some(predicate) => predicate.clone(),
            None => format!("{}/{}", self.prefix, property),
        }
    }
    /// None for predicates that are neither mapped nor in the namespace.
    pub fn property_for(&self, predicate: &str) -> Option<String> {
        if let Some(property) = self.mapping.get_by_right(predicate) {
            return Some(property.clone());
        }
        predicate
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .map(str::to_owned)
    }
    /// Datatype of literals holding a resource identifier.
    pub fn id_datatype(&self) -> String {
        format!("{}/coffer_id", self.prefix)
    }
}

impl Default for PermissiveSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the codecs need to know about one store: where its
/// containers live and how attributes become predicates.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    pub schema: PermissiveSchema,
    prefix: String,
}

impl Vocabulary {
    /// `prefix` is the URI of the base container; resources live below it.
    pub fn new(prefix: &str, schema: PermissiveSchema) -> Self {
        Self {
            schema,
            prefix: prefix.trim_end_matches('/').to_owned(),
        }
    }
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
    /// Identifiers containing `/` land in nested containers.
    pub fn id_to_uri(&self, id: &Id) -> String {
        format!("{}/{}", self.prefix, id.as_str().trim_start_matches('/'))
    }
    /// The identifier of a container URI, ignoring any fragment.
    pub fn uri_to_id(&self, uri: &str) -> Option<Id> {
        let container = uri.split('#').next()?;
        container
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|id| !id.is_empty())
            .map(Id::new)
    }
    pub fn is_internal(&self, uri: &str) -> bool {
        self.uri_to_id(uri).is_some()
    }
    pub fn predicate(&self, property: &str) -> String {
        self.schema.predicate_for(property)
    }
}
