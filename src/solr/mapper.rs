//! Resource <-> flat index document.
//!
//! Every attribute `name` becomes two multi-valued fields: `name_ssim`
//! holds exact values with a type prefix (`id-`, `uri-`, `integer-`, ...)
//! so they can be read back typed, `name_tesim` holds the plain text for
//! full-text search. Nested resources are stored as the JSON of their own
//! document behind a `resource-` prefix.
use std::sync::Arc;

use serde_json::{Map, Value as Json, json};

use crate::datatype::{Id, Value, format_datetime, parse_datetime};
use crate::error::{CofferError, Result};
use crate::mapping::{Slot, ValueMapper};
use crate::resource::{CREATED_AT, INTERNAL_RESOURCE, Resource, TypeRegistry, UPDATED_AT};

pub type Document = Map<String, Json>;

pub const EXACT: &str = "_ssim";
pub const TEXT: &str = "_tesim";
pub const DATE: &str = "_dtsi";
pub const VERSION: &str = "_version_";
pub const DOCUMENT_ID: &str = "id";
pub const ID_PREFIX: &str = "id-";

/// The document identifier of a resource identifier.
pub fn document_id(id: &Id) -> String {
    format!("{ID_PREFIX}{id}")
}

pub fn exact_field(property: &str) -> String {
    format!("{property}{EXACT}")
}

/// One value as it is indexed.
#[derive(Debug)]
pub struct Indexed {
    exact: String,
    text: Option<String>,
}

impl Indexed {
    fn new(prefix: &str, value: impl std::fmt::Display) -> Self {
        let text = value.to_string();
        Self {
            exact: format!("{prefix}-{text}"),
            text: Some(text),
        }
    }
}

/// An exact field value on its way back, with the registry nested
/// resources are instantiated through.
#[derive(Debug)]
pub struct Encoded {
    pub text: String,
    pub types: Arc<TypeRegistry>,
}

impl Encoded {
    fn payload(&self, prefix: &str) -> Option<&str> {
        self.text
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('-'))
    }
    fn has(&self, prefix: &str) -> bool {
        self.payload(prefix).is_some()
    }
}

pub struct DocumentMapper {
    write: ValueMapper<Slot, Vec<Indexed>>,
    read: ValueMapper<Encoded, Value>,
    types: Arc<TypeRegistry>,
}

impl DocumentMapper {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            write: writer(),
            read: reader(),
            types,
        }
    }

    pub fn to_document(&self, resource: &Resource) -> Result<Document> {
        document(&self.write, resource)
    }

    /// The resource a document describes, without lock tokens.
    pub fn to_resource(&self, document: Document) -> Result<Resource> {
        resource(&self.read, &self.types, document)
    }
}

fn push(document: &mut Document, field: String, value: String) {
    match document.entry(field).or_insert_with(|| Json::Array(Vec::new())) {
        Json::Array(values) => values.push(Json::String(value)),
        other => *other = json!([value]),
    }
}

fn document(write: &ValueMapper<Slot, Vec<Indexed>>, resource: &Resource) -> Result<Document> {
    let mut document = Document::new();
    if let Some(id) = resource.id() {
        document.insert(DOCUMENT_ID.to_owned(), json!(document_id(id)));
    }
    for suffix in [EXACT, TEXT] {
        push(&mut document, format!("{INTERNAL_RESOURCE}{suffix}"), resource.tag().to_owned());
    }
    for (name, time) in [(CREATED_AT, resource.created_at()), (UPDATED_AT, resource.updated_at())] {
        if let Some(time) = time {
            document.insert(format!("{name}{DATE}"), json!(format_datetime(time)));
        }
    }
    for (name, values) in resource.fields() {
        for indexed in write.resolve(Slot::Many(values.to_vec()))? {
            push(&mut document, exact_field(name), indexed.exact);
            if let Some(text) = indexed.text {
                push(&mut document, format!("{name}{TEXT}"), text);
            }
        }
    }
    Ok(document)
}

/// Field values as strings, whether stored single or multi-valued.
pub fn strings(json: &Json) -> Vec<String> {
    match json {
        Json::Array(items) => items.iter().flat_map(strings).collect(),
        Json::String(s) => vec![s.clone()],
        Json::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

fn resource(
    read: &ValueMapper<Encoded, Value>,
    types: &Arc<TypeRegistry>,
    mut document: Document,
) -> Result<Resource> {
    let tag = document
        .remove(&exact_field(INTERNAL_RESOURCE))
        .and_then(|t| strings(&t).into_iter().next())
        .ok_or_else(|| CofferError::corrupt("document without internal_resource"))?;
    let mut resource = types.resource(&tag);
    if let Some(Json::String(id)) = document.remove(DOCUMENT_ID) {
        resource.set_id(Id::new(id.strip_prefix(ID_PREFIX).unwrap_or(&id)));
    }
    let mut stamp = |name: &str| -> Result<_> {
        match document.remove(&format!("{name}{DATE}")) {
            Some(Json::String(time)) => Ok(Some(parse_datetime(&time)?)),
            _ => Ok(None),
        }
    };
    let (created_at, updated_at) = (stamp(CREATED_AT)?, stamp(UPDATED_AT)?);
    resource.set_timestamps(created_at, updated_at);
    for (field, json) in document {
        let Some(name) = field.strip_suffix(EXACT) else {
            continue;
        };
        let values = read.resolve_all(strings(&json).into_iter().map(|text| Encoded {
            text,
            types: types.clone(),
        }))?;
        resource.load(name, values)?;
    }
    Ok(resource)
}

fn one(slot: &Slot, test: impl Fn(&Value) -> bool) -> bool {
    slot.value().is_some_and(test)
}

fn writer() -> ValueMapper<Slot, Vec<Indexed>> {
    ValueMapper::<Slot, Vec<Indexed>>::new("solr-write")
        .rule(Slot::is_many, |slot, m| match slot {
            Slot::Many(values) => Ok(m
                .resolve_all(values.into_iter().map(Slot::One))?
                .into_iter()
                .flatten()
                .collect()),
            Slot::One(_) => unreachable!(),
        })
        .rule(
            |s| one(s, |v| matches!(v, Value::Resource(_))),
            |slot, m| match slot {
                Slot::One(Value::Resource(nested)) => {
                    let json = Json::Object(document(m, &nested)?);
                    Ok(vec![Indexed {
                        exact: format!("resource-{json}"),
                        text: None,
                    }])
                }
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Id(_))),
            |slot, _| match slot {
                Slot::One(Value::Id(id)) => Ok(vec![Indexed::new("id", id)]),
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Uri(_))),
            |slot, _| match slot {
                Slot::One(Value::Uri(uri)) => Ok(vec![Indexed::new("uri", uri)]),
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Literal { .. })),
            |slot, _| match slot {
                Slot::One(Value::Literal { value, language }) => Ok(vec![Indexed {
                    exact: format!("literal-{value}@{language}"),
                    text: Some(value),
                }]),
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Integer(_))),
            |slot, _| match slot {
                Slot::One(Value::Integer(i)) => Ok(vec![Indexed::new("integer", i)]),
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Float(_))),
            |slot, _| match slot {
                Slot::One(Value::Float(x)) => Ok(vec![Indexed::new("float", format!("{x:?}"))]),
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Boolean(_))),
            |slot, _| match slot {
                Slot::One(Value::Boolean(b)) => Ok(vec![Indexed::new("boolean", b)]),
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::DateTime(_))),
            |slot, _| match slot {
                Slot::One(Value::DateTime(t)) => Ok(vec![Indexed::new("datetime", format_datetime(&t))]),
                _ => unreachable!(),
            },
        )
        .rule(|_| true, |slot, _| match slot {
            Slot::One(value) => Ok(vec![Indexed::new("string", value)]),
            Slot::Many(_) => unreachable!(),
        })
}

fn parsed<T: std::str::FromStr>(e: &Encoded, prefix: &str) -> Result<T> {
    e.payload(prefix)
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| CofferError::corrupt(format!("cannot read '{}' as {prefix}", e.text)))
}

fn reader() -> ValueMapper<Encoded, Value> {
    ValueMapper::<Encoded, Value>::new("solr-read")
        .rule(
            |e| e.has("resource"),
            |e, m| {
                let json: Json = serde_json::from_str(e.payload("resource").unwrap_or_default())?;
                let Json::Object(nested) = json else {
                    return Err(CofferError::corrupt("nested resource is not an object"));
                };
                Ok(Value::from(resource(m, &e.types, nested)?))
            },
        )
        .rule(
            |e| e.has("id"),
            |e, _| Ok(Value::Id(Id::new(e.payload("id").unwrap_or_default()))),
        )
        .rule(
            |e| e.has("uri"),
            |e, _| Ok(Value::uri(e.payload("uri").unwrap_or_default())),
        )
        .rule(
            |e| e.has("literal"),
            |e, _| {
                let payload = e.payload("literal").unwrap_or_default();
                match payload.rsplit_once('@') {
                    Some((value, language)) => Ok(Value::literal(value, language)),
                    None => Ok(Value::String(payload.to_owned())),
                }
            },
        )
        .rule(
            |e| e.has("integer"),
            |e, _| Ok(Value::Integer(parsed(&e, "integer")?)),
        )
        .rule(
            |e| e.has("float"),
            |e, _| Ok(Value::Float(parsed(&e, "float")?)),
        )
        .rule(
            |e| e.has("boolean"),
            |e, _| Ok(Value::Boolean(parsed(&e, "boolean")?)),
        )
        .rule(
            |e| e.has("datetime"),
            |e, _| Ok(Value::DateTime(parse_datetime(e.payload("datetime").unwrap_or_default())?)),
        )
        .rule(
            |e| e.has("string"),
            |e, _| Ok(Value::String(e.payload("string").unwrap_or_default().to_owned())),
        )
        // values indexed by something else come back as plain strings
        .rule(|_| true, |e, _| Ok(Value::String(e.text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceSchema;
    use chrono::{TimeZone, Utc};

    fn types() -> Arc<TypeRegistry> {
        Arc::new(
            TypeRegistry::new()
                .with(ResourceSchema::new("Book").attribute("title").attribute("tags"))
                .with(ResourceSchema::new("Author").attribute("name")),
        )
    }

    #[test]
    fn every_attribute_gets_an_exact_and_a_text_field() {
        let types = types();
        let mapper = DocumentMapper::new(types.clone());
        let mut book = types.resource("Book");
        book.set_id(Id::new("b1"));
        book.set("title", "Lathe of Heaven").unwrap();
        let document = mapper.to_document(&book).unwrap();
        assert_eq!(document["id"], json!("id-b1"));
        assert_eq!(document["title_ssim"], json!(["string-Lathe of Heaven"]));
        assert_eq!(document["title_tesim"], json!(["Lathe of Heaven"]));
        assert_eq!(document["internal_resource_ssim"], json!(["Book"]));
    }

    #[test]
    fn prefixes_bring_types_back() {
        let types = types();
        let mapper = DocumentMapper::new(types.clone());
        let mut author = types.resource("Author");
        author.set("name", Value::literal("Ursula", "en")).unwrap();
        let mut book = types.resource("Book");
        book.set_id(Id::new("b2"));
        book.set(
            "tags",
            vec![
                Value::id("a1"),
                Value::uri("http://example.com/x"),
                Value::from(Utc.with_ymd_and_hms(1971, 1, 1, 0, 0, 0).unwrap()),
                Value::from(3),
                Value::from(2.0),
                Value::from(false),
                Value::from("string-like"),
                Value::from(author),
            ],
        )
        .unwrap();
        let back = mapper.to_resource(mapper.to_document(&book).unwrap()).unwrap();
        assert_eq!(back.id(), Some(&Id::new("b2")));
        assert_eq!(back["tags"], book["tags"]);
    }
}
