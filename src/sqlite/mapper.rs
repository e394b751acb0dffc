//! JSON codec for the metadata column.
//!
//! Plain strings, numbers and booleans are stored as themselves. Everything
//! that would be ambiguous as a bare JSON scalar is wrapped in a marker
//! object: `{"id": ..}` for references, `{"@id": ..}` for URIs,
//! `{"@value": .., "@language": ..}` for tagged literals and
//! `{"@value": .., "@type": "datetime"}` for timestamps. Nested resources
//! are objects carrying `internal_resource`.
use std::sync::Arc;

use serde_json::{Map, Number, Value as Json, json};

use crate::datatype::{Id, Value, format_datetime, parse_datetime};
use crate::error::{CofferError, Result};
use crate::mapping::{Slot, ValueMapper};
use crate::resource::{ID, INTERNAL_RESOURCE, Resource, TypeRegistry};

/// A stored JSON value together with the registry nested resources are
/// instantiated through.
#[derive(Debug)]
pub struct Stored {
    pub json: Json,
    pub types: Arc<TypeRegistry>,
}

pub struct JsonCodec {
    write: ValueMapper<Slot, Json>,
    read: ValueMapper<Stored, Vec<Value>>,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self {
            write: writer(),
            read: reader(),
        }
    }

    /// The metadata document of a resource: every attribute as an array.
    pub fn encode(&self, resource: &Resource) -> Result<Json> {
        encode_attributes(&self.write, resource)
    }

    pub fn decode_into(&self, resource: &mut Resource, metadata: Json) -> Result<()> {
        let Json::Object(fields) = metadata else {
            return Err(CofferError::corrupt("metadata is not a JSON object"));
        };
        let types = resource.types().clone();
        for (name, json) in fields {
            let values = self.read.resolve(Stored {
                json,
                types: types.clone(),
            })?;
            resource.load(&name, values)?;
        }
        Ok(())
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_attributes(write: &ValueMapper<Slot, Json>, resource: &Resource) -> Result<Json> {
    let mut document = Map::new();
    for (name, values) in resource.fields() {
        document.insert(name.to_owned(), write.resolve(Slot::Many(values.to_vec()))?);
    }
    Ok(Json::Object(document))
}

fn one(slot: &Slot, test: impl Fn(&Value) -> bool) -> bool {
    slot.value().is_some_and(test)
}

fn writer() -> ValueMapper<Slot, Json> {
    ValueMapper::<Slot, Json>::new("sqlite-write")
        .rule(Slot::is_many, |slot, m| match slot {
            Slot::Many(values) => Ok(Json::Array(m.resolve_all(values.into_iter().map(Slot::One))?)),
            Slot::One(_) => unreachable!(),
        })
        .rule(
            |s| one(s, |v| matches!(v, Value::Resource(_))),
            |slot, m| match slot {
                Slot::One(Value::Resource(nested)) => {
                    let Json::Object(mut document) = encode_attributes(m, &nested)? else {
                        unreachable!()
                    };
                    document.insert(INTERNAL_RESOURCE.to_owned(), json!(nested.tag()));
                    if let Some(id) = nested.id() {
                        document.insert(ID.to_owned(), json!(id.as_str()));
                    }
                    Ok(Json::Object(document))
                }
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Id(_))),
            |slot, _| match slot {
                Slot::One(Value::Id(id)) => Ok(json!({ "id": id.as_str() })),
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Uri(_))),
            |slot, _| match slot {
                Slot::One(Value::Uri(uri)) => Ok(json!({ "@id": uri })),
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Literal { .. })),
            |slot, _| match slot {
                Slot::One(Value::Literal { value, language }) => {
                    Ok(json!({ "@value": value, "@language": language }))
                }
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::DateTime(_))),
            |slot, _| match slot {
                Slot::One(Value::DateTime(t)) => {
                    Ok(json!({ "@value": format_datetime(&t), "@type": "datetime" }))
                }
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Float(_))),
            |slot, _| match slot {
                Slot::One(Value::Float(x)) => Number::from_f64(x)
                    .map(Json::Number)
                    .ok_or_else(|| CofferError::InvalidValue(format!("{x} cannot be stored as JSON"))),
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Integer(_))),
            |slot, _| match slot {
                Slot::One(Value::Integer(i)) => Ok(json!(i)),
                _ => unreachable!(),
            },
        )
        .rule(
            |s| one(s, |v| matches!(v, Value::Boolean(_))),
            |slot, _| match slot {
                Slot::One(Value::Boolean(b)) => Ok(json!(b)),
                _ => unreachable!(),
            },
        )
        .rule(|_| true, |slot, _| match slot {
            Slot::One(value) => Ok(json!(value.to_string())),
            Slot::Many(_) => unreachable!(),
        })
}

fn has_keys(json: &Json, keys: &[&str]) -> bool {
    json.as_object()
        .is_some_and(|o| keys.iter().all(|k| o.contains_key(*k)))
}

fn text(json: &Json, key: &str) -> Result<String> {
    json.get(key)
        .and_then(Json::as_str)
        .map(str::to_owned)
        .ok_or_else(|| CofferError::corrupt(format!("'{key}' is not a string in {json}")))
}

fn reader() -> ValueMapper<Stored, Vec<Value>> {
    ValueMapper::<Stored, Vec<Value>>::new("sqlite-read")
        .rule(
            |s| s.json.is_array(),
            |s, m| match s.json {
                Json::Array(items) => {
                    let types = s.types;
                    let nested = m.resolve_all(items.into_iter().map(|json| Stored {
                        json,
                        types: types.clone(),
                    }))?;
                    Ok(nested.into_iter().flatten().collect())
                }
                _ => unreachable!(),
            },
        )
        .rule(
            |s| s.json.is_null(),
            |_, _| Ok(Vec::new()),
        )
        .rule(
            |s| has_keys(&s.json, &[INTERNAL_RESOURCE]),
            |s, m| {
                let Json::Object(mut fields) = s.json else { unreachable!() };
                let tag = fields
                    .remove(INTERNAL_RESOURCE)
                    .and_then(|t| t.as_str().map(str::to_owned))
                    .ok_or_else(|| CofferError::corrupt("internal_resource is not a string"))?;
                let mut nested = s.types.resource(&tag);
                if let Some(Json::String(id)) = fields.remove(ID) {
                    nested.set_id(Id::new(id));
                }
                for (name, json) in fields {
                    let values = m.resolve(Stored {
                        json,
                        types: s.types.clone(),
                    })?;
                    nested.load(&name, values)?;
                }
                Ok(vec![Value::from(nested)])
            },
        )
        .rule(
            |s| has_keys(&s.json, &["id"]),
            |s, _| Ok(vec![Value::Id(Id::new(text(&s.json, "id")?))]),
        )
        .rule(
            |s| has_keys(&s.json, &["@id"]),
            |s, _| Ok(vec![Value::Uri(text(&s.json, "@id")?)]),
        )
        .rule(
            |s| has_keys(&s.json, &["@value", "@type"]),
            |s, _| Ok(vec![Value::DateTime(parse_datetime(&text(&s.json, "@value")?)?)]),
        )
        .rule(
            |s| has_keys(&s.json, &["@value", "@language"]),
            |s, _| {
                Ok(vec![Value::literal(
                    text(&s.json, "@value")?,
                    text(&s.json, "@language")?,
                )])
            },
        )
        .rule(
            |s| s.json.is_string(),
            |s, _| Ok(vec![Value::String(text_of(s.json))]),
        )
        .rule(
            |s| s.json.is_i64(),
            |s, _| Ok(s.json.as_i64().map(Value::Integer).into_iter().collect()),
        )
        .rule(
            |s| s.json.is_number(),
            |s, _| Ok(s.json.as_f64().map(Value::Float).into_iter().collect()),
        )
        .rule(
            |s| s.json.is_boolean(),
            |s, _| Ok(s.json.as_bool().map(Value::Boolean).into_iter().collect()),
        )
        .rule(|_| true, |s, _| {
            Err(CofferError::corrupt(format!("unrecognized stored value {}", s.json)))
        })
}

fn text_of(json: Json) -> String {
    match json {
        Json::String(s) => s,
        other => other.to_string(),
    }
}
