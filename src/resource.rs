//! Typed, attribute-bearing records and the coercion rules applied when
//! attribute values are assigned.
//!
//! Every attribute is multi-valued. A *Set* attribute flattens its input,
//! drops blanks and keeps the first occurrence of duplicates. A *Sequence*
//! attribute keeps the input order and duplicates. `member_ids` is always a
//! Sequence, whatever the schema says.
//!
//! Concrete types are described by a [`ResourceSchema`] and looked up by
//! their type tag through a [`TypeRegistry`], which is also how a raw map
//! carrying `internal_resource` becomes a nested [`Resource`].

// hashmaps keyed by type tags
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;
use std::collections::{BTreeMap, HashMap};
use std::ops::Index;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

// used to print out readable forms of a resource
use std::fmt;

use crate::datatype::{Id, OptimisticLockToken, Value};
use crate::error::{CofferError, Result};

pub const ID: &str = "id";
pub const INTERNAL_RESOURCE: &str = "internal_resource";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const NEW_RECORD: &str = "new_record";
pub const RESERVED_ATTRIBUTES: [&str; 5] = [ID, INTERNAL_RESOURCE, CREATED_AT, UPDATED_AT, NEW_RECORD];
pub const MEMBER_IDS: &str = "member_ids";
pub const OPTIMISTIC_LOCK: &str = "optimistic_lock_token";

pub const FILE_SET: &str = "FileSet";
pub const FILE_IDENTIFIERS: &str = "file_identifiers";
pub const ORIGINAL_FILENAME: &str = "original_filename";

pub type TagHasher = BuildHasherDefault<SeaHasher>;

const EMPTY: &[Value] = &[];

// ------------- Schema -------------
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AttributeKind {
    Set,
    Sequence,
}

#[derive(Clone, Debug)]
pub struct ResourceSchema {
    tag: String,
    attributes: Vec<(String, AttributeKind)>,
    optimistic_locking: bool,
    permissive: bool,
}

impl ResourceSchema {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            optimistic_locking: false,
            permissive: false,
        }
    }
    /// Accepts any attribute name, all with Set semantics.
    pub fn permissive(tag: impl Into<String>) -> Self {
        Self {
            permissive: true,
            ..Self::new(tag)
        }
    }
    /// Schema of the child resources created for uploaded files.
    pub fn file_set() -> Self {
        Self::new(FILE_SET)
            .attribute(FILE_IDENTIFIERS)
            .attribute(ORIGINAL_FILENAME)
            .ordered(MEMBER_IDS)
    }
    pub fn attribute(self, name: &str) -> Self {
        self.declare(name, AttributeKind::Set)
    }
    pub fn ordered(self, name: &str) -> Self {
        self.declare(name, AttributeKind::Sequence)
    }
    pub fn optimistic_locking(mut self) -> Self {
        self.optimistic_locking = true;
        self
    }
    fn declare(mut self, name: &str, kind: AttributeKind) -> Self {
        if RESERVED_ATTRIBUTES.contains(&name) {
            warn!(tag = %self.tag, attribute = name, "reserved attribute redeclared, the declaration takes precedence");
        }
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = kind,
            None => self.attributes.push((name.to_owned(), kind)),
        }
        self
    }
    pub fn tag(&self) -> &str {
        &self.tag
    }
    pub fn is_permissive(&self) -> bool {
        self.permissive
    }
    pub fn locks_optimistically(&self) -> bool {
        self.optimistic_locking
    }
    pub fn declares(&self, name: &str) -> bool {
        if self.permissive {
            return !RESERVED_ATTRIBUTES.contains(&name) && name != OPTIMISTIC_LOCK;
        }
        self.attributes.iter().any(|(n, _)| n == name)
    }
    pub fn kind_of(&self, name: &str) -> AttributeKind {
        if name == MEMBER_IDS {
            return AttributeKind::Sequence;
        }
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, kind)| *kind)
            .unwrap_or(AttributeKind::Set)
    }
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(n, _)| n.as_str())
    }
}

// ------------- Type registry -------------
/// Maps type tags to schemas. Built once and shared by every resource.
#[derive(Debug)]
pub struct TypeRegistry {
    schemas: HashMap<String, Arc<ResourceSchema>, TagHasher>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            schemas: HashMap::default(),
        }
        .with(ResourceSchema::file_set())
    }
    pub fn with(mut self, schema: ResourceSchema) -> Self {
        self.schemas.insert(schema.tag.clone(), Arc::new(schema));
        self
    }
    pub fn knows(&self, tag: &str) -> bool {
        self.schemas.contains_key(tag)
    }
    pub fn schema(&self, tag: &str) -> Arc<ResourceSchema> {
        match self.schemas.get(tag) {
            Some(schema) => schema.clone(),
            None => {
                warn!(tag, "unknown resource type, using a permissive schema");
                Arc::new(ResourceSchema::permissive(tag))
            }
        }
    }
    /// A fresh, unsaved resource of the given type.
    pub fn resource(self: &Arc<Self>, tag: &str) -> Resource {
        Resource::new(self.clone(), self.schema(tag))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Input -------------
/// Attribute input before coercion.
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    Null,
    Value(Value),
    List(Vec<Input>),
    Map(BTreeMap<String, Input>),
}

impl Input {
    pub fn map<'a>(pairs: impl IntoIterator<Item = (&'a str, Input)>) -> Self {
        Self::Map(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }
}

macro_rules! input_from_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Input {
            fn from(v: $t) -> Self {
                Input::Value(Value::from(v))
            }
        })*
    };
}
input_from_value!(&str, String, i64, i32, f64, bool, DateTime<Utc>, Id, Resource);

impl From<Value> for Input {
    fn from(v: Value) -> Self {
        Input::Value(v)
    }
}
impl<T: Into<Input>> From<Vec<T>> for Input {
    fn from(v: Vec<T>) -> Self {
        Input::List(v.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<Input>, const N: usize> From<[T; N]> for Input {
    fn from(v: [T; N]) -> Self {
        Input::List(v.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<Input>> From<Option<T>> for Input {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Input::Null)
    }
}

// ------------- Resource -------------
#[derive(Clone)]
pub struct Resource {
    types: Arc<TypeRegistry>,
    schema: Arc<ResourceSchema>,
    id: Option<Id>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    new_record: bool,
    lock_tokens: Vec<OptimisticLockToken>,
    attributes: BTreeMap<String, Vec<Value>>,
}

impl Resource {
    pub fn new(types: Arc<TypeRegistry>, schema: Arc<ResourceSchema>) -> Self {
        Self {
            types,
            schema,
            id: None,
            created_at: None,
            updated_at: None,
            new_record: true,
            lock_tokens: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }
    pub fn build<'a>(
        types: &Arc<TypeRegistry>,
        tag: &str,
        attributes: impl IntoIterator<Item = (&'a str, Input)>,
    ) -> Result<Self> {
        let mut resource = types.resource(tag);
        for (name, input) in attributes {
            resource.set(name, input)?;
        }
        Ok(resource)
    }
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }
    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }
    pub fn tag(&self) -> &str {
        self.schema.tag()
    }
    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }
    /// The identifier of a resource that must have one.
    pub fn require_id(&self) -> Result<&Id> {
        self.id.as_ref().ok_or_else(|| {
            CofferError::InvalidIdentifier(format!("{} has no identifier", self.tag()))
        })
    }
    pub fn set_id(&mut self, id: impl Into<Id>) {
        let id = id.into();
        self.id = if id.is_blank() { None } else { Some(id) };
    }
    /// Returns true when an identifier had to be generated.
    pub fn assign_id_if_absent(&mut self) -> bool {
        if self.id.is_some() {
            return false;
        }
        self.id = Some(Id::generate());
        true
    }
    pub fn created_at(&self) -> Option<&DateTime<Utc>> {
        self.created_at.as_ref()
    }
    pub fn updated_at(&self) -> Option<&DateTime<Utc>> {
        self.updated_at.as_ref()
    }
    pub fn set_timestamps(&mut self, created_at: Option<DateTime<Utc>>, updated_at: Option<DateTime<Utc>>) {
        self.created_at = created_at;
        self.updated_at = updated_at;
    }
    /// `created_at` is only ever set once, `updated_at` on every call.
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
    }
    pub fn is_new(&self) -> bool {
        self.new_record
    }
    pub fn persisted(&self) -> bool {
        !self.new_record
    }
    pub fn mark_persisted(&mut self) {
        self.new_record = false;
    }

    // ------------- locking -------------
    pub fn lock_tokens(&self) -> &[OptimisticLockToken] {
        &self.lock_tokens
    }
    pub fn lock_token_for(&self, adapter_id: &Id) -> Option<&OptimisticLockToken> {
        self.lock_tokens.iter().find(|t| t.adapter_id() == adapter_id)
    }
    /// Replaces whatever token the same adapter issued before.
    pub fn set_lock_token(&mut self, token: OptimisticLockToken) {
        self.lock_tokens.retain(|t| t.adapter_id() != token.adapter_id());
        self.lock_tokens.push(token);
    }
    pub fn clear_lock_tokens(&mut self) {
        self.lock_tokens.clear();
    }

    // ------------- attributes -------------
    /// Values of an attribute, empty when it was never set.
    pub fn get(&self, name: &str) -> &[Value] {
        self.attributes.get(name).map(Vec::as_slice).unwrap_or(EMPTY)
    }
    pub fn first(&self, name: &str) -> Option<&Value> {
        self.get(name).first()
    }
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
    pub fn set(&mut self, name: &str, input: impl Into<Input>) -> Result<()> {
        let input = input.into();
        if !self.schema.declares(name) {
            if RESERVED_ATTRIBUTES.contains(&name) || name == OPTIMISTIC_LOCK {
                return self.set_reserved(name, input);
            }
            return Err(CofferError::InvalidValue(format!(
                "{} has no attribute '{}'",
                self.tag(),
                name
            )));
        }
        let values = match self.schema.kind_of(name) {
            AttributeKind::Set => coerce_set(&self.types, input)?,
            AttributeKind::Sequence => coerce_sequence(&self.types, input)?,
        };
        self.attributes.insert(name.to_owned(), values);
        Ok(())
    }
    /// Like `set`, but drops attributes the schema does not know. Used when
    /// reading back stored data written by another version of a type.
    pub fn load(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if !self.schema.declares(name) {
            debug!(tag = %self.tag(), attribute = name, "dropping undeclared attribute");
            return Ok(());
        }
        self.set(name, Input::List(values.into_iter().map(Input::Value).collect()))
    }
    fn set_reserved(&mut self, name: &str, input: Input) -> Result<()> {
        let value = match input {
            Input::Null => None,
            Input::Value(v) => Some(v),
            Input::List(mut items) if items.len() <= 1 && name != OPTIMISTIC_LOCK => {
                match items.pop() {
                    Some(Input::Value(v)) => Some(v),
                    _ => None,
                }
            }
            Input::List(items) if name == OPTIMISTIC_LOCK => {
                self.lock_tokens.clear();
                for item in items {
                    if let Input::Value(Value::String(text)) = item {
                        self.set_lock_token(OptimisticLockToken::deserialize(&text)?);
                    }
                }
                return Ok(());
            }
            other => {
                return Err(CofferError::InvalidValue(format!(
                    "'{name}' cannot hold {other:?}"
                )));
            }
        };
        match (name, value) {
            (ID, None) => self.id = None,
            (ID, Some(Value::Id(id))) => self.set_id(id),
            (ID, Some(Value::String(id))) => self.set_id(id),
            (INTERNAL_RESOURCE, Some(Value::String(tag))) if tag == self.tag() => {}
            (CREATED_AT, Some(Value::DateTime(t))) => self.created_at = Some(t),
            (CREATED_AT, None) => self.created_at = None,
            (UPDATED_AT, Some(Value::DateTime(t))) => self.updated_at = Some(t),
            (UPDATED_AT, None) => self.updated_at = None,
            (NEW_RECORD, Some(Value::Boolean(b))) => self.new_record = b,
            (OPTIMISTIC_LOCK, None) => self.lock_tokens.clear(),
            (OPTIMISTIC_LOCK, Some(Value::String(text))) => {
                self.set_lock_token(OptimisticLockToken::deserialize(&text)?)
            }
            (name, Some(value)) => {
                return Err(CofferError::InvalidValue(format!(
                    "'{}' cannot hold a {} value",
                    name,
                    value.kind()
                )));
            }
            (_, None) => {}
        }
        Ok(())
    }

    // ------------- membership -------------
    pub fn member_ids(&self) -> Vec<Id> {
        self.get(MEMBER_IDS)
            .iter()
            .filter_map(|v| v.as_id().cloned())
            .collect()
    }
    pub fn set_member_ids(&mut self, ids: Vec<Id>) -> Result<()> {
        self.set(MEMBER_IDS, ids)
    }
    pub fn push_member(&mut self, id: Id) -> Result<()> {
        let mut ids = self.member_ids();
        ids.push(id);
        self.set_member_ids(ids)
    }
    /// Drops every occurrence of the identifier.
    pub fn remove_member(&mut self, id: &Id) -> Result<()> {
        let ids = self.member_ids().into_iter().filter(|m| m != id).collect();
        self.set_member_ids(ids)
    }
}

impl Index<&str> for Resource {
    type Output = [Value];
    fn index(&self, name: &str) -> &[Value] {
        self.get(name)
    }
}

/// Type, identity and attribute values. Timestamps, lock tokens and the
/// new record flag are bookkeeping and do not take part.
impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag() && self.id == other.id && self.attributes == other.attributes
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Resource")
            .field("tag", &self.tag())
            .field("id", &self.id)
            .field("new_record", &self.new_record)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("lock_tokens", &self.lock_tokens)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}({})", self.tag(), id),
            None => write!(f, "{}(new)", self.tag()),
        }
    }
}

// ------------- coercion -------------
fn coerce_set(types: &Arc<TypeRegistry>, input: Input) -> Result<Vec<Value>> {
    let mut flat = Vec::new();
    flatten(types, input, &mut flat)?;
    let mut values: Vec<Value> = Vec::with_capacity(flat.len());
    for value in flat {
        if !value.is_blank() && !values.contains(&value) {
            values.push(value);
        }
    }
    Ok(values)
}

fn coerce_sequence(types: &Arc<TypeRegistry>, input: Input) -> Result<Vec<Value>> {
    let mut values = Vec::new();
    flatten(types, input, &mut values)?;
    Ok(values)
}

fn flatten(types: &Arc<TypeRegistry>, input: Input, into: &mut Vec<Value>) -> Result<()> {
    match input {
        Input::Null => {}
        Input::Value(value) => into.push(value),
        Input::List(items) => {
            for item in items {
                flatten(types, item, into)?;
            }
        }
        Input::Map(map) => into.push(Value::from(instantiate(types, map)?)),
    }
    Ok(())
}

/// A raw map becomes the concrete type named by its `internal_resource`.
fn instantiate(types: &Arc<TypeRegistry>, mut map: BTreeMap<String, Input>) -> Result<Resource> {
    let tag = match map.remove(INTERNAL_RESOURCE) {
        Some(Input::Value(Value::String(tag))) => tag,
        _ => {
            return Err(CofferError::InvalidValue(
                "nested attribute maps must carry internal_resource".to_owned(),
            ));
        }
    };
    let mut nested = types.resource(&tag);
    for (name, input) in map {
        nested.set(&name, input)?;
    }
    Ok(nested)
}
