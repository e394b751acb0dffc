// used for timestamps, which are always kept in UTC
use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone, Utc};
// used to generate identifiers for new resources
use uuid::Uuid;

// used to print out readable forms of a value
use std::fmt;

use crate::error::{CofferError, Result};
use crate::resource::Resource;

// ------------- Id -------------
/// Opaque resource identifier. The adapter decides how to interpret it; a
/// scheme prefix such as `disk://` marks identifiers owned by another store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
pub struct Id(String);

impl Id {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
    pub fn scheme(&self) -> Option<&str> {
        self.0.split_once("://").map(|(scheme, _)| scheme)
    }
}
impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl From<&str> for Id {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
impl From<String> for Id {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ------------- Value -------------
/// A single attribute value. Attributes are always multi-valued, so a
/// resource holds a `Vec<Value>` per attribute name.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Literal { value: String, language: String },
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Uri(String),
    Id(Id),
    Resource(Box<Resource>),
}

impl Value {
    pub fn literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            language: language.into(),
        }
    }
    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri(uri.into())
    }
    pub fn id(id: impl Into<Id>) -> Self {
        Self::Id(id.into())
    }
    /// Any offset is accepted; the stored instant is normalized to UTC.
    pub fn timestamp<Tz: TimeZone>(time: DateTime<Tz>) -> Self {
        Self::DateTime(time.with_timezone(&Utc))
    }
    /// Blank strings and blank identifiers are dropped from Set attributes.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::Id(id) => id.as_str().is_empty(),
            _ => false,
        }
    }
    pub fn as_id(&self) -> Option<&Id> {
        match self {
            Self::Id(id) => Some(id),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(t) => Some(t),
            _ => None,
        }
    }
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Self::Resource(r) => Some(r),
            _ => None,
        }
    }
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Literal { .. } => "literal",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::DateTime(_) => "datetime",
            Self::Uri(_) => "uri",
            Self::Id(_) => "id",
            Self::Resource(_) => "resource",
        }
    }
}

/// Canonical text form of a timestamp used by every wire format.
pub fn format_datetime(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_datetime(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CofferError::corrupt(format!("bad timestamp '{text}': {e}")))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Literal { value, .. } => write!(f, "{value}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::DateTime(t) => write!(f, "{}", format_datetime(t)),
            Self::Uri(u) => write!(f, "{u}"),
            Self::Id(id) => write!(f, "{id}"),
            Self::Resource(r) => write!(f, "{r}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}
impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}
impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::DateTime(t)
    }
}
impl From<DateTime<FixedOffset>> for Value {
    fn from(t: DateTime<FixedOffset>) -> Self {
        Self::timestamp(t)
    }
}
impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Self::Id(id)
    }
}
impl From<Resource> for Value {
    fn from(r: Resource) -> Self {
        Self::Resource(Box::new(r))
    }
}

// ------------- Optimistic locking -------------
pub const LOCK_TOKEN_PREFIX: &str = "lock_token";

/// Version marker issued by one adapter. A resource carries at most one
/// token per adapter it has been persisted through.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct OptimisticLockToken {
    adapter_id: Id,
    token: String,
}

impl OptimisticLockToken {
    pub fn new(adapter_id: Id, token: impl Into<String>) -> Self {
        Self {
            adapter_id,
            token: token.into(),
        }
    }
    pub fn adapter_id(&self) -> &Id {
        &self.adapter_id
    }
    pub fn token(&self) -> &str {
        &self.token
    }
    // adapter identities never contain ':', the token may
    pub fn serialize(&self) -> String {
        format!("{}:{}:{}", LOCK_TOKEN_PREFIX, self.adapter_id, self.token)
    }
    pub fn deserialize(text: &str) -> Result<Self> {
        let mut parts = text.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(LOCK_TOKEN_PREFIX), Some(adapter_id), Some(token)) if !adapter_id.is_empty() => {
                Ok(Self::new(Id::new(adapter_id), token))
            }
            _ => Err(CofferError::InvalidValue(format!(
                "'{text}' is not a serialized lock token"
            ))),
        }
    }
}
impl fmt::Display for OptimisticLockToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}
