use std::{any::Any, fmt, sync::Arc};

use chronicle_query::{Cursor, CursorFields, QueryError, Value};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::Result, options::StreamIdentity};

mod registry;
mod serializer;

pub use registry::*;
pub use serializer::*;

/// A domain event that can be appended and read back.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name before the serializer's casing applies. Defaults to the bare type
    /// name, without module path or generics.
    fn event_type_name() -> &'static str {
        let name = std::any::type_name::<Self>();
        let name = name.split('<').next().unwrap_or(name);

        name.rsplit("::").next().unwrap_or(name)
    }

    /// Fully qualified name, kept alongside the short name for legacy lookups.
    fn qualified_type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamId {
    Uuid(Uuid),
    Key(String),
}

impl StreamId {
    pub fn identity(&self) -> StreamIdentity {
        match self {
            StreamId::Uuid(_) => StreamIdentity::AsUuid,
            StreamId::Key(_) => StreamIdentity::AsString,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            StreamId::Uuid(id) => Value::Uuid(*id),
            StreamId::Key(key) => Value::Text(key.to_owned()),
        }
    }
}

impl Default for StreamId {
    fn default() -> Self {
        StreamId::Uuid(Uuid::nil())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamId::Uuid(id) => write!(f, "{id}"),
            StreamId::Key(key) => f.write_str(key),
        }
    }
}

impl From<Uuid> for StreamId {
    fn from(value: Uuid) -> Self {
        StreamId::Uuid(value)
    }
}

impl From<String> for StreamId {
    fn from(value: String) -> Self {
        StreamId::Key(value)
    }
}

impl From<&str> for StreamId {
    fn from(value: &str) -> Self {
        StreamId::Key(value.to_owned())
    }
}

/// An event ready to be appended: its stored type names and payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteEvent {
    pub type_name: String,
    pub qualified_type_name: Option<String>,
    pub data: serde_json::Value,
}

impl WriteEvent {
    pub fn new<N: Into<String>>(type_name: N) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn qualified_type_name<N: Into<String>>(mut self, name: N) -> Self {
        self.qualified_type_name = Some(name.into());
        self
    }

    pub fn data<D: Serialize>(mut self, value: D) -> Result<Self> {
        self.data = serde_json::to_value(&value)?;

        Ok(self)
    }
}

/// Position assigned to one appended event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventHeader {
    pub sequence: i64,
    pub version: i64,
    pub timestamp: DateTime<Utc>,
    pub type_name: String,
}

/// Result of an append: the stream and where its new events landed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamHandle {
    pub id: StreamId,
    pub tenant_id: String,
    pub version: i64,
    pub events: Vec<EventHeader>,
}

/// A stored event with its metadata, as read from the event table.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub sequence: i64,
    pub stream_id: StreamId,
    pub version: i64,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
    pub event_type_name: String,
    pub qualified_type_name: Option<String>,
    pub data: serde_json::Value,
    /// Payload decoded into its registered type, `None` when the type name is
    /// not registered.
    pub decoded: Option<Arc<dyn Any + Send + Sync>>,
}

impl Envelope {
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.decoded.as_ref().and_then(|data| data.downcast_ref::<E>())
    }

    pub fn is<E: Event>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }

    /// Deserializes the stored payload as `E`, whether or not `E` is
    /// registered. Keys are read as stored; stores with camelCase payloads
    /// should go through [`EventRegistry::decode_as`] instead.
    pub fn data_as<E: Event>(&self) -> Result<E> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

impl Cursor for Envelope {
    fn keys() -> Vec<&'static str> {
        vec!["seq_id"]
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Int(self.sequence)]
    }

    fn serialize(&self) -> Vec<String> {
        vec![self.sequence.to_string()]
    }

    fn deserialize(fields: &mut CursorFields) -> std::result::Result<Self, QueryError> {
        Ok(Envelope {
            sequence: fields.next("seq_id")?,
            ..Default::default()
        })
    }
}
