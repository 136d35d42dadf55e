use std::{any::Any, collections::HashMap, sync::Arc};

use crate::{
    error::Result,
    event::{payload_fields, Event, Serializer, WriteEvent},
};

type Decoder = fn(serde_json::Value) -> serde_json::Result<Arc<dyn Any + Send + Sync>>;

fn decode<E: Event>(data: serde_json::Value) -> serde_json::Result<Arc<dyn Any + Send + Sync>> {
    Ok(Arc::new(serde_json::from_value::<E>(data)?))
}

/// Type erased registration of one event type.
#[derive(Clone, Copy)]
pub struct Registration {
    short_name: fn() -> &'static str,
    qualified_name: fn() -> &'static str,
    fields: fn() -> &'static [&'static str],
    decoder: Decoder,
}

impl Registration {
    pub fn of<E: Event>() -> Self {
        Self {
            short_name: E::event_type_name,
            qualified_name: E::qualified_type_name,
            fields: payload_fields::<E>,
            decoder: decode::<E>,
        }
    }
}

/// Maps stored type names to decoders, using the configured [`Serializer`]
/// for names and payloads.
pub struct EventRegistry {
    serializer: Arc<dyn Serializer>,
    registrations: HashMap<String, Registration>,
    qualified_names: HashMap<String, String>,
}

impl EventRegistry {
    pub fn new(serializer: Arc<dyn Serializer>) -> Self {
        Self {
            serializer,
            registrations: HashMap::new(),
            qualified_names: HashMap::new(),
        }
    }

    pub fn register<E: Event>(&mut self) {
        self.add(Registration::of::<E>());
    }

    pub(crate) fn add(&mut self, registration: Registration) {
        let type_name = self.serializer.type_name((registration.short_name)());

        self.qualified_names
            .insert((registration.qualified_name)().to_owned(), type_name.to_owned());
        self.registrations.insert(type_name, registration);
    }

    pub fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }

    /// Stored type name of `E`.
    pub fn type_name<E: Event>(&self) -> String {
        self.serializer.type_name(E::event_type_name())
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.registrations.contains_key(type_name)
    }

    /// Stored type name registered for a fully qualified name.
    pub fn resolve_qualified(&self, qualified_name: &str) -> Option<&str> {
        self.qualified_names.get(qualified_name).map(String::as_str)
    }

    pub fn write_event<E: Event>(&self, event: &E) -> Result<WriteEvent> {
        Ok(WriteEvent {
            type_name: self.type_name::<E>(),
            qualified_type_name: Some(E::qualified_type_name().to_owned()),
            data: self.to_payload(event)?,
        })
    }

    pub fn to_payload<E: Event>(&self, event: &E) -> Result<serde_json::Value> {
        Ok(self
            .serializer
            .to_payload(payload_fields::<E>(), serde_json::to_value(event)?))
    }

    /// Decodes a stored payload into `E` regardless of registration.
    pub fn decode_as<E: Event>(&self, data: &serde_json::Value) -> Result<E> {
        Ok(serde_json::from_value(
            self.serializer.from_payload(payload_fields::<E>(), data.clone()),
        )?)
    }

    /// Decodes a stored payload with the decoder registered for `type_name`.
    ///
    /// Returns `None` when nothing is registered under that name.
    pub fn decode(
        &self,
        type_name: &str,
        data: &serde_json::Value,
    ) -> Result<Option<Arc<dyn Any + Send + Sync>>> {
        let Some(registration) = self.registrations.get(type_name) else {
            return Ok(None);
        };
        let data = self.serializer.from_payload((registration.fields)(), data.clone());

        Ok(Some((registration.decoder)(data)?))
    }
}
