use std::collections::HashMap;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{EventStoreError, Result};

/// A named, JSON-encoded event payload.
///
/// The name is the stable identifier a payload is stored and dispatched
/// under; the value is its JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    name: String,
    value: Value,
}

impl Payload {
    /// Encodes a typed event under its stable name.
    pub fn new<T: Serialize>(name: impl Into<String>, event: &T) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            value: serde_json::to_value(event)?,
        })
    }

    /// Wraps an already-encoded JSON document.
    pub fn from_value(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Decodes the payload into a concrete event type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// Converts payload values into their wire representation for writes.
pub trait PayloadConverter: Send + Sync {
    /// Returns the stable type name and JSON document for a payload.
    ///
    /// Fails with [`EventStoreError::UnknownPayloadType`] for payloads the
    /// converter does not know about.
    fn convert(&self, payload: &Payload) -> Result<(String, Value)>;
}

/// Resolves stored payloads back into registered types for reads.
pub trait PayloadResolver: Send + Sync {
    /// Decodes a stored JSON document under the type registered for
    /// `event_name`.
    fn resolve(&self, event_name: &str, value: Value) -> Result<Payload>;
}

struct PayloadCodec {
    decode: Box<dyn Fn(Value) -> Result<Value> + Send + Sync>,
}

/// Bidirectional registry between event names and payload types.
///
/// Producers submit typed payloads; the registry resolves both directions.
/// Reads are decoded through the registered concrete type, so documents that
/// no longer match the type's shape fail here instead of inside a handler.
#[derive(Default)]
pub struct PayloadRegistry {
    codecs: HashMap<String, PayloadCodec>,
}

impl PayloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `name` for both conversion directions.
    pub fn register<T>(&mut self, name: impl Into<String>)
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.codecs.insert(
            name.into(),
            PayloadCodec {
                decode: Box::new(|value| {
                    let event: T = serde_json::from_value(value)?;
                    Ok(serde_json::to_value(&event)?)
                }),
            },
        );
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }
}

impl PayloadConverter for PayloadRegistry {
    fn convert(&self, payload: &Payload) -> Result<(String, Value)> {
        if !self.is_registered(payload.name()) {
            return Err(EventStoreError::UnknownPayloadType(
                payload.name().to_owned(),
            ));
        }
        Ok((payload.name().to_owned(), payload.value().clone()))
    }
}

impl PayloadResolver for PayloadRegistry {
    fn resolve(&self, event_name: &str, value: Value) -> Result<Payload> {
        let codec = self
            .codecs
            .get(event_name)
            .ok_or_else(|| EventStoreError::UnknownPayloadType(event_name.to_owned()))?;
        let value = (codec.decode)(value)?;
        Ok(Payload::from_value(event_name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct AccountCredited {
        amount: u64,
    }

    fn registry() -> PayloadRegistry {
        let mut registry = PayloadRegistry::new();
        registry.register::<AccountCredited>("account_credited");
        registry
    }

    #[test]
    fn convert_then_resolve_round_trips_the_value() {
        let registry = registry();
        let payload = Payload::new("account_credited", &AccountCredited { amount: 100 }).unwrap();

        let (name, value) = registry.convert(&payload).unwrap();
        let resolved = registry.resolve(&name, value).unwrap();

        assert_eq!(resolved, payload);
        assert_eq!(
            resolved.decode::<AccountCredited>().unwrap(),
            AccountCredited { amount: 100 }
        );
    }

    #[test]
    fn convert_rejects_unregistered_names() {
        let registry = registry();
        let payload = Payload::from_value("account_closed", json!({}));

        assert!(matches!(
            registry.convert(&payload),
            Err(EventStoreError::UnknownPayloadType(name)) if name == "account_closed"
        ));
    }

    #[test]
    fn resolve_rejects_unregistered_names() {
        let registry = registry();

        assert!(matches!(
            registry.resolve("account_closed", json!({})),
            Err(EventStoreError::UnknownPayloadType(_))
        ));
    }

    #[test]
    fn resolve_rejects_documents_of_the_wrong_shape() {
        let registry = registry();

        let result = registry.resolve("account_credited", json!({"amount": "not a number"}));
        assert!(matches!(result, Err(EventStoreError::Serialization(_))));
    }
}
