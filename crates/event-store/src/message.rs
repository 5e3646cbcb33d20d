use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use common::AggregateId;

use crate::payload::Payload;

/// Metadata key holding the owning aggregate's UUID.
pub const AGGREGATE_ID_KEY: &str = "_aggregate_id";
/// Metadata key holding the owning aggregate's type name.
pub const AGGREGATE_TYPE_KEY: &str = "_aggregate_type";
/// Metadata key holding the aggregate version, strictly increasing from 1.
pub const AGGREGATE_VERSION_KEY: &str = "_aggregate_version";

/// Ordered string-keyed metadata attached to a message.
///
/// Carries routing information, including the reserved aggregate keys that
/// the persistence strategy indexes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(serde_json::Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the metadata with `key` set to `value`, replacing any previous
    /// entry.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Visits entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The owning aggregate's id, if present and a valid UUID.
    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.get(AGGREGATE_ID_KEY)
            .and_then(Value::as_str)
            .and_then(AggregateId::parse_str)
    }

    /// The owning aggregate's type name, if present.
    pub fn aggregate_type(&self) -> Option<&str> {
        self.get(AGGREGATE_TYPE_KEY).and_then(Value::as_str)
    }

    /// The aggregate version, if present and positive.
    pub fn aggregate_version(&self) -> Option<i64> {
        self.get(AGGREGATE_VERSION_KEY)
            .and_then(Value::as_i64)
            .filter(|version| *version > 0)
    }
}

/// An immutable event envelope.
///
/// Messages are created by producers and owned by the store after a
/// successful append; they are never mutated. `with_metadata` returns a new
/// message instead of changing the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    uuid: Uuid,
    payload: Payload,
    metadata: Metadata,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a message with a fresh identity and the current wall-clock
    /// time.
    pub fn new(payload: Payload, metadata: Metadata) -> Self {
        Self::reconstitute(Uuid::new_v4(), payload, metadata, Utc::now())
    }

    /// Rebuilds a message from its stored parts.
    ///
    /// `created_at` is truncated to microseconds, the precision of the
    /// backing `TIMESTAMP(6)` column, so stored and in-memory messages
    /// compare equal.
    pub fn reconstitute(
        uuid: Uuid,
        payload: Payload,
        metadata: Metadata,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid,
            payload,
            metadata,
            created_at: created_at.trunc_subsecs(6),
        }
    }

    /// The globally unique identity of this message.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The stable type name of the payload.
    pub fn event_name(&self) -> &str {
        self.payload.name()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns a copy of this message with `key` set in its metadata.
    pub fn with_metadata(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            metadata: self.metadata.clone().with_value(key, value),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Payload {
        Payload::from_value("something_happened", json!({"value": 1}))
    }

    #[test]
    fn metadata_preserves_insertion_order() {
        let metadata = Metadata::new()
            .with_value("zulu", json!(1))
            .with_value("alpha", json!(2))
            .with_value("mike", json!(3));

        let keys: Vec<_> = metadata.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["zulu", "alpha", "mike"]);
    }

    #[test]
    fn metadata_aggregate_accessors() {
        let id = Uuid::new_v4();
        let metadata = Metadata::new()
            .with_value(AGGREGATE_ID_KEY, json!(id.to_string()))
            .with_value(AGGREGATE_TYPE_KEY, json!("bank_account"))
            .with_value(AGGREGATE_VERSION_KEY, json!(3));

        assert_eq!(metadata.aggregate_id(), Some(AggregateId::from_uuid(id)));
        assert_eq!(metadata.aggregate_type(), Some("bank_account"));
        assert_eq!(metadata.aggregate_version(), Some(3));
    }

    #[test]
    fn metadata_rejects_non_positive_versions() {
        let metadata = Metadata::new().with_value(AGGREGATE_VERSION_KEY, json!(0));
        assert_eq!(metadata.aggregate_version(), None);
    }

    #[test]
    fn message_created_at_is_truncated_to_microseconds() {
        let message = Message::new(sample_payload(), Metadata::new());
        assert_eq!(
            message.created_at().timestamp_subsec_nanos() % 1_000,
            0,
            "sub-microsecond precision must be dropped"
        );
    }

    #[test]
    fn with_metadata_leaves_the_original_untouched() {
        let message = Message::new(sample_payload(), Metadata::new());
        let tagged = message.with_metadata("region", json!("EU"));

        assert_eq!(message.metadata().get("region"), None);
        assert_eq!(tagged.metadata().get("region"), Some(&json!("EU")));
        assert_eq!(message.uuid(), tagged.uuid());
        assert_eq!(message.created_at(), tagged.created_at());
    }
}
