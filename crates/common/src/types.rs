use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one aggregate instance.
///
/// A thin wrapper around a UUID so aggregate ids cannot be confused with
/// message ids or other UUID-valued identifiers. The canonical string form
/// is what the reserved `_aggregate_id` metadata key stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// A fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses the canonical string form; `None` when the input is not a
    /// valid UUID.
    pub fn parse_str(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<AggregateId> for Uuid {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}

/// Name of an event stream.
///
/// Stream names are opaque to the runtime; the persistence strategy decides
/// how they map onto backing tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamName(String);

impl StreamName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for StreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for StreamName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for StreamName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_aggregate_ids_are_distinct() {
        assert_ne!(AggregateId::new(), AggregateId::new());
    }

    #[test]
    fn parse_str_round_trips_the_display_form() {
        let id = AggregateId::from_uuid(Uuid::new_v4());
        assert_eq!(AggregateId::parse_str(&id.to_string()), Some(id));
        assert_eq!(id.to_string(), id.as_uuid().to_string());
    }

    #[test]
    fn parse_str_rejects_non_uuid_input() {
        assert_eq!(AggregateId::parse_str("not-an-id"), None);
        assert_eq!(AggregateId::parse_str(""), None);
    }

    #[test]
    fn aggregate_id_serializes_as_the_canonical_string() {
        let id = AggregateId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        assert_eq!(serde_json::from_str::<AggregateId>(&json).unwrap(), id);
    }

    #[test]
    fn stream_name_is_transparent_over_its_string() {
        let name = StreamName::from("event_stream");
        assert_eq!(name.as_str(), "event_stream");
        assert_eq!(name.to_string(), "event_stream");
        assert!(!name.is_empty());
        assert!(StreamName::from("").is_empty());
    }

    #[test]
    fn stream_name_serializes_as_plain_string() {
        let name = StreamName::from("orders");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"orders\"");
    }
}
