//! The aggregate-root contract consumed by the event store.

use common::AggregateId;
use event_store::{
    AGGREGATE_ID_KEY, AGGREGATE_TYPE_KEY, AGGREGATE_VERSION_KEY, Message, Metadata, Payload,
};
use serde_json::json;

use crate::error::{DomainError, Result};

/// A message validated to describe an aggregate state change.
///
/// Every `Changed` carries the three reserved metadata keys; the aggregate id
/// and version are extracted once at construction.
#[derive(Debug, Clone)]
pub struct Changed {
    message: Message,
    aggregate_id: AggregateId,
    version: i64,
}

impl Changed {
    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// The aggregate version this change produced.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn payload(&self) -> &Payload {
        self.message.payload()
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

impl TryFrom<Message> for Changed {
    type Error = DomainError;

    fn try_from(message: Message) -> Result<Self> {
        let metadata = message.metadata();

        let aggregate_id = metadata.aggregate_id().ok_or(
            DomainError::NotAnAggregateChange("missing or invalid _aggregate_id"),
        )?;
        if metadata.aggregate_type().is_none() {
            return Err(DomainError::NotAnAggregateChange("missing _aggregate_type"));
        }
        let version = metadata.aggregate_version().ok_or(
            DomainError::NotAnAggregateChange("missing or non-positive _aggregate_version"),
        )?;

        Ok(Self {
            aggregate_id,
            version,
            message,
        })
    }
}

/// Buffer of uncommitted changes plus the aggregate's current version.
///
/// Roots embed one and surface it through [`AggregateRoot::recorder`]; the
/// repository drains the buffer after a successful append.
#[derive(Debug, Default)]
pub struct EventRecorder {
    uncommitted: Vec<Changed>,
    version: i64,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the latest recorded or replayed change; 0 for a fresh root.
    pub fn current_version(&self) -> i64 {
        self.version
    }

    /// Changes recorded since the last successful append.
    pub fn uncommitted(&self) -> &[Changed] {
        &self.uncommitted
    }

    /// Buffers a change and adopts its version.
    pub fn record(&mut self, changed: Changed) {
        self.version = changed.version();
        self.uncommitted.push(changed);
    }

    /// Adopts a replayed change's version without buffering it.
    pub fn restore(&mut self, version: i64) {
        self.version = version;
    }

    /// Empties the buffer, returning the recorded changes.
    pub fn pop_recorded_events(&mut self) -> Vec<Changed> {
        std::mem::take(&mut self.uncommitted)
    }
}

/// A cluster of domain state whose changes are recorded as messages.
///
/// Implementors embed an [`EventRecorder`]. `apply` must be pure and
/// deterministic: it derives the next state from the change alone, has no
/// side effects and cannot fail — changes represent facts that have happened.
pub trait AggregateRoot: Default + Send {
    /// Stable type name stored under `_aggregate_type`.
    const AGGREGATE_TYPE: &'static str;

    /// The aggregate's unique identifier.
    fn aggregate_id(&self) -> AggregateId;

    /// Folds one change into the aggregate state.
    fn apply(&mut self, change: &Changed);

    fn recorder(&self) -> &EventRecorder;

    fn recorder_mut(&mut self) -> &mut EventRecorder;
}

/// Records a state change on `root`.
///
/// Stamps the reserved aggregate metadata with the next version, buffers the
/// change and invokes `apply`.
pub fn record_change<R: AggregateRoot>(root: &mut R, payload: Payload) -> Result<()> {
    let version = root.recorder().current_version() + 1;
    let metadata = Metadata::new()
        .with_value(AGGREGATE_ID_KEY, json!(root.aggregate_id()))
        .with_value(AGGREGATE_TYPE_KEY, json!(R::AGGREGATE_TYPE))
        .with_value(AGGREGATE_VERSION_KEY, json!(version));

    let changed = Changed::try_from(Message::new(payload, metadata))?;
    root.recorder_mut().record(changed.clone());
    root.apply(&changed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change_message(id: AggregateId, version: i64) -> Message {
        Message::new(
            Payload::from_value("ticked", json!({})),
            Metadata::new()
                .with_value(AGGREGATE_ID_KEY, json!(id))
                .with_value(AGGREGATE_TYPE_KEY, json!("counter"))
                .with_value(AGGREGATE_VERSION_KEY, json!(version)),
        )
    }

    #[derive(Debug, Default)]
    struct Counter {
        id: AggregateId,
        ticks: u32,
        recorder: EventRecorder,
    }

    impl AggregateRoot for Counter {
        const AGGREGATE_TYPE: &'static str = "counter";

        fn aggregate_id(&self) -> AggregateId {
            self.id
        }

        fn apply(&mut self, _change: &Changed) {
            self.ticks += 1;
        }

        fn recorder(&self) -> &EventRecorder {
            &self.recorder
        }

        fn recorder_mut(&mut self) -> &mut EventRecorder {
            &mut self.recorder
        }
    }

    #[test]
    fn changed_requires_the_reserved_metadata() {
        let bare = Message::new(Payload::from_value("ticked", json!({})), Metadata::new());
        assert!(matches!(
            Changed::try_from(bare),
            Err(DomainError::NotAnAggregateChange(_))
        ));

        let zero_version = Message::new(
            Payload::from_value("ticked", json!({})),
            Metadata::new()
                .with_value(AGGREGATE_ID_KEY, json!(AggregateId::new()))
                .with_value(AGGREGATE_TYPE_KEY, json!("counter"))
                .with_value(AGGREGATE_VERSION_KEY, json!(0)),
        );
        assert!(matches!(
            Changed::try_from(zero_version),
            Err(DomainError::NotAnAggregateChange(_))
        ));
    }

    #[test]
    fn changed_extracts_identity_and_version() {
        let id = AggregateId::new();
        let changed = Changed::try_from(change_message(id, 3)).unwrap();
        assert_eq!(changed.aggregate_id(), id);
        assert_eq!(changed.version(), 3);
    }

    #[test]
    fn recorder_tracks_versions_and_drains() {
        let id = AggregateId::new();
        let mut recorder = EventRecorder::new();
        assert_eq!(recorder.current_version(), 0);

        recorder.record(Changed::try_from(change_message(id, 1)).unwrap());
        recorder.record(Changed::try_from(change_message(id, 2)).unwrap());
        assert_eq!(recorder.current_version(), 2);
        assert_eq!(recorder.uncommitted().len(), 2);

        let drained = recorder.pop_recorded_events();
        assert_eq!(drained.len(), 2);
        assert!(recorder.uncommitted().is_empty());
        assert_eq!(recorder.current_version(), 2, "draining keeps the version");
    }

    #[test]
    fn recorder_restore_only_moves_the_version() {
        let mut recorder = EventRecorder::new();
        recorder.restore(7);
        assert_eq!(recorder.current_version(), 7);
        assert!(recorder.uncommitted().is_empty());
    }

    #[test]
    fn record_change_stamps_metadata_and_applies() {
        let mut counter = Counter::default();

        record_change(&mut counter, Payload::from_value("ticked", json!({}))).unwrap();
        record_change(&mut counter, Payload::from_value("ticked", json!({}))).unwrap();

        assert_eq!(counter.ticks, 2);
        assert_eq!(counter.recorder().current_version(), 2);

        let changes = counter.recorder().uncommitted();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].version(), 1);
        assert_eq!(changes[1].version(), 2);
        assert_eq!(
            changes[1].message().metadata().aggregate_type(),
            Some("counter")
        );
        assert_eq!(changes[1].aggregate_id(), counter.aggregate_id());
    }
}
