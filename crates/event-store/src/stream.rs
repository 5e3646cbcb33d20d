use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use futures_core::Stream;
use futures_util::TryStreamExt;
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::error::Result;
use crate::message::{Message, Metadata};
use crate::payload::PayloadResolver;

/// A lazy, forward-only cursor over stored messages and their stream numbers.
///
/// Single-consumer; rows are fetched as the stream is polled and an iteration
/// or reconstruction failure ends it with the error item. Dropping the stream
/// releases the underlying database rows on every exit path.
pub type MessageStream<'a> = Pin<Box<dyn Stream<Item = Result<(Message, i64)>> + Send + 'a>>;

/// Cursor over rows whose payload resolution is deferred.
///
/// Fold-style consumers dispatch on the event name first, so rows they do not
/// handle never need a registered payload type.
pub type UnresolvedMessageStream<'a> =
    Pin<Box<dyn Stream<Item = Result<(UnresolvedMessage, i64)>> + Send + 'a>>;

/// A stored row with its envelope decoded and payload resolution deferred.
///
/// `event_name` and `metadata` are available immediately; [`resolve`] decodes
/// the payload under its registered type and yields the full message. Unknown
/// type names only fail at that point.
///
/// [`resolve`]: Self::resolve
pub struct UnresolvedMessage {
    uuid: Uuid,
    event_name: String,
    payload: Value,
    metadata: Metadata,
    created_at: DateTime<Utc>,
    resolver: Arc<dyn PayloadResolver>,
}

impl UnresolvedMessage {
    pub fn new(
        uuid: Uuid,
        event_name: impl Into<String>,
        payload: Value,
        metadata: Metadata,
        created_at: DateTime<Utc>,
        resolver: Arc<dyn PayloadResolver>,
    ) -> Self {
        Self {
            uuid,
            event_name: event_name.into(),
            payload,
            metadata,
            created_at,
            resolver,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The stable type name the row was stored under.
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Resolves the payload under its registered type, yielding the full
    /// message. Unknown type names and documents of the wrong shape fail
    /// here.
    pub fn resolve(self) -> Result<Message> {
        let payload = self.resolver.resolve(&self.event_name, self.payload)?;
        Ok(Message::reconstitute(
            self.uuid,
            payload,
            self.metadata,
            self.created_at,
        ))
    }
}

/// Reconstructs messages from database rows.
pub trait MessageFactory: Send + Sync {
    /// Decodes a row's envelope, deferring payload resolution.
    fn unresolved_from_row(&self, row: &PgRow) -> Result<(UnresolvedMessage, i64)>;

    /// Fully reconstructs a row, resolving its payload.
    fn message_from_row(&self, row: &PgRow) -> Result<(Message, i64)> {
        let (unresolved, no) = self.unresolved_from_row(row)?;
        Ok((unresolved.resolve()?, no))
    }
}

/// Factory decoding the JSON payload column through a payload resolver.
///
/// The payload type is selected from the `event_name` column when a row is
/// resolved; documents that do not match the registered type fail
/// reconstruction.
pub struct JsonMessageFactory {
    resolver: Arc<dyn PayloadResolver>,
}

impl JsonMessageFactory {
    pub fn new(resolver: Arc<dyn PayloadResolver>) -> Self {
        Self { resolver }
    }
}

impl MessageFactory for JsonMessageFactory {
    fn unresolved_from_row(&self, row: &PgRow) -> Result<(UnresolvedMessage, i64)> {
        let no: i64 = row.try_get("no")?;
        let event_id: Uuid = row.try_get("event_id")?;
        let event_name: String = row.try_get("event_name")?;
        let payload: Value = row.try_get("payload")?;
        let metadata_value: Value = row.try_get("metadata")?;
        let created_at: NaiveDateTime = row.try_get("created_at")?;

        let metadata: Metadata = serde_json::from_value(metadata_value)?;
        let unresolved = UnresolvedMessage::new(
            event_id,
            event_name,
            payload,
            metadata,
            DateTime::<Utc>::from_naive_utc_and_offset(created_at, Utc),
            Arc::clone(&self.resolver),
        );
        Ok((unresolved, no))
    }
}

/// Drains a message stream into messages and their stream numbers.
///
/// Surfaces any iteration error after the loop. Mainly useful for tests and
/// aggregate rehydration, where the whole result set is needed at once.
pub async fn read_message_stream(mut stream: MessageStream<'_>) -> Result<(Vec<Message>, Vec<i64>)> {
    let mut messages = Vec::new();
    let mut numbers = Vec::new();

    while let Some((message, no)) = stream.try_next().await? {
        messages.push(message);
        numbers.push(no);
    }

    Ok((messages, numbers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EventStoreError;
    use crate::payload::{Payload, PayloadRegistry};
    use futures_util::stream;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ticked {
        n: i64,
    }

    fn registry() -> Arc<PayloadRegistry> {
        let mut registry = PayloadRegistry::new();
        registry.register::<Ticked>("ticked");
        Arc::new(registry)
    }

    fn message(n: i64) -> Message {
        Message::new(
            Payload::from_value("ticked", json!({"n": n})),
            Metadata::new(),
        )
    }

    #[tokio::test]
    async fn read_message_stream_collects_messages_and_numbers() {
        let items = vec![Ok((message(1), 1)), Ok((message(2), 2))];
        let stream: MessageStream<'static> = Box::pin(stream::iter(items));

        let (messages, numbers) = read_message_stream(stream).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(numbers, [1, 2]);
    }

    #[tokio::test]
    async fn read_message_stream_surfaces_iteration_errors() {
        let items = vec![
            Ok((message(1), 1)),
            Err(EventStoreError::UnknownPayloadType("gone".into())),
        ];
        let stream: MessageStream<'static> = Box::pin(stream::iter(items));

        assert!(matches!(
            read_message_stream(stream).await,
            Err(EventStoreError::UnknownPayloadType(_))
        ));
    }

    #[test]
    fn unresolved_messages_expose_the_event_name_without_a_codec() {
        let unresolved = UnresolvedMessage::new(
            Uuid::new_v4(),
            "unmapped",
            json!({}),
            Metadata::new(),
            Utc::now(),
            registry(),
        );

        assert_eq!(unresolved.event_name(), "unmapped");
        assert!(matches!(
            unresolved.resolve(),
            Err(EventStoreError::UnknownPayloadType(name)) if name == "unmapped"
        ));
    }

    #[test]
    fn unresolved_messages_resolve_into_full_messages() {
        let uuid = Uuid::new_v4();
        let created_at = Utc::now();
        let unresolved = UnresolvedMessage::new(
            uuid,
            "ticked",
            json!({"n": 7}),
            Metadata::new().with_value("region", json!("EU")),
            created_at,
            registry(),
        );

        let message = unresolved.resolve().unwrap();
        assert_eq!(message.uuid(), uuid);
        assert_eq!(message.event_name(), "ticked");
        assert_eq!(message.payload().decode::<Ticked>().unwrap(), Ticked { n: 7 });
        assert_eq!(message.metadata().get("region"), Some(&json!("EU")));
    }
}
