//! Event-store-backed persistence for aggregate roots.

use std::marker::PhantomData;
use std::sync::Arc;

use common::{AggregateId, StreamName};
use event_store::{
    AGGREGATE_ID_KEY, AGGREGATE_TYPE_KEY, ComparisonOperator, Message, MetadataMatcher,
    PostgresEventStore, read_message_stream,
};

use crate::aggregate::{AggregateRoot, Changed};
use crate::error::{DomainError, Result};

/// Saves and rehydrates one aggregate type against a stream.
pub struct AggregateRepository<R: AggregateRoot> {
    store: Arc<PostgresEventStore>,
    stream_name: StreamName,
    _aggregate: PhantomData<fn() -> R>,
}

impl<R: AggregateRoot> AggregateRepository<R> {
    pub fn new(store: Arc<PostgresEventStore>, stream_name: StreamName) -> Self {
        Self {
            store,
            stream_name,
            _aggregate: PhantomData,
        }
    }

    pub fn stream_name(&self) -> &StreamName {
        &self.stream_name
    }

    /// Appends the root's uncommitted changes in one batch.
    ///
    /// The buffer is cleared only after the append succeeds. A
    /// unique-violation means another writer won the version race; the caller
    /// rehydrates and re-derives its changes.
    pub async fn save(&self, root: &mut R) -> Result<()> {
        if root.recorder().uncommitted().is_empty() {
            return Ok(());
        }

        let messages: Vec<Message> = root
            .recorder()
            .uncommitted()
            .iter()
            .map(|changed| changed.message().clone())
            .collect();

        self.store.append_to(&self.stream_name, &messages).await?;
        root.recorder_mut().pop_recorded_events();
        Ok(())
    }

    /// Rehydrates an aggregate by replaying its changes through `apply`.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<R> {
        let matcher = MetadataMatcher::new()
            .with(
                AGGREGATE_ID_KEY,
                ComparisonOperator::Equals,
                aggregate_id.to_string(),
            )?
            .with(
                AGGREGATE_TYPE_KEY,
                ComparisonOperator::Equals,
                R::AGGREGATE_TYPE,
            )?;

        let stream = self.store.load(&self.stream_name, 1, None, Some(&matcher))?;
        let (messages, _) = read_message_stream(stream).await?;
        if messages.is_empty() {
            return Err(DomainError::AggregateNotFound(aggregate_id));
        }

        let mut root = R::default();
        for message in messages {
            let changed = Changed::try_from(message)?;
            let version = changed.version();
            root.apply(&changed);
            root.recorder_mut().restore(version);
        }
        Ok(root)
    }
}
