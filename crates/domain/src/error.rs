use common::AggregateId;
use thiserror::Error;

/// Errors raised by the aggregate contract and repository.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No stored changes exist for the aggregate.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(AggregateId),

    /// A message lacked the reserved aggregate metadata.
    #[error("message is not an aggregate change: {0}")]
    NotAnAggregateChange(&'static str),

    /// An error occurred in the event store.
    #[error("event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
