//! Durable, per-stream event logs over PostgreSQL.
//!
//! This crate is the write side of the runtime:
//! - [`Message`] / [`Metadata`] — the immutable event envelope
//! - [`PayloadRegistry`] — bidirectional map between typed payloads and their
//!   stored `(name, JSON)` form
//! - [`MetadataMatcher`] — predicates over metadata keys, compiled to SQL
//! - [`PersistenceStrategy`] / [`AggregateStreamStrategy`] — schema, column
//!   order and row preparation for a stream
//! - [`PostgresEventStore`] — create/append/load/has-stream over the backend
//! - [`MessageStream`] — the lazy cursor yielding reconstructed messages

pub mod error;
pub mod matcher;
pub mod message;
pub mod payload;
pub mod postgres;
pub mod strategy;
pub mod stream;

pub use common::{AggregateId, StreamName};
pub use error::{EventStoreError, Result};
pub use matcher::{ComparisonOperator, Constraint, MetadataMatcher};
pub use message::{
    AGGREGATE_ID_KEY, AGGREGATE_TYPE_KEY, AGGREGATE_VERSION_KEY, Message, Metadata,
};
pub use payload::{Payload, PayloadConverter, PayloadRegistry, PayloadResolver};
pub use postgres::PostgresEventStore;
pub use strategy::{AggregateStreamStrategy, PersistenceStrategy, SqlParam};
pub use stream::{
    JsonMessageFactory, MessageFactory, MessageStream, UnresolvedMessage,
    UnresolvedMessageStream, read_message_stream,
};
