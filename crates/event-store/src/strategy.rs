use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::Value;
use uuid::Uuid;

use common::{StreamName, quote_identifier};

use crate::error::{EventStoreError, Result};
use crate::message::Message;
use crate::payload::PayloadConverter;

/// A positional SQL parameter produced by [`PersistenceStrategy::prepare_data`].
///
/// Keeps the flat, column-major parameter vector expressible under sqlx's
/// typed binds; the store matches on the variant when binding.
#[derive(Debug, Clone)]
pub enum SqlParam {
    Uuid(Uuid),
    Text(String),
    Json(Value),
    Timestamp(NaiveDateTime),
    BigInt(i64),
}

/// Row layout and naming rules for one family of event stream tables.
///
/// Keeping schema, column order and row preparation in one place lets the
/// store stay strategy-agnostic.
pub trait PersistenceStrategy: Send + Sync {
    /// DDL statements creating the stream's table and indexes, in execution
    /// order.
    fn create_schema(&self, table_name: &str) -> Vec<String>;

    /// Insert column order. Also the order `prepare_data` emits parameters in.
    fn column_names(&self) -> &'static [&'static str];

    /// Flattens messages into one parameter per column per row, column-major
    /// per row in the declared order.
    fn prepare_data(&self, messages: &[Message]) -> Result<Vec<SqlParam>>;

    /// Derives the backing table name for a stream.
    fn generate_table_name(&self, stream_name: &StreamName) -> Result<String>;
}

const COLUMNS: &[&str] = &["event_id", "event_name", "payload", "metadata", "created_at"];

/// Strategy storing all aggregates of a stream in a single table.
///
/// Aggregate identity lives in the reserved metadata keys; a unique index over
/// `(_aggregate_type, _aggregate_id, _aggregate_version)` enforces dense
/// per-aggregate versioning under concurrent writers, and `no BIGSERIAL`
/// supplies the total order.
pub struct AggregateStreamStrategy {
    converter: Arc<dyn PayloadConverter>,
}

impl AggregateStreamStrategy {
    pub fn new(converter: Arc<dyn PayloadConverter>) -> Self {
        Self { converter }
    }
}

impl PersistenceStrategy for AggregateStreamStrategy {
    fn create_schema(&self, table_name: &str) -> Vec<String> {
        let unique_index = quote_identifier(&format!(
            "{table_name}_unique_index__aggregate_type__aggregate_id__aggregate_version"
        ));
        let index = quote_identifier(&format!("{table_name}_index__aggregate_type__aggregate_id"));
        let table = quote_identifier(table_name);

        vec![
            format!(
                r#"CREATE TABLE {table} (
    no BIGSERIAL,
    event_id UUID NOT NULL,
    event_name VARCHAR(100) NOT NULL,
    payload JSON NOT NULL,
    metadata JSONB NOT NULL,
    created_at TIMESTAMP(6) NOT NULL,
    PRIMARY KEY (no),
    CONSTRAINT aggregate_version_not_null CHECK ((metadata->>'_aggregate_version') IS NOT NULL),
    CONSTRAINT aggregate_type_not_null CHECK ((metadata->>'_aggregate_type') IS NOT NULL),
    CONSTRAINT aggregate_id_not_null CHECK ((metadata->>'_aggregate_id') IS NOT NULL),
    UNIQUE (event_id)
);"#
            ),
            format!(
                "CREATE UNIQUE INDEX {unique_index} ON {table} \
                 ((metadata->>'_aggregate_type'), (metadata->>'_aggregate_id'), (metadata->>'_aggregate_version'));"
            ),
            format!(
                "CREATE INDEX {index} ON {table} \
                 ((metadata->>'_aggregate_type'), (metadata->>'_aggregate_id'), no);"
            ),
        ]
    }

    fn column_names(&self) -> &'static [&'static str] {
        COLUMNS
    }

    fn prepare_data(&self, messages: &[Message]) -> Result<Vec<SqlParam>> {
        let mut data = Vec::with_capacity(messages.len() * COLUMNS.len());
        for message in messages {
            let (event_name, payload) = self.converter.convert(message.payload())?;
            let metadata = serde_json::to_value(message.metadata())?;

            data.push(SqlParam::Uuid(message.uuid()));
            data.push(SqlParam::Text(event_name));
            data.push(SqlParam::Json(payload));
            data.push(SqlParam::Json(metadata));
            data.push(SqlParam::Timestamp(message.created_at().naive_utc()));
        }
        Ok(data)
    }

    fn generate_table_name(&self, stream_name: &StreamName) -> Result<String> {
        if stream_name.is_empty() {
            return Err(EventStoreError::EmptyStreamName);
        }

        let name: String = stream_name
            .as_str()
            .to_lowercase()
            .chars()
            .filter(|c| matches!(c, 'a'..='z' | '0'..='9' | '_'))
            .collect();
        let name = name.trim_end_matches('_');

        Ok(format!("events_{name}"))
    }
}
