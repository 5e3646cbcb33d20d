use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_stream::try_stream;
use futures_util::TryStreamExt;
use sqlx::postgres::{PgArguments, PgConnection, PgPool};
use sqlx::query::Query;
use sqlx::Postgres;

use common::{StreamName, quote_identifier};

use crate::error::{EventStoreError, Result};
use crate::matcher::MetadataMatcher;
use crate::message::Message;
use crate::strategy::{PersistenceStrategy, SqlParam};
use crate::stream::{MessageFactory, MessageStream, UnresolvedMessageStream};

/// PostgreSQL-backed event store.
///
/// Streams map onto tables through a [`PersistenceStrategy`]; rows are
/// reconstructed into messages through a [`MessageFactory`]. Appends rely on
/// the backend's unique indexes for correctness across writers, so no
/// application-level lock is taken.
pub struct PostgresEventStore {
    pool: PgPool,
    strategy: Arc<dyn PersistenceStrategy>,
    factory: Arc<dyn MessageFactory>,
    columns: String,
    insert_placeholders: Mutex<HashMap<usize, String>>,
}

impl PostgresEventStore {
    pub fn new(
        pool: PgPool,
        strategy: Arc<dyn PersistenceStrategy>,
        factory: Arc<dyn MessageFactory>,
    ) -> Result<Self> {
        let column_names = strategy.column_names();
        if column_names.is_empty() {
            return Err(EventStoreError::InvalidArgument(
                "persistence strategy declares no columns",
            ));
        }

        Ok(Self {
            pool,
            strategy,
            factory,
            columns: column_names.join(", "),
            insert_placeholders: Mutex::new(HashMap::new()),
        })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the table and indexes backing the stream.
    ///
    /// All schema statements run in one transaction. On failure the
    /// transaction is rolled back and the original error returned; if the
    /// rollback itself fails, both errors are reported together.
    pub async fn create(&self, stream_name: &StreamName) -> Result<()> {
        let table_name = self.table_name(stream_name)?;

        if self.table_exists(&table_name).await {
            return Err(EventStoreError::TableAlreadyExists);
        }

        let queries = self.strategy.create_schema(&table_name);
        if queries.is_empty() {
            return Err(EventStoreError::NoCreateTableQueries);
        }

        let mut tx = self.pool.begin().await?;
        for query in &queries {
            if let Err(err) = sqlx::query(query).execute(&mut *tx).await {
                return match tx.rollback().await {
                    Ok(()) => Err(err.into()),
                    Err(rollback) => Err(EventStoreError::CreateRollback {
                        source: err,
                        rollback,
                    }),
                };
            }
        }
        tx.commit().await?;

        Ok(())
    }

    /// Whether the backing table for the stream exists.
    ///
    /// Resolution and database errors are logged and reported as `false`.
    pub async fn has_stream(&self, stream_name: &StreamName) -> bool {
        match self.table_name(stream_name) {
            Ok(table_name) => self.table_exists(&table_name).await,
            Err(err) => {
                tracing::warn!(
                    stream_name = %stream_name,
                    error = %err,
                    "failed to resolve the stream table name"
                );
                false
            }
        }
    }

    /// Opens a cursor over the stream, starting at `from_number`.
    ///
    /// Matcher constraints and the position bound are combined with `AND`;
    /// rows come back ordered by `no` ascending, at most `count` of them when
    /// given. A `from_number` below 1 reads from the beginning.
    pub fn load(
        &self,
        stream_name: &StreamName,
        from_number: i64,
        count: Option<u32>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<MessageStream<'static>> {
        let table_name = self.table_name(stream_name)?;
        let (sql, params) = build_load_query(&table_name, &self.columns, from_number, count, matcher);

        let pool = self.pool.clone();
        let factory = Arc::clone(&self.factory);
        let stream: MessageStream<'static> = Box::pin(try_stream! {
            let mut query = sqlx::query(&sql);
            for param in params {
                query = bind_param(query, param);
            }
            let mut rows = query.fetch(&pool);
            while let Some(row) = rows.try_next().await? {
                let item = factory.message_from_row(&row)?;
                yield item;
            }
        });
        Ok(stream)
    }

    /// Opens a cursor on a caller-supplied connection so the read can share
    /// that connection's transaction.
    ///
    /// Rows are yielded with payload resolution deferred, so fold-style
    /// consumers can dispatch on the event name before requiring a registered
    /// payload type. Query conditions and ordering match [`load`].
    ///
    /// [`load`]: Self::load
    pub fn load_with_connection<'c>(
        &self,
        conn: &'c mut PgConnection,
        stream_name: &StreamName,
        from_number: i64,
        count: Option<u32>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<UnresolvedMessageStream<'c>> {
        let table_name = self.table_name(stream_name)?;
        let (sql, params) = build_load_query(&table_name, &self.columns, from_number, count, matcher);

        let factory = Arc::clone(&self.factory);
        let stream: UnresolvedMessageStream<'c> = Box::pin(try_stream! {
            let mut query = sqlx::query(&sql);
            for param in params {
                query = bind_param(query, param);
            }
            let mut rows = query.fetch(&mut *conn);
            while let Some(row) = rows.try_next().await? {
                let item = factory.unresolved_from_row(&row)?;
                yield item;
            }
        });
        Ok(stream)
    }

    /// Batch-inserts messages into the stream table.
    ///
    /// An empty slice is a successful no-op. All rows go into a single
    /// `INSERT`, so either every message is stored or none is.
    pub async fn append_to(&self, stream_name: &StreamName, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let table_name = self.table_name(stream_name)?;
        let data = self.strategy.prepare_data(messages)?;
        let values = self.prepare_insert_values(messages.len());
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_identifier(&table_name),
            self.columns,
            values,
        );

        let mut query = sqlx::query(&sql);
        for param in data {
            query = bind_param(query, param);
        }

        match query.execute(&self.pool).await {
            Ok(result) => {
                metrics::counter!("event_store_appended_messages")
                    .increment(messages.len() as u64);
                tracing::debug!(
                    stream_name = %stream_name,
                    rows = result.rows_affected(),
                    "inserted messages into the event stream"
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    stream_name = %stream_name,
                    events = messages.len(),
                    error = %err,
                    "failed to insert messages into the event stream"
                );
                Err(wrap_database_error(err))
            }
        }
    }

    fn table_name(&self, stream_name: &StreamName) -> Result<String> {
        let table_name = self.strategy.generate_table_name(stream_name)?;
        if table_name.is_empty() {
            return Err(EventStoreError::TableNameEmpty);
        }
        Ok(table_name)
    }

    /// Returns the `($1,$2,...),(...)` template for a batch of the given
    /// size, memoized by message count.
    fn prepare_insert_values(&self, message_count: usize) -> String {
        let mut cache = match self.insert_placeholders.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(values) = cache.get(&message_count) {
            return values.clone();
        }

        let values = build_insert_placeholders(message_count, self.strategy.column_names().len());
        cache.insert(message_count, values.clone());
        values
    }

    async fn table_exists(&self, table_name: &str) -> bool {
        let result = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name = $1)",
        )
        .bind(table_name)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(exists) => exists,
            Err(err) => {
                tracing::warn!(
                    table = table_name,
                    error = %err,
                    "error reading from information_schema"
                );
                false
            }
        }
    }
}

fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: SqlParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        SqlParam::Uuid(value) => query.bind(value),
        SqlParam::Text(value) => query.bind(value),
        SqlParam::Json(value) => query.bind(value),
        SqlParam::Timestamp(value) => query.bind(value),
        SqlParam::BigInt(value) => query.bind(value),
    }
}

fn wrap_database_error(err: sqlx::Error) -> EventStoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().map(str::to_owned);
            return EventStoreError::UniqueViolation {
                constraint,
                source: err,
            };
        }
    }
    EventStoreError::Database(err)
}

/// Builds the SELECT for a stream read. Matcher parameters are bound first,
/// in constraint order, then the position bound.
fn build_load_query(
    table_name: &str,
    columns: &str,
    from_number: i64,
    count: Option<u32>,
    matcher: Option<&MetadataMatcher>,
) -> (String, Vec<SqlParam>) {
    // Stream positions start at 1; anything lower reads from the beginning.
    let from_number = from_number.max(1);

    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some(matcher) = matcher {
        for constraint in matcher {
            params.push(constraint_param(constraint.value()));
            conditions.push(format!(
                "metadata ->> {} {} ${}",
                quote_string(constraint.field()),
                constraint.operator().as_sql(),
                params.len(),
            ));
        }
    }

    params.push(SqlParam::BigInt(from_number));
    conditions.push(format!("no >= ${}", params.len()));

    let mut sql = format!(
        "SELECT no, {columns} FROM {} WHERE {} ORDER BY no",
        quote_identifier(table_name),
        conditions.join(" AND "),
    );
    if let Some(count) = count {
        sql.push_str(&format!(" LIMIT {count}"));
    }

    (sql, params)
}

/// `->>` extracts text, so constraint values are compared as text.
fn constraint_param(value: &serde_json::Value) -> SqlParam {
    match value {
        serde_json::Value::String(text) => SqlParam::Text(text.clone()),
        other => SqlParam::Text(other.to_string()),
    }
}

fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn build_insert_placeholders(message_count: usize, column_count: usize) -> String {
    let mut values = String::new();
    for row in 0..message_count {
        if row > 0 {
            values.push(',');
        }
        values.push('(');
        for column in 0..column_count {
            if column > 0 {
                values.push(',');
            }
            values.push('$');
            values.push_str(&(row * column_count + column + 1).to_string());
        }
        values.push(')');
    }
    values
}
