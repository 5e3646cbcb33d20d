//! Persistence of a projection's position and optional opaque state.

use sqlx::{PgPool, Postgres, Row, Transaction};

use common::quote_identifier;

use crate::error::{ProjectionError, Result};

/// Reads and writes one projection's `(position, state)` row.
///
/// `acquire` locks the row with `FOR UPDATE` inside a fresh transaction,
/// which gives the holder single-writer discipline for the projection until
/// the transaction ends. State stays opaque bytes at this boundary; only the
/// projection's own codec touches the value.
pub struct ProjectionStorage {
    projection_name: String,
    projection_table: String,
    acquire_sql: String,
    persist_sql: String,
}

impl ProjectionStorage {
    pub fn new(
        projection_name: impl Into<String>,
        projection_table: impl Into<String>,
    ) -> Result<Self> {
        let projection_name = projection_name.into();
        let projection_table = projection_table.into();

        if projection_name.trim().is_empty() {
            return Err(ProjectionError::InvalidArgument(
                "projection name cannot be empty",
            ));
        }
        if projection_table.trim().is_empty() {
            return Err(ProjectionError::InvalidArgument(
                "projection table cannot be empty",
            ));
        }

        let table = quote_identifier(&projection_table);
        Ok(Self {
            acquire_sql: format!("SELECT position, state FROM {table} WHERE name = $1 FOR UPDATE"),
            persist_sql: format!("UPDATE {table} SET position = $1, state = $2 WHERE name = $3"),
            projection_name,
            projection_table,
        })
    }

    pub fn projection_name(&self) -> &str {
        &self.projection_name
    }

    /// Opens a transaction and locks the projection row, returning the
    /// transaction together with the persisted position and raw state.
    ///
    /// An absent row means `create` has not run yet and is an error.
    pub async fn acquire(
        &self,
        pool: &PgPool,
    ) -> Result<(Transaction<'static, Postgres>, i64, Option<Vec<u8>>)> {
        let mut tx = pool.begin().await?;

        let row = sqlx::query(&self.acquire_sql)
            .bind(&self.projection_name)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Err(ProjectionError::ProjectionNotFound(
                self.projection_name.clone(),
            ));
        };

        let position: i64 = row.try_get("position")?;
        let state: Option<Vec<u8>> = row.try_get("state")?;
        Ok((tx, position, state))
    }

    /// Writes position and state inside the acquiring transaction. The caller
    /// commits; anything short of a commit leaves the row untouched.
    pub async fn persist(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        position: i64,
        state: Option<&[u8]>,
    ) -> Result<()> {
        sqlx::query(&self.persist_sql)
            .bind(position)
            .bind(state)
            .bind(&self.projection_name)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Inserts the projection row if absent.
    ///
    /// Duplicate inserts are ignored, so concurrent projector startups can
    /// race on this safely.
    pub async fn create(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (name) VALUES ($1) ON CONFLICT DO NOTHING",
            quote_identifier(&self.projection_table),
        ))
        .bind(&self.projection_name)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Whether the projection row exists. Errors are logged and reported as
    /// `false`.
    pub async fn exists(&self, pool: &PgPool) -> bool {
        let result = sqlx::query_scalar::<_, i32>(&format!(
            "SELECT 1 FROM {} WHERE name = $1 LIMIT 1",
            quote_identifier(&self.projection_table),
        ))
        .bind(&self.projection_name)
        .fetch_optional(pool)
        .await;

        match result {
            Ok(row) => row.is_some(),
            Err(err) => {
                tracing::warn!(
                    table = %self.projection_table,
                    error = %err,
                    "failed to query projection table"
                );
                false
            }
        }
    }
}
