//! The fold: advance a projection transactionally toward the stream head.

use std::sync::Arc;

use futures_util::TryStreamExt;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use event_store::PostgresEventStore;

use crate::error::{ProjectionError, Result};
use crate::notification::Notification;
use crate::projection::Projection;
use crate::storage::ProjectionStorage;

/// Advances a projection by at least one batch toward the latest stream
/// position.
///
/// The cursor read, the state computation and the position write share one
/// database transaction: a crash or a failing handler leaves `(position,
/// state)` exactly as the previous fold committed them, and the next run
/// retries from there.
pub struct NotificationProjector<P: Projection> {
    pool: PgPool,
    store: Arc<PostgresEventStore>,
    storage: Arc<ProjectionStorage>,
    projection: Arc<P>,
}

impl<P: Projection> NotificationProjector<P> {
    pub fn new(
        pool: PgPool,
        store: Arc<PostgresEventStore>,
        storage: Arc<ProjectionStorage>,
        projection: Arc<P>,
    ) -> Self {
        Self {
            pool,
            store,
            storage,
            projection,
        }
    }

    /// Runs one fold.
    ///
    /// Locks the projection row, replays messages from the position after the
    /// persisted one, applies handlers, and commits position and state
    /// together. A notification at or below the persisted position is stale
    /// and commits immediately without reading the stream.
    pub async fn execute(
        &self,
        token: &CancellationToken,
        notification: Option<&Notification>,
    ) -> Result<()> {
        let (mut tx, mut position, raw_state) = self.storage.acquire(&self.pool).await?;

        if let Some(notification) = notification {
            if notification.no <= position {
                tx.commit().await?;
                return Ok(());
            }
        }

        let mut state = match raw_state {
            Some(raw) => self.projection.decode_state(&raw)?,
            None => self.projection.init_state(),
        };

        let handlers = self.projection.handlers();
        let mut handled: u64 = 0;
        {
            let mut stream = self.store.load_with_connection(
                &mut tx,
                self.projection.stream_name(),
                position + 1,
                None,
                None,
            )?;

            while let Some((row, no)) = stream.try_next().await? {
                if token.is_cancelled() {
                    // Dropping the transaction rolls the fold back.
                    return Err(ProjectionError::Cancelled);
                }

                // Dispatch before resolving: rows without a handler advance
                // the cursor even when their payload type is unregistered.
                // With a handler present, a resolution failure is a decoding
                // failure and aborts the fold.
                if let Some(handler) = handlers.get(row.event_name()) {
                    let message = row.resolve()?;
                    state = handler(state, &message)?;
                    handled += 1;
                }
                position = no;
            }
        }

        let encoded = self.projection.encode_state(&state)?;
        self.storage.persist(&mut tx, position, encoded.as_deref()).await?;
        tx.commit().await?;

        metrics::counter!("projection_messages_handled").increment(handled);
        tracing::debug!(
            projection = self.projection.name(),
            position,
            handled,
            "projection advanced"
        );
        Ok(())
    }
}
