//! Projection lifecycle: create-on-first-run, one-shot and listen modes.

use std::sync::Arc;

use futures_util::TryStreamExt;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use event_store::PostgresEventStore;

use crate::error::{ErrorAction, ProjectionError, ProjectionErrorCallback, Result};
use crate::listener::Listener;
use crate::notification::Notification;
use crate::options::ProjectorOptions;
use crate::projection::Projection;
use crate::projector::NotificationProjector;
use crate::storage::ProjectionStorage;

/// Runs a projection against its event stream, once or following the store
/// live.
///
/// `run` and `run_and_listen` are serialized by an in-process mutex, so one
/// instance drives one projection at a time; across processes the row lock
/// taken by the fold provides the same guarantee.
pub struct StreamProjector<P: Projection> {
    pool: PgPool,
    storage: Arc<ProjectionStorage>,
    executor: NotificationProjector<P>,
    error_callback: ProjectionErrorCallback,
    options: ProjectorOptions,
    run_lock: tokio::sync::Mutex<()>,
    projection_name: String,
}

impl<P: Projection> StreamProjector<P> {
    pub fn new(
        pool: PgPool,
        store: Arc<PostgresEventStore>,
        projection: Arc<P>,
        projection_table: &str,
        error_callback: ProjectionErrorCallback,
        options: ProjectorOptions,
    ) -> Result<Self> {
        let storage = Arc::new(ProjectionStorage::new(projection.name(), projection_table)?);
        let projection_name = projection.name().to_owned();
        let executor =
            NotificationProjector::new(pool.clone(), store, Arc::clone(&storage), projection);

        Ok(Self {
            pool,
            storage,
            executor,
            error_callback,
            options,
            run_lock: tokio::sync::Mutex::new(()),
            projection_name,
        })
    }

    /// Executes the projection once, catching up to the stream head.
    ///
    /// A token cancelled before any resource is acquired returns success.
    /// Creates the projection row on first run.
    pub async fn run(&self, token: &CancellationToken) -> Result<()> {
        let _guard = self.run_lock.lock().await;
        if token.is_cancelled() {
            return Ok(());
        }

        self.setup_projection().await?;
        self.process_notification(token, None).await
    }

    /// Executes the projection and then follows the store live, folding once
    /// per notification yielded by `listener`.
    ///
    /// Returns when the listener stream ends, which a cancelled token causes.
    pub async fn run_and_listen<L: Listener>(
        &self,
        token: &CancellationToken,
        listener: &L,
    ) -> Result<()> {
        let _guard = self.run_lock.lock().await;
        if token.is_cancelled() {
            return Ok(());
        }

        self.setup_projection().await?;

        // Subscribe before catching up so inserts landing during the initial
        // fold still get announced.
        let mut notifications = listener.listen(token.clone()).await?;
        self.process_notification(token, None).await?;
        while let Some(notification) = notifications.try_next().await? {
            self.process_notification(token, Some(&notification)).await?;
        }
        Ok(())
    }

    async fn process_notification(
        &self,
        token: &CancellationToken,
        notification: Option<&Notification>,
    ) -> Result<()> {
        for attempt in 0..self.options.max_retries {
            let err = match self.executor.execute(token, notification).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            match (self.error_callback)(&err, notification) {
                ErrorAction::Retry => {
                    tracing::debug!(
                        projection = %self.projection_name,
                        attempt,
                        error = %err,
                        "error handler: retrying notification"
                    );
                    if let Some(delay) = self.options.backoff.delay(attempt) {
                        tokio::time::sleep(delay).await;
                    }
                }
                ErrorAction::Ignore => {
                    tracing::debug!(
                        projection = %self.projection_name,
                        error = %err,
                        "error handler: ignoring error"
                    );
                    return Ok(());
                }
                ErrorAction::Fail | ErrorAction::Fallthrough => return Err(err),
            }
        }

        Err(ProjectionError::RetryCeilingExceeded {
            retries: self.options.max_retries,
        })
    }

    /// Creates the projection row if this is the first run.
    async fn setup_projection(&self) -> Result<()> {
        if self.storage.exists(&self.pool).await {
            return Ok(());
        }
        self.storage.create(&self.pool).await
    }
}
