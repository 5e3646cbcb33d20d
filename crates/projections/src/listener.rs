//! Change-notification drivers for live projections.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::notification::Notification;

/// Stream of notifications produced by a [`Listener`].
pub type NotificationStream = Pin<Box<dyn Stream<Item = Result<Notification>> + Send>>;

/// Subscribes to backend change announcements and yields them as
/// [`Notification`]s.
///
/// The stream ends cleanly when the token is cancelled. Announcements may be
/// redundant or missed; consumers recover through the projector's position
/// guard and catch-up fold.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn listen(&self, token: CancellationToken) -> Result<NotificationStream>;
}

/// Listener over a PostgreSQL `LISTEN`/`NOTIFY` channel.
///
/// Event tables do not announce inserts by themselves; attach a trigger that
/// publishes the stream name and row number as JSON:
///
/// ```sql
/// CREATE FUNCTION bank_events_notify() RETURNS trigger AS $$
/// BEGIN
///     PERFORM pg_notify(
///         'bank_events',
///         json_build_object('stream_name', 'bank', 'no', NEW.no)::text
///     );
///     RETURN NEW;
/// END;
/// $$ LANGUAGE plpgsql;
///
/// CREATE TRIGGER bank_events_notify AFTER INSERT ON events_bank
///     FOR EACH ROW EXECUTE FUNCTION bank_events_notify();
/// ```
///
/// Payloads that fail to deserialize are logged and skipped; the catch-up
/// fold picks the rows up regardless.
pub struct PgChannelListener {
    pool: PgPool,
    channel: String,
}

impl PgChannelListener {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl Listener for PgChannelListener {
    async fn listen(&self, token: CancellationToken) -> Result<NotificationStream> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel).await?;
        let channel = self.channel.clone();

        let stream: NotificationStream = Box::pin(async_stream::try_stream! {
            loop {
                let received = tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!(channel = %channel, "notification listener stopped");
                        break;
                    }
                    received = listener.recv() => received,
                };

                let pg_notification = received?;
                match serde_json::from_str::<Notification>(pg_notification.payload()) {
                    Ok(notification) => yield notification,
                    Err(err) => {
                        tracing::warn!(
                            channel = %channel,
                            error = %err,
                            "discarding malformed notification payload"
                        );
                    }
                }
            }
        });
        Ok(stream)
    }
}
