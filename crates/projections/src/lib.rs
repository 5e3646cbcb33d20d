//! Projection runtime: folds event streams into read-side state.
//!
//! This crate is the read side of the runtime:
//! - [`Projection`] — the fold contract: handlers keyed by event name plus an
//!   optional opaque-state codec
//! - [`ProjectionStorage`] — persistence of `(position, state)` under a row
//!   lock
//! - [`NotificationProjector`] — one transactional fold toward the stream head
//! - [`StreamProjector`] — lifecycle façade: one-shot [`run`] or live
//!   [`run_and_listen`] with pluggable error recovery
//! - [`PgChannelListener`] — `LISTEN`/`NOTIFY` driver yielding
//!   [`Notification`]s
//!
//! [`run`]: StreamProjector::run
//! [`run_and_listen`]: StreamProjector::run_and_listen

pub mod error;
pub mod listener;
pub mod notification;
pub mod options;
pub mod projection;
pub mod projector;
pub mod storage;
pub mod stream_projector;

pub use error::{ErrorAction, ProjectionError, ProjectionErrorCallback, Result};
pub use listener::{Listener, NotificationStream, PgChannelListener};
pub use notification::Notification;
pub use options::{Backoff, ProjectorOptions};
pub use projection::{Handler, HandlerMap, Projection};
pub use projector::NotificationProjector;
pub use storage::ProjectionStorage;
pub use stream_projector::StreamProjector;
