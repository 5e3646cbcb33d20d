//! The aggregate-root contract the event store consumes.
//!
//! - [`AggregateRoot`] — identity, `apply`, and an embedded [`EventRecorder`]
//! - [`record_change`] — stamps aggregate metadata and buffers the change
//! - [`Changed`] — a message validated to carry the reserved aggregate keys
//! - [`AggregateRepository`] — append-on-save, replay-on-load persistence

pub mod aggregate;
pub mod error;
pub mod repository;

pub use aggregate::{AggregateRoot, Changed, EventRecorder, record_change};
pub use error::{DomainError, Result};
pub use repository::AggregateRepository;
