//! The projection contract: handlers keyed by event name plus an optional
//! state codec.

use std::collections::HashMap;

use common::StreamName;
use event_store::Message;

use crate::error::{ProjectionError, Result};

/// One fold step: consumes the current state and the message, returns the
/// next state.
pub type Handler<S> = Box<dyn Fn(S, &Message) -> Result<S> + Send + Sync>;

/// Handlers keyed by the event name they respond to.
pub type HandlerMap<S> = HashMap<String, Handler<S>>;

/// A deterministic fold over one stream maintaining `(position, state)`.
///
/// Messages whose event name has no handler still advance the projection
/// position; the fold never skips positions.
pub trait Projection: Send + Sync {
    /// State accumulated by the fold.
    type State: Send;

    /// Unique projection name; keys the row in the projection table.
    fn name(&self) -> &str;

    /// The stream this projection reads.
    fn stream_name(&self) -> &StreamName;

    /// State before any message has been applied.
    fn init_state(&self) -> Self::State;

    /// The handler map consulted per message.
    fn handlers(&self) -> &HandlerMap<Self::State>;

    /// Encodes state for persistence.
    ///
    /// `None` keeps the projection stateless: only the position is stored.
    /// Called exactly once per successful fold.
    fn encode_state(&self, _state: &Self::State) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Decodes previously persisted state.
    ///
    /// Only invoked when a state row is present, so stateless projections can
    /// leave the default in place.
    fn decode_state(&self, _raw: &[u8]) -> Result<Self::State> {
        Err(ProjectionError::State(
            "projection does not persist state".into(),
        ))
    }
}
