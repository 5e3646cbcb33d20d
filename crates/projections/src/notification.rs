use common::StreamName;
use serde::{Deserialize, Serialize};

/// Advisory signal that a stream received new messages up to `no`.
///
/// Notifications may be redundant or missed: the projector's position guard
/// makes redundant ones cheap no-ops and the catch-up fold recovers missed
/// ones, so they are never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub stream_name: StreamName,
    pub no: i64,
}

impl Notification {
    pub fn new(stream_name: impl Into<StreamName>, no: i64) -> Self {
        Self {
            stream_name: stream_name.into(),
            no,
        }
    }
}
