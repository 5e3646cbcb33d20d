//! Retry and backoff configuration for projector error recovery.

use std::time::Duration;

/// Bounds and paces the [`ErrorAction::Retry`] loop.
///
/// [`ErrorAction::Retry`]: crate::error::ErrorAction::Retry
#[derive(Debug, Clone)]
pub struct ProjectorOptions {
    /// Upper bound on consecutive retries for one notification. Exceeding it
    /// is a fatal [`RetryCeilingExceeded`] error.
    ///
    /// [`RetryCeilingExceeded`]: crate::error::ProjectionError::RetryCeilingExceeded
    pub max_retries: u32,

    /// Delay inserted between retry attempts.
    pub backoff: Backoff,
}

impl Default for ProjectorOptions {
    fn default() -> Self {
        Self {
            max_retries: 1 << 15,
            backoff: Backoff::None,
        }
    }
}

/// Backoff schedule between retries.
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Constant delay between attempts.
    Fixed(Duration),
    /// `base * 2^attempt`, capped.
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    /// Delay before retry number `attempt` (zero-based); `None` means retry
    /// immediately.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            Backoff::None => None,
            Backoff::Fixed(delay) => Some(*delay),
            Backoff::Exponential { base, cap } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                Some(base.saturating_mul(factor).min(*cap))
            }
        }
    }
}
