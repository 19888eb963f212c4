//! Cooperative cancellation
//!
//! Stages check the token between files. A stage that observes it finishes
//! the file in flight and returns [`EngineError::Cancelled`]; writes already
//! made stay made.

use crate::error::EngineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a live token
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; visible to every clone
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Cancelled` for `stage` if the token fired
    ///
    /// # Errors
    /// [`EngineError::Cancelled`] once [`cancel`](Self::cancel) was called.
    pub fn check(&self, stage: &'static str) -> Result<(), EngineError> {
        if self.is_cancelled() {
            tracing::warn!(stage, "cancellation observed");
            return Err(EngineError::Cancelled { stage });
        }
        Ok(())
    }
}
