//! Cooperative cancellation between the console and background work.
//!
//! The flag is read at command-plan step boundaries and separation phase
//! boundaries only. A running external process is never interrupted by it.

use crate::error::AmvError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Shared stop flag. Clones observe the same state.
///
/// ```
/// use amv_core::CancellationToken;
///
/// let ui = CancellationToken::new();
/// let job = ui.clone();
/// ui.cancel();
/// assert!(job.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err` once [`cancel`](Self::cancel) has been called on any clone.
    pub fn check(&self) -> Result<(), CancelledError> {
        match self.is_cancelled() {
            true => Err(CancelledError),
            false => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Operation was cancelled")]
pub struct CancelledError;

impl From<CancelledError> for AmvError {
    fn from(_: CancelledError) -> Self {
        AmvError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_passes_check() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.check(), Ok(()));
    }

    #[test]
    fn test_cancel_is_seen_by_clones_and_maps_to_amv_error() {
        let ui = CancellationToken::new();
        let worker = ui.clone();
        ui.cancel();

        assert!(worker.is_cancelled());
        let err: AmvError = worker.check().unwrap_err().into();
        assert!(err.is_cancelled());
    }
}
