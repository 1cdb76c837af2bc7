//! Cooperative cancellation
//!
//! Long-running operations poll a [`CancellationToken`] at well defined
//! suspension points: before each directory enumeration step, before each
//! file-copy chunk and before each save-archive step. Once raised, the token
//! stays raised.

use crate::error::{Result, VaultError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag the caller can raise at any time to stop an operation
///
/// Cloning yields a handle to the same flag, so one clone can be handed to
/// the operation while another stays with the caller (or a progress sink).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return [`VaultError::Cancelled`] if cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(VaultError::Cancelled)
        } else {
            Ok(())
        }
    }
}
