//! Error types for the Savevault library
//!
//! This module defines all error types that can occur during backup, restore
//! and maintenance operations. Errors fall into a small number of families:
//!
//! - **Validation**: a required path or version was empty; raised before any I/O
//! - **Not found**: the source directory, a backup, its `Data/` tree or a save
//!   archive is missing
//! - **Cancellation**: the caller raised the cancellation token
//! - **I/O and serialization**: everything the filesystem or JSON codec reports
//!
//! Best-effort cleanup (garbage collection, rollback of a half-written backup)
//! reports failures through [`CleanupError`] instead, so the caller can log and
//! discard them without failing the primary operation.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the Savevault library
pub type Result<T> = std::result::Result<T, VaultError>;

/// Main error type for all Savevault operations
#[derive(Debug, Error)]
pub enum VaultError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A required argument was empty or malformed
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// The directory to back up does not exist
    #[error("Source directory not found: {0:?}")]
    SourceNotFound(PathBuf),

    /// No backup with the requested id or directory exists
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    /// The backup has no plain-file tree to restore from
    #[error("Nothing to restore: {0:?} does not exist")]
    NothingToRestore(PathBuf),

    /// A save referenced by the manifest is absent from the save store
    #[error("Save archive missing for '{relative_path}' (hash {hash})")]
    SaveArchiveMissing {
        /// Path of the save relative to the Saves folder
        relative_path: String,
        /// Content hash the manifest expects
        hash: String,
    },

    /// A manifest that was explicitly requested could not be read
    #[error("Corrupt manifest at {path:?}: {reason}")]
    CorruptManifest {
        /// Path of the manifest file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// A save's content no longer matched the hash it was planned under
    #[error("Hash mismatch for {path:?} - expected: {expected}, actual: {actual}")]
    HashMismatch {
        /// Save that changed
        path: PathBuf,
        /// Hash computed while planning
        expected: String,
        /// Hash of the bytes actually copied
        actual: String,
    },

    /// The operation was cancelled through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Create a validation error with a custom message
    pub fn validation(msg: impl Into<String>) -> Self {
        VaultError::Validation(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        VaultError::Internal(msg.into())
    }

    /// Check if this error signals cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VaultError::Cancelled)
    }

    /// Check if this error belongs to the not-found family
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VaultError::SourceNotFound(_)
                | VaultError::BackupNotFound(_)
                | VaultError::NothingToRestore(_)
                | VaultError::SaveArchiveMissing { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            VaultError::BackupNotFound(id) => {
                format!("Backup '{}' not found. Use 'savevault list' to see available backups.", id)
            }
            VaultError::SaveArchiveMissing { relative_path, .. } => {
                format!(
                    "The archived copy of save '{}' is missing from the save store. \
                     The restore was stopped to avoid producing an incomplete world.",
                    relative_path
                )
            }
            VaultError::HashMismatch { path, .. } => {
                format!(
                    "Save {:?} changed while it was being backed up. \
                     Close the game and run the backup again.",
                    path
                )
            }
            VaultError::Cancelled => "Operation cancelled.".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Failure of a best-effort cleanup step
///
/// Returned by deletion helpers used during garbage collection and rollback.
/// These never fail the surrounding operation; callers log them and move on.
#[derive(Debug, Error)]
#[error("Failed to remove {path:?}: {source}")]
pub struct CleanupError {
    /// Path that could not be removed
    pub path: PathBuf,
    /// Underlying I/O failure
    #[source]
    pub source: std::io::Error,
}
