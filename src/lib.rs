//! # Savevault - Deduplicating game data backups
//!
//! Point-in-time backup and restore of a game's data directory (world saves,
//! configuration, mod state) with save archives deduplicated across backups.
//!
//! ## Overview
//!
//! Savevault lets you:
//! - Back up a whole data directory into a self-describing backup directory
//! - Store each save game exactly once, however many backups contain it
//! - Restore any backup over a data directory
//! - Delete backups by source directory and game version, or by id
//! - Reclaim storage held by saves no backup references any more
//! - Verify that a backup can still be restored as recorded
//!
//! ## Architecture
//!
//! - **Content hashing**: every save (a top-level file or directory under
//!   `Saves/`) gets a SHA-256 fingerprint computed over a canonical listing
//!   of its tree, independent of filesystem enumeration order
//! - **Save store**: a content-addressed folder under the backup root holding
//!   one `<hash>.file` or `<hash>.dir` entry per distinct save
//! - **Manifests**: one JSON file per backup, written last; a backup exists
//!   exactly when its manifest does
//! - **Mark-and-sweep GC**: store entries that no manifest references are
//!   deleted after every backup and deletion
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use savevault::{BackupManager, CancellationToken};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = BackupManager::new(PathBuf::from("./backups"));
//! let cancel = CancellationToken::new();
//!
//! // Back up a data directory
//! let backup = manager.create_backup(
//!     Path::new("./VintagestoryData"),
//!     Some("1.19.8"),
//!     None,
//!     &cancel,
//! )?;
//! println!("Created backup {}", backup.id);
//!
//! // Restore the newest backup
//! let newest = &manager.list_backups()[0];
//! manager.restore_backup(newest, Path::new("./VintagestoryData"), None, &cancel)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress and Cancellation
//!
//! ```rust,no_run
//! use savevault::{BackupManager, CancellationToken, ProgressCallback};
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = BackupManager::new(PathBuf::from("./backups"));
//! let cancel = CancellationToken::new();
//!
//! let progress: ProgressCallback = Arc::new(|update| {
//!     println!("[{:?}] {:>3}% {}", update.phase, update.percent, update.status);
//! });
//!
//! match manager.create_backup(Path::new("./data"), None, Some(progress), &cancel) {
//!     Ok(backup) => println!("Created {}", backup.id),
//!     Err(e) if e.is_cancelled() => println!("Cancelled"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`](error::Result) with [`VaultError`].
//! Cancellation is reported as [`VaultError::Cancelled`] and can be told
//! apart with [`VaultError::is_cancelled`]. Best-effort cleanup never fails
//! an operation; its failures are logged through `tracing`.
//!
//! ## Module Organization
//!
//! - [`manager`]: The [`BackupManager`] entry point and its builder
//! - [`hashing`]: Deterministic file and directory fingerprints
//! - [`save_store`]: Content-addressed save archive store
//! - [`plan`] and [`executor`]: Backup planning and execution
//! - [`manifest`]: Manifest persistence, listing and id allocation
//! - [`gc`]: Garbage collection of the save store
//! - [`restore`]: Restore execution
//! - [`verification`]: Backup integrity checking
//! - [`types`]: Common types and data structures
//! - [`error`]: Error types and handling

// Public API modules
pub mod cancel;
pub mod error;
pub mod executor;
pub mod gc;
pub mod hashing;
pub mod manager;
pub mod manifest;
pub mod plan;
pub mod restore;
pub mod save_store;
pub mod types;
pub mod utils;
pub mod verification;

// Re-export main types for convenience
pub use cancel::CancellationToken;
pub use error::{CleanupError, Result, VaultError};
pub use gc::GarbageCollector;
pub use manager::{BackupManager, BackupManagerBuilder};
pub use manifest::ManifestStore;
pub use restore::RestoreStats;
pub use save_store::SaveStore;
pub use types::*;
pub use verification::VerificationReport;
