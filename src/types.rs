//! Core data types used throughout the Savevault library
//!
//! This module contains the data structures shared across the planner,
//! executors, manifest store and garbage collector.
//!
//! ## Overview
//!
//! - **Persistent**: `BackupManifest`, `SaveReference` - the JSON manifest written
//!   into every backup directory
//! - **Operation results**: `BackupResult`, `BackupSummary`, `GcStats`, `StoreStats`
//! - **Configuration**: `BackupConfig`
//! - **Progress**: `ProgressUpdate`, `OperationPhase`, `ProgressCallback`
//!
//! ## Examples
//!
//! ```rust
//! use savevault::types::{BackupManifest, SaveReference};
//! use chrono::Utc;
//!
//! let mut manifest = BackupManifest::new(
//!     "2024-05-01-001".to_string(),
//!     Utc::now(),
//!     "/home/player/.config/VintagestoryData".to_string(),
//!     Some("1.19.8".to_string()),
//! );
//! manifest.saves.push(SaveReference {
//!     relative_path: "world1".to_string(),
//!     content_hash: "ab".repeat(32),
//!     is_directory: true,
//!     size_bytes: 500,
//! });
//! assert!(manifest.is_valid());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Default name of the content-addressed save store folder under the backup root
pub const DEFAULT_SAVE_STORE_FOLDER: &str = "SaveStore";
/// Default manifest file name inside each backup directory
pub const DEFAULT_MANIFEST_FILE: &str = "manifest.json";
/// Default name of the plain-file tree inside each backup directory
pub const DEFAULT_DATA_FOLDER: &str = "Data";
/// Default size of the streaming copy buffer
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 81_920;

/// Folder under the data directory holding save games
pub const SAVES_FOLDER: &str = "Saves";
/// Folder under the data directory that is never backed up or restored
pub const CACHE_FOLDER: &str = "Cache";

/// Persistent record describing one backup
///
/// Written as JSON into the backup's own directory as the very last step of
/// backup creation. A backup exists if and only if its manifest exists and
/// is valid. Field names on the wire are load-bearing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    /// Human readable id, unique within the backup root (`yyyy-MM-dd-NNN`)
    #[serde(default)]
    pub id: String,
    /// Creation timestamp; missing or zero marks the manifest as invalid
    #[serde(default)]
    pub created_on_utc: DateTime<Utc>,
    /// Absolute, normalized path of the directory that was backed up
    #[serde(default)]
    pub source_data_directory: String,
    /// Normalized game version the data directory belonged to
    #[serde(default, rename = "vintageStoryVersion")]
    pub game_version: Option<String>,
    /// Saves referenced in the save store, in backup order
    #[serde(default)]
    pub saves: Vec<SaveReference>,
}

impl BackupManifest {
    /// Create a manifest with no saves yet
    pub fn new(
        id: String,
        created_on_utc: DateTime<Utc>,
        source_data_directory: String,
        game_version: Option<String>,
    ) -> Self {
        Self {
            id,
            created_on_utc,
            source_data_directory,
            game_version,
            saves: Vec::new(),
        }
    }

    /// Whether this manifest describes a real backup
    ///
    /// A manifest without an id, or whose creation time is missing (and so
    /// defaulted to the Unix epoch), does not count as a backup.
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && self.created_on_utc > DateTime::<Utc>::UNIX_EPOCH
    }

    /// Content hashes of every save this manifest references
    pub fn referenced_hashes(&self) -> HashSet<String> {
        self.saves.iter().map(|s| s.content_hash.clone()).collect()
    }

    /// Sum of the recorded save sizes
    pub fn total_save_bytes(&self) -> u64 {
        self.saves.iter().map(|s| s.size_bytes).sum()
    }
}

/// Reference from a manifest into the save store
///
/// One per top-level entry of the `Saves` folder at backup time. Two
/// references with the same hash and directory flag resolve to the same
/// store entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SaveReference {
    /// Path relative to the Saves folder, forward-slash separated
    pub relative_path: String,
    /// Hex-encoded SHA-256 fingerprint of the save
    #[serde(rename = "hash")]
    pub content_hash: String,
    /// Whether the save is a directory rather than a single file
    pub is_directory: bool,
    /// Size in bytes at backup time (0 if it could not be read)
    #[serde(rename = "size", default)]
    pub size_bytes: u64,
}

/// Result of a successful backup creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupResult {
    /// Id of the new backup
    pub id: String,
    /// Creation timestamp recorded in the manifest
    pub created_at_utc: DateTime<Utc>,
    /// Directory holding the backup's `Data/` tree and manifest
    pub directory_path: PathBuf,
}

/// Listing entry for an existing backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSummary {
    /// Backup id
    pub id: String,
    /// Creation timestamp
    pub created_at_utc: DateTime<Utc>,
    /// Directory that was backed up
    pub source_data_directory: String,
    /// Game version recorded at backup time
    pub game_version: Option<String>,
    /// Number of saves referenced
    pub save_count: usize,
    /// Total recorded size of the referenced saves
    pub save_bytes: u64,
    /// Backup directory under the root
    pub directory_path: PathBuf,
}

impl BackupSummary {
    /// Build a summary from a loaded manifest and the directory it came from
    pub fn from_manifest(manifest: &BackupManifest, directory: PathBuf) -> Self {
        Self {
            id: manifest.id.clone(),
            created_at_utc: manifest.created_on_utc,
            source_data_directory: manifest.source_data_directory.clone(),
            game_version: manifest.game_version.clone(),
            save_count: manifest.saves.len(),
            save_bytes: manifest.total_save_bytes(),
            directory_path: directory,
        }
    }
}

/// Statistics from garbage collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcStats {
    /// Number of store entries examined
    pub entries_examined: usize,
    /// Number of hashes referenced by live manifests
    pub live_hashes: usize,
    /// Number of store entries deleted
    pub entries_deleted: usize,
    /// Bytes reclaimed
    pub bytes_reclaimed: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Store entry names that no manifest references
    pub unreferenced_entries: Vec<String>,
    /// Entries left alone because their name is not a store entry name
    pub skipped_entries: Vec<String>,
    /// Deletions that failed and were left for the next sweep
    pub failures: Vec<String>,
}

/// Statistics about the save store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of recognized store entries
    pub entry_count: usize,
    /// Entries holding a single save file
    pub file_entries: usize,
    /// Entries holding a save directory
    pub directory_entries: usize,
    /// Total bytes held by recognized entries
    pub total_bytes: u64,
}

/// Configuration for a backup root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory holding every backup and the save store
    pub backup_root: PathBuf,
    /// Name of the save store folder under the root
    pub save_store_folder: String,
    /// Name of the manifest file inside each backup directory
    pub manifest_file_name: String,
    /// Name of the plain-file tree inside each backup directory
    pub data_folder_name: String,
    /// Size of the streaming copy buffer in bytes
    pub copy_buffer_size: usize,
}

impl BackupConfig {
    /// Configuration with default folder names for the given root
    pub fn new(backup_root: PathBuf) -> Self {
        Self {
            backup_root,
            save_store_folder: DEFAULT_SAVE_STORE_FOLDER.to_string(),
            manifest_file_name: DEFAULT_MANIFEST_FILE.to_string(),
            data_folder_name: DEFAULT_DATA_FOLDER.to_string(),
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
        }
    }

    /// Path of the save store
    pub fn save_store_path(&self) -> PathBuf {
        self.backup_root.join(&self.save_store_folder)
    }
}

/// Stage of a create or restore operation
///
/// Operations move `Idle -> Planning -> Copying -> (Archiving | Restoring)
/// -> Finalizing -> Completed`, or to `Failed` from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationPhase {
    /// Not started
    Idle,
    /// Walking the source and hashing saves
    Planning,
    /// Copying plain files
    Copying,
    /// Inserting saves into the save store
    Archiving,
    /// Copying saves out of the save store
    Restoring,
    /// Writing the manifest or cleaning up
    Finalizing,
    /// Finished successfully
    Completed,
    /// Finished with an error or cancellation
    Failed,
}

/// A single progress report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Completion in percent, 0 to 100
    pub percent: u8,
    /// Human readable status
    pub status: String,
    /// Stage the operation is in
    pub phase: OperationPhase,
}

/// Progress callback for long-running operations
///
/// Called synchronously from whichever thread runs the operation. The
/// operation never waits on anything the sink does.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Byte-based progress accounting shared by the executors
pub(crate) struct ProgressReporter {
    callback: Option<ProgressCallback>,
    total_bytes: u64,
    done_bytes: u64,
}

impl ProgressReporter {
    pub(crate) fn new(callback: Option<ProgressCallback>, total_bytes: u64) -> Self {
        Self {
            callback,
            total_bytes: total_bytes.max(1),
            done_bytes: 0,
        }
    }

    /// Record `bytes` of completed work and report the new percentage
    pub(crate) fn advance(&mut self, bytes: u64, status: &str, phase: OperationPhase) {
        self.done_bytes = self.done_bytes.saturating_add(bytes);
        let percent = self.percent();
        self.report(percent, status, phase);
    }

    /// Report an explicit percentage
    pub(crate) fn report(&self, percent: u8, status: &str, phase: OperationPhase) {
        if let Some(callback) = &self.callback {
            callback(ProgressUpdate {
                percent: percent.min(100),
                status: status.to_string(),
                phase,
            });
        }
    }

    pub(crate) fn percent(&self) -> u8 {
        let ratio = self.done_bytes as f64 / self.total_bytes as f64;
        (ratio * 100.0).floor().clamp(0.0, 100.0) as u8
    }
}
