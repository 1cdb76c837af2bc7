//! Backup verification
//!
//! Checks that a backup could be restored as recorded: the `Data/` tree is
//! present and every save its manifest references is in the store with the
//! recorded fingerprint. Store entries are re-hashed, so verification reads
//! every archived save in full.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use savevault::BackupManager;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = BackupManager::new(PathBuf::from("backups"));
//! let report = manager.verify_backup("2024-05-01-001")?;
//! if !report.is_valid() {
//!     println!("{}", report.summary());
//! }
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::hashing::hash_save;
use crate::save_store::SaveStore;
use crate::types::BackupManifest;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of verifying one backup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Backup that was verified
    pub backup_id: String,
    /// Whether the backup's `Data/` tree exists
    pub data_tree_present: bool,
    /// Number of save references checked
    pub saves_checked: usize,
    /// Saves whose store entry is absent
    pub missing: Vec<String>,
    /// Saves whose store entry no longer hashes to the recorded fingerprint
    pub mismatched: Vec<String>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl VerificationReport {
    /// Whether the backup can be restored as recorded
    pub fn is_valid(&self) -> bool {
        self.data_tree_present && self.missing.is_empty() && self.mismatched.is_empty()
    }

    /// One-line description of the result
    pub fn summary(&self) -> String {
        if self.is_valid() {
            return format!("Backup {} OK: {} saves verified", self.backup_id, self.saves_checked);
        }

        let mut problems = Vec::new();
        if !self.data_tree_present {
            problems.push("data tree missing".to_string());
        }
        if !self.missing.is_empty() {
            problems.push(format!("{} saves missing", self.missing.len()));
        }
        if !self.mismatched.is_empty() {
            problems.push(format!("{} saves corrupted", self.mismatched.len()));
        }
        format!("Backup {} has problems: {}", self.backup_id, problems.join(", "))
    }
}

/// Verifies backups against a save store
#[derive(Debug, Clone)]
pub struct BackupVerifier<'a> {
    store: &'a SaveStore,
}

impl<'a> BackupVerifier<'a> {
    /// Verifier reading from `store`
    pub fn new(store: &'a SaveStore) -> Self {
        Self { store }
    }

    /// Verify the backup in `backup_directory`
    ///
    /// Problems with the backup are reported, not returned as errors. Only
    /// cancellation and unexpected I/O failures while hashing are errors.
    pub fn verify(
        &self,
        manifest: &BackupManifest,
        backup_directory: &Path,
        data_folder_name: &str,
        cancel: &CancellationToken,
    ) -> Result<VerificationReport> {
        let start = Instant::now();
        let mut report = VerificationReport {
            backup_id: manifest.id.clone(),
            data_tree_present: backup_directory.join(data_folder_name).is_dir(),
            ..Default::default()
        };

        for save in &manifest.saves {
            cancel.check()?;
            report.saves_checked += 1;

            if !self.store.exists(&save.content_hash, save.is_directory) {
                warn!("Backup {}: save {} is missing from the store", manifest.id, save.relative_path);
                report.missing.push(save.relative_path.clone());
                continue;
            }

            let entry = self.store.path(&save.content_hash, save.is_directory);
            let actual = hash_save(&entry, save.is_directory, cancel)?;
            if actual != save.content_hash {
                warn!(
                    "Backup {}: save {} hashes to {} instead of {}",
                    manifest.id, save.relative_path, actual, save.content_hash
                );
                report.mismatched.push(save.relative_path.clone());
            } else {
                debug!("Verified save {}", save.relative_path);
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!("{}", report.summary());
        Ok(report)
    }
}
