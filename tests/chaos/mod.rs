//! Chaos tests for Savevault
//!
//! Injects failures into backup and restore: cancellation at random points
//! of an operation, vanishing source files, damaged manifests and store
//! entries. After every failure the backup root must still be consistent:
//! no half-written backup is listed, and every listed backup verifies.

use ::savevault::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::info;

/// Failure injection harness
pub struct ChaosHarness {
    pub temp_dir: TempDir,
    pub manager: BackupManager,
    pub rng: StdRng,
}

impl ChaosHarness {
    pub fn new(seed: u64) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManagerBuilder::new()
            .copy_buffer_size(512)
            .build(temp_dir.path().join("backups"))
            .unwrap();
        Self {
            temp_dir,
            manager,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Data directory with enough files that cancellation can land mid-way
    pub fn populate(&mut self, name: &str) -> PathBuf {
        let root = self.temp_dir.path().join(name);
        for i in 0..10 {
            self.write_random(&root.join(format!("ModConfig/mod{}.json", i)), 100..3000);
        }
        for w in 0..4 {
            for f in 0..5 {
                self.write_random(&root.join(format!("Saves/world{}/chunk{}", w, f)), 500..5000);
            }
        }
        root
    }

    fn write_random(&mut self, path: &Path, len: std::ops::Range<usize>) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let len = self.rng.random_range(len);
        let content: Vec<u8> = (0..len).map(|_| self.rng.random()).collect();
        fs::write(path, content).unwrap();
    }

    /// Sink that raises `cancel` after `after` progress reports
    pub fn cancelling_sink(cancel: &CancellationToken, after: usize) -> ProgressCallback {
        let cancel = cancel.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        Arc::new(move |_update| {
            if seen.fetch_add(1, Ordering::SeqCst) + 1 >= after {
                cancel.cancel();
            }
        })
    }

    /// Directories under the root other than the save store
    pub fn backup_directories(&self) -> Vec<PathBuf> {
        let root = self.manager.backup_root_directory();
        if !root.exists() {
            return Vec::new();
        }
        fs::read_dir(root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir() && !p.ends_with(&self.manager.config().save_store_folder))
            .collect()
    }

    /// Every listed backup verifies and nothing else is left under the root
    pub fn assert_consistent(&self) {
        let listed = self.manager.list_backups();
        assert_eq!(listed.len(), self.backup_directories().len());
        for backup in &listed {
            let report = self.manager.verify_backup(&backup.id).unwrap();
            assert!(report.is_valid(), "{}", report.summary());
        }

        let store_root = self.manager.config().save_store_path();
        if store_root.exists() {
            for entry in fs::read_dir(&store_root).unwrap() {
                let name = entry.unwrap().file_name().to_string_lossy().to_string();
                assert!(!name.ends_with(".partial"), "leftover partial entry {}", name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_cancellation_at_random_points_rolls_back() {
        let mut harness = ChaosHarness::new(42);
        let source = harness.populate("data");
        harness
            .manager
            .create_backup(&source, None, None, &CancellationToken::new())
            .unwrap();

        for round in 0..8 {
            // Fresh content in every world keeps the number of reports per
            // attempt fixed: 1 planning, 10 files, 4 saves, 1 manifest
            for w in 0..4 {
                harness.write_random(&source.join(format!("Saves/world{}/chunk0", w)), 100..200);
            }
            let after = harness.rng.random_range(1..=16);
            let cancel = CancellationToken::new();
            let sink = ChaosHarness::cancelling_sink(&cancel, after);

            let err = harness
                .manager
                .create_backup(&source, None, Some(sink), &cancel)
                .unwrap_err();
            assert!(err.is_cancelled(), "round {}: {}", round, err);
            harness.assert_consistent();
            info!("Round {} cancelled after {} reports", round, after);
        }

        assert_eq!(harness.manager.list_backups().len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_failed_backup_is_removed() {
        let mut harness = ChaosHarness::new(7);
        let source = harness.populate("data");

        // The last planned file disappears once copying has started
        let victim = source.join("ModConfig/mod9.json");
        let cancel = CancellationToken::new();
        let victim_for_sink = victim.clone();
        let sink: ProgressCallback = Arc::new(move |update| {
            if update.phase == OperationPhase::Copying {
                let _ = fs::remove_file(&victim_for_sink);
            }
        });

        let err = harness
            .manager
            .create_backup(&source, None, Some(sink), &cancel)
            .unwrap_err();
        assert!(matches!(err, VaultError::Io(_)));
        assert!(harness.backup_directories().is_empty());
        assert!(harness.manager.list_backups().is_empty());
        assert!(!victim.exists());
    }

    #[test]
    fn test_cancelled_restore_reports_cancellation() {
        let mut harness = ChaosHarness::new(3);
        let source = harness.populate("data");
        let backup = harness
            .manager
            .create_backup(&source, None, None, &CancellationToken::new())
            .unwrap();
        let summary = harness.manager.find_backup(&backup.id).unwrap();

        let cancel = CancellationToken::new();
        let sink = ChaosHarness::cancelling_sink(&cancel, 3);
        let destination = harness.temp_dir.path().join("restored");
        let err = harness
            .manager
            .restore_backup(&summary, &destination, Some(sink), &cancel)
            .unwrap_err();
        assert!(err.is_cancelled());

        // The backup itself is untouched and can be restored afterwards
        harness
            .manager
            .restore_backup(&summary, &destination, None, &CancellationToken::new())
            .unwrap();
        assert_eq!(
            fs::read(destination.join("Saves/world3/chunk4")).unwrap(),
            fs::read(source.join("Saves/world3/chunk4")).unwrap()
        );
    }

    #[test]
    fn test_missing_store_entry_fails_restore() {
        let mut harness = ChaosHarness::new(11);
        let source = harness.populate("data");
        let backup = harness
            .manager
            .create_backup(&source, None, None, &CancellationToken::new())
            .unwrap();

        let store = harness.manager.config().save_store_path();
        let victim = fs::read_dir(&store).unwrap().next().unwrap().unwrap().path();
        fs::remove_dir_all(&victim).unwrap();

        let report = harness.manager.verify_backup(&backup.id).unwrap();
        assert_eq!(report.missing.len(), 1);

        let summary = harness.manager.find_backup(&backup.id).unwrap();
        let err = harness
            .manager
            .restore_backup(&summary, &harness.temp_dir.path().join("dest"), None, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, VaultError::SaveArchiveMissing { .. }));
        assert!(err.user_message().contains("world"));
    }

    #[test]
    fn test_corrupt_manifest_hides_backup_and_frees_saves() {
        let mut harness = ChaosHarness::new(5);
        let source = harness.populate("data");
        let backup = harness
            .manager
            .create_backup(&source, None, None, &CancellationToken::new())
            .unwrap();
        assert_eq!(harness.manager.store_stats().unwrap().entry_count, 4);

        fs::write(backup.directory_path.join("manifest.json"), b"\0\0garbage").unwrap();
        assert!(harness.manager.list_backups().is_empty());
        assert!(matches!(
            harness.manager.verify_backup(&backup.id),
            Err(VaultError::BackupNotFound(_))
        ));

        harness.manager.gc();
        assert_eq!(harness.manager.store_stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_tampered_store_entry_is_detected() {
        let mut harness = ChaosHarness::new(9);
        let source = harness.populate("data");
        let backup = harness
            .manager
            .create_backup(&source, None, None, &CancellationToken::new())
            .unwrap();

        let store = harness.manager.config().save_store_path();
        let entry = fs::read_dir(&store).unwrap().next().unwrap().unwrap().path();
        let chunk = fs::read_dir(&entry).unwrap().next().unwrap().unwrap().path();
        fs::write(&chunk, b"flipped").unwrap();

        let report = harness.manager.verify_backup(&backup.id).unwrap();
        assert_eq!(report.mismatched.len(), 1);
        assert!(!report.is_valid());
    }
}
