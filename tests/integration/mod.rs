//! Integration tests for Savevault
//!
//! Realistic backup and restore scenarios against generated game data
//! directories: round trips, deduplication across backups and data
//! directories, retention deletion and garbage collection safety.

use ::savevault::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;
use walkdir::WalkDir;

/// Test harness holding a backup root and any number of data directories
pub struct VaultTestHarness {
    pub temp_dir: TempDir,
    pub manager: BackupManager,
    pub file_generator: FileGenerator,
}

impl VaultTestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManagerBuilder::new()
            .copy_buffer_size(4096)
            .build(temp_dir.path().join("backups"))
            .unwrap();

        Self {
            temp_dir,
            manager,
            file_generator: FileGenerator::new(7),
        }
    }

    /// Path of a data directory inside the harness
    pub fn data_dir(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Generate a game data directory with config files, saves and a cache
    pub fn generate_data_dir(&mut self, name: &str, worlds: usize) -> PathBuf {
        let root = self.data_dir(name);
        for file in ["clientsettings.json", "servermagicnumbers.json"] {
            self.file_generator.write_file(&root.join(file), 32..256);
        }
        for i in 0..3 {
            self.file_generator
                .write_file(&root.join(format!("ModConfig/mod{}.json", i)), 0..64);
        }
        self.file_generator.write_file(&root.join("Logs/client-main.txt"), 100..2000);
        self.file_generator.write_file(&root.join("Cache/thumbs/a.png"), 10..100);

        for w in 0..worlds {
            let world = root.join(format!("Saves/world{}", w));
            self.file_generator.write_file(&world.join("level.dat"), 100..500);
            for r in 0..4 {
                self.file_generator
                    .write_file(&world.join(format!("region/r.{}.mca", r)), 500..4000);
            }
        }
        self.file_generator.write_file(&root.join("Saves/quick.vcdbs"), 200..800);
        root
    }

    pub fn backup(&self, source: &Path, version: Option<&str>) -> BackupResult {
        self.manager
            .create_backup(source, version, None, &CancellationToken::new())
            .unwrap()
    }

    pub fn restore(&self, id: &str, destination: &Path) -> RestoreStats {
        let summary = self.manager.find_backup(id).unwrap();
        self.manager
            .restore_backup(&summary, destination, None, &CancellationToken::new())
            .unwrap()
    }

    pub fn store_entry_count(&self) -> usize {
        self.manager.store_stats().unwrap().entry_count
    }
}

/// Deterministic random file content
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn content(&mut self, len: std::ops::Range<usize>) -> Vec<u8> {
        let len = if len.is_empty() { len.start } else { self.rng.random_range(len) };
        (0..len).map(|_| self.rng.random()).collect()
    }

    pub fn write_file(&mut self, path: &Path, len: std::ops::Range<usize>) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let content = self.content(len);
        fs::write(path, content).unwrap();
    }
}

/// Relative path -> content for every file under `root`, skipping `Cache/`
pub fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            if relative.starts_with("Cache/") {
                None
            } else {
                Some((relative, fs::read(e.path()).unwrap()))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_reproduces_data_directory() {
        let mut harness = VaultTestHarness::new();
        let source = harness.generate_data_dir("VintagestoryData", 3);
        let backup = harness.backup(&source, Some("1.19.8"));

        let destination = harness.data_dir("restored");
        harness.restore(&backup.id, &destination);

        let expected = snapshot(&source);
        let actual = snapshot(&destination);
        assert_eq!(expected.keys().collect::<Vec<_>>(), actual.keys().collect::<Vec<_>>());
        assert_eq!(expected, actual);
        assert!(!destination.join("Cache").exists());
        info!("Round trip of {} files verified", expected.len());
    }

    #[test]
    fn test_restore_over_modified_directory() {
        let mut harness = VaultTestHarness::new();
        let source = harness.generate_data_dir("data", 2);
        let expected = snapshot(&source);
        let backup = harness.backup(&source, None);

        // Play on: new world, changed config, deleted save
        harness.file_generator.write_file(&source.join("Saves/world9/level.dat"), 10..20);
        fs::write(source.join("clientsettings.json"), b"{}").unwrap();
        fs::remove_file(source.join("Saves/quick.vcdbs")).unwrap();

        harness.restore(&backup.id, &source);
        assert_eq!(snapshot(&source), expected);
    }

    #[test]
    fn test_dedup_across_backups_and_directories() {
        let mut harness = VaultTestHarness::new();
        let first = harness.generate_data_dir("first", 2);
        harness.backup(&first, None);
        let after_first = harness.store_entry_count();
        assert_eq!(after_first, 3);

        // Unchanged saves add no store entries
        harness.backup(&first, None);
        assert_eq!(harness.store_entry_count(), after_first);

        // A second data directory holding a byte-identical world under another name
        let second = harness.data_dir("second");
        fs::create_dir_all(second.join("Saves")).unwrap();
        copy_tree(&first.join("Saves/world0"), &second.join("Saves/renamed"));
        harness.backup(&second, None);
        assert_eq!(harness.store_entry_count(), after_first);

        // Changing one save adds exactly one entry
        harness.file_generator.write_file(&first.join("Saves/world1/level.dat"), 100..200);
        harness.backup(&first, None);
        assert_eq!(harness.store_entry_count(), after_first + 1);
    }

    #[test]
    fn test_backup_ids_increment_per_day() {
        let mut harness = VaultTestHarness::new();
        let source = harness.generate_data_dir("data", 1);

        let ids: Vec<_> = (0..3).map(|_| harness.backup(&source, None).id).collect();
        let prefix = chrono::Local::now().format("%Y-%m-%d-").to_string();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(id, &format!("{}{:03}", prefix, i + 1));
        }

        let listed: Vec<_> = harness.manager.list_backups().into_iter().map(|b| b.id).collect();
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().all(|id| ids.contains(id)));
    }

    #[test]
    fn test_retention_deletion_keeps_shared_saves() {
        let mut harness = VaultTestHarness::new();
        let source = harness.generate_data_dir("data", 1);
        let other = harness.generate_data_dir("other", 1);

        harness.backup(&source, Some("1.19.8"));
        harness.backup(&source, Some("1.20.0"));
        let kept_other = harness.backup(&other, Some("1.19.8"));

        let deleted = harness.manager.delete_backups(&source, "v1.19.8").unwrap();
        assert_eq!(deleted, 1);

        let remaining = harness.manager.list_backups();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|b| b.id == kept_other.id));

        // Every remaining backup can still be restored in full
        for backup in &remaining {
            let report = harness.manager.verify_backup(&backup.id).unwrap();
            assert!(report.is_valid(), "{}", report.summary());
        }
    }

    #[test]
    fn test_gc_after_deleting_all_references() {
        let mut harness = VaultTestHarness::new();
        let source = harness.generate_data_dir("data", 2);
        let a = harness.backup(&source, None);
        let b = harness.backup(&source, None);

        harness.manager.delete_backup(&a.id).unwrap();
        assert_eq!(harness.store_entry_count(), 3);

        harness.manager.delete_backup(&b.id).unwrap();
        assert_eq!(harness.store_entry_count(), 0);

        let stats = harness.manager.gc();
        assert_eq!(stats.entries_examined, 0);
    }

    #[test]
    fn test_gc_dry_run_reports_orphans() {
        let mut harness = VaultTestHarness::new();
        let source = harness.generate_data_dir("data", 1);
        let backup = harness.backup(&source, None);

        // Removing the directory by hand skips the automatic sweep
        fs::remove_dir_all(&backup.directory_path).unwrap();

        let analysis = harness.manager.gc_analyze();
        assert_eq!(analysis.unreferenced_entries.len(), 2);
        assert!(analysis.bytes_reclaimed > 0);
        assert_eq!(harness.store_entry_count(), 2);

        let sweep = harness.manager.gc();
        assert_eq!(sweep.entries_deleted, 2);
        assert_eq!(sweep.bytes_reclaimed, analysis.bytes_reclaimed);
    }

    #[test]
    fn test_data_directory_without_saves() {
        let harness = VaultTestHarness::new();
        let source = harness.data_dir("bare");
        fs::create_dir_all(source.join("ModConfig")).unwrap();
        fs::write(source.join("ModConfig/x.json"), b"{}").unwrap();

        let backup = harness.backup(&source, None);
        let destination = harness.data_dir("restored");
        let stats = harness.restore(&backup.id, &destination);
        assert_eq!(stats.saves_restored, 0);
        assert_eq!(fs::read(destination.join("ModConfig/x.json")).unwrap(), b"{}");
    }

    fn copy_tree(from: &Path, to: &Path) {
        for entry in WalkDir::new(from) {
            let entry = entry.unwrap();
            let target = to.join(entry.path().strip_prefix(from).unwrap());
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).unwrap();
            } else {
                fs::copy(entry.path(), &target).unwrap();
            }
        }
    }
}
