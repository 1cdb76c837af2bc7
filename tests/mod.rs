//! Main test module for Savevault
//!
//! This module includes all test suites:
//! - Integration tests for realistic backup and restore scenarios
//! - Chaos tests for failure injection and rollback
//! - Property-based tests for hashing and store invariants

pub mod integration;
pub mod chaos;

#[cfg(test)]
mod edge_cases {
    use ::savevault::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> BackupManager {
        BackupManager::new(temp.path().join("backups"))
    }

    #[test]
    fn test_empty_data_directory() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("empty");
        fs::create_dir_all(&source).unwrap();
        let manager = manager(&temp);
        let cancel = CancellationToken::new();

        let backup = manager.create_backup(&source, None, None, &cancel).unwrap();
        assert!(backup.directory_path.join("Data").is_dir());

        let destination = temp.path().join("dest");
        fs::create_dir_all(destination.join("Saves/old")).unwrap();
        let summary = manager.find_backup(&backup.id).unwrap();
        manager.restore_backup(&summary, &destination, None, &cancel).unwrap();
        assert_eq!(fs::read_dir(&destination).unwrap().count(), 0);
    }

    #[test]
    fn test_cache_only_data_directory() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("data");
        fs::create_dir_all(source.join("cache/thumbs")).unwrap();
        fs::write(source.join("cache/thumbs/t.png"), b"png").unwrap();
        let manager = manager(&temp);

        let backup = manager
            .create_backup(&source, None, None, &CancellationToken::new())
            .unwrap();
        let data = backup.directory_path.join("Data");
        assert_eq!(fs::read_dir(&data).unwrap().count(), 0);
    }

    #[test]
    fn test_special_filenames() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("data");
        let names = [
            "file with spaces.json",
            "file-with-dashes.json",
            "file.with.dots.json",
            "file(with)parens.json",
            "Ünïcödé wörld",
        ];
        for name in &names {
            let config = source.join("ModConfig").join(name);
            fs::create_dir_all(config.parent().unwrap()).unwrap();
            fs::write(&config, name.as_bytes()).unwrap();
            let save = source.join("Saves").join(name);
            fs::create_dir_all(&save).unwrap();
            fs::write(save.join("level"), name.as_bytes()).unwrap();
        }

        let manager = manager(&temp);
        let cancel = CancellationToken::new();
        let backup = manager.create_backup(&source, None, None, &cancel).unwrap();
        let destination = temp.path().join("dest");
        let summary = manager.find_backup(&backup.id).unwrap();
        manager.restore_backup(&summary, &destination, None, &cancel).unwrap();

        for name in &names {
            assert_eq!(fs::read(destination.join("ModConfig").join(name)).unwrap(), name.as_bytes());
            assert_eq!(
                fs::read(destination.join("Saves").join(name).join("level")).unwrap(),
                name.as_bytes()
            );
        }
    }

    #[test]
    fn test_empty_save_directory_and_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("data");
        fs::create_dir_all(source.join("Saves/empty world")).unwrap();
        fs::write(source.join("Saves/empty.vcdbs"), b"").unwrap();
        let manager = manager(&temp);
        let cancel = CancellationToken::new();

        let backup = manager.create_backup(&source, None, None, &cancel).unwrap();
        let summary = manager.find_backup(&backup.id).unwrap();
        assert_eq!(summary.save_count, 2);
        assert_eq!(summary.save_bytes, 0);

        let destination = temp.path().join("dest");
        manager.restore_backup(&summary, &destination, None, &cancel).unwrap();
        assert!(destination.join("Saves/empty world").is_dir());
        assert_eq!(fs::metadata(destination.join("Saves/empty.vcdbs")).unwrap().len(), 0);
    }

    #[test]
    fn test_dotted_source_is_recorded_normalized() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("data");
        fs::create_dir_all(source.join("ModConfig")).unwrap();
        let manager = manager(&temp);

        let dotted = source.join("ModConfig").join("..");
        manager
            .create_backup(&dotted, Some("1.20.0"), None, &CancellationToken::new())
            .unwrap();

        let summary = &manager.list_backups()[0];
        assert!(Path::new(&summary.source_data_directory).is_absolute());
        assert!(!summary.source_data_directory.contains(".."));
        assert_eq!(manager.delete_backups(&source, "1.20.0").unwrap(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_folders_are_backed_up() {
        let temp = TempDir::new().unwrap();
        let external = temp.path().join("ext");
        fs::create_dir_all(external.join("worlds/linked")).unwrap();
        fs::write(external.join("tweaks.json"), b"{}").unwrap();
        fs::write(external.join("worlds/linked/level"), b"far away").unwrap();

        let source = temp.path().join("data");
        fs::create_dir_all(source.join("Saves")).unwrap();
        std::os::unix::fs::symlink(&external, source.join("Mods")).unwrap();
        std::os::unix::fs::symlink(external.join("worlds/linked"), source.join("Saves/linked")).unwrap();

        let manager = manager(&temp);
        let cancel = CancellationToken::new();
        let backup = manager.create_backup(&source, None, None, &cancel).unwrap();
        assert_eq!(fs::read(backup.directory_path.join("Data/Mods/tweaks.json")).unwrap(), b"{}");

        let destination = temp.path().join("dest");
        let summary = manager.find_backup(&backup.id).unwrap();
        manager.restore_backup(&summary, &destination, None, &cancel).unwrap();
        assert_eq!(fs::read(destination.join("Mods/tweaks.json")).unwrap(), b"{}");
        assert_eq!(fs::read(destination.join("Saves/linked/level")).unwrap(), b"far away");
        assert!(!fs::symlink_metadata(destination.join("Mods")).unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_list_on_missing_root() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        assert!(manager.list_backups().is_empty());
        assert_eq!(manager.gc().entries_examined, 0);
        assert_eq!(manager.store_stats().unwrap().entry_count, 0);
    }
}
