//! Utility functions for Savevault
//!
//! This module provides the file operations shared by the executors, the save
//! store and the garbage collector.
//!
//! ## Categories of Utilities
//!
//! ### File Operations
//! - Streaming, cancellable file and directory copies
//! - Atomic file writing
//! - Best-effort removal returning [`CleanupError`]
//! - Size probing of files and directory trees
//! - Tree walks that follow symbolic links and skip dangling ones
//!
//! ### Path Manipulation
//! - Absolute, lexically normalized paths
//! - Platform-aware path comparison and containment checks
//! - Forward-slash relative paths for manifests and hashing
//!
//! ### Formatting
//! - Byte formatting (human-readable sizes)
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use savevault::utils::{format_bytes, to_forward_slashes};
//! use std::path::Path;
//!
//! assert_eq!(format_bytes(1536), "1.50 KB");
//! assert_eq!(to_forward_slashes(Path::new("Saves/world1")), "Saves/world1");
//! ```

use crate::cancel::CancellationToken;
use crate::error::{CleanupError, Result, VaultError};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{trace, warn};
use walkdir::{DirEntry, WalkDir};

/// Copy a single file through a fixed-size buffer
///
/// The cancellation token is checked before every chunk, including the
/// first. On cancellation the partially written destination is left in place;
/// callers roll back whole directories rather than single files.
///
/// # Returns
///
/// Number of bytes copied.
///
/// # Errors
///
/// - [`VaultError::Io`] if the source cannot be read or the destination written
/// - [`VaultError::Cancelled`] if the token was raised
pub fn copy_file_streaming(
    source: &Path,
    destination: &Path,
    buffer_size: usize,
    cancel: &CancellationToken,
) -> Result<u64> {
    cancel.check()?;
    let mut reader = File::open(source)?;
    let mut writer = File::create(destination)?;
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut copied = 0u64;

    loop {
        cancel.check()?;
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        copied += bytes_read as u64;
    }

    writer.flush()?;
    trace!("Copied {:?} -> {:?} ({} bytes)", source, destination, copied);
    Ok(copied)
}

/// Recursively copy a directory tree
///
/// Directories are created before their contents; entries are visited in
/// file name order. Cancellation is checked before each entry and before
/// each chunk of every file.
///
/// # Returns
///
/// Number of file bytes copied.
pub fn copy_dir_recursive(
    source: &Path,
    destination: &Path,
    buffer_size: usize,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut copied = 0u64;
    fs::create_dir_all(destination)?;

    for entry in walk_resolved(source) {
        cancel.check()?;
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| VaultError::internal(format!("{:?} escaped {:?}", entry.path(), source)))?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            copied += copy_file_streaming(entry.path(), &target, buffer_size, cancel)?;
        }
    }

    Ok(copied)
}

/// Size of a file, or of every file under a directory
///
/// Best effort: anything unreadable counts as 0.
pub fn entry_size(path: &Path) -> u64 {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum(),
        Ok(meta) => meta.len(),
        Err(_) => 0,
    }
}

/// Walk everything below `root` in file name order, following symbolic links
///
/// Entries report the type of their link target, so a linked directory is
/// walked like a real one. Links whose target does not exist are skipped with
/// a warning. A link cycle is an error.
pub fn walk_resolved(root: &Path) -> impl Iterator<Item = Result<DirEntry>> {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(Ok(entry)),
            Err(e) if is_dangling_link(&e) => {
                warn!("Skipping dangling symbolic link {:?}", e.path());
                None
            }
            Err(e) => Some(Err(e.into())),
        })
}

fn is_dangling_link(err: &walkdir::Error) -> bool {
    err.loop_ancestor().is_none()
        && err
            .io_error()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
        && err
            .path()
            .and_then(|p| fs::symlink_metadata(p).ok())
            .is_some_and(|meta| meta.file_type().is_symlink())
}

/// Remove a file or a whole directory tree
///
/// Used by cleanup paths that must not fail the surrounding operation. A path
/// that is already gone counts as removed.
pub fn remove_path(path: &Path) -> std::result::Result<(), CleanupError> {
    let outcome = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };

    outcome.map_err(|source| CleanupError {
        path: path.to_path_buf(),
        source,
    })
}

/// Atomic file write (write to temp file then rename)
///
/// The target is either complete or untouched; a reader never observes a
/// half-written file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    // Write to temp file
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    // Atomic rename
    if let Err(e) = fs::rename(&temp_path, path) {
        fs::remove_file(&temp_path).ok();
        return Err(e.into());
    }

    Ok(())
}

/// Make a path absolute and lexically clean
///
/// `.` components are dropped, `..` pops the previous component, and no
/// trailing separator remains. Symbolic links are not resolved.
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(VaultError::validation("path must not be empty"));
    }

    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    Ok(normalized)
}

/// Compare two normalized path strings the way the host filesystem does
///
/// Case-insensitive on Windows and macOS, exact elsewhere.
pub fn paths_equal(a: &str, b: &str) -> bool {
    let a = a.trim_end_matches(['/', '\\']);
    let b = b.trim_end_matches(['/', '\\']);
    if cfg!(any(windows, target_os = "macos")) {
        a.to_lowercase() == b.to_lowercase()
    } else {
        a == b
    }
}

/// Whether `path` is `ancestor` itself or lies somewhere below it
///
/// Both paths are compared after lexical normalization, and again after
/// resolving symbolic links when both exist.
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    let lexical = match (normalize_path(path), normalize_path(ancestor)) {
        (Ok(path), Ok(ancestor)) => starts_with_components(&path, &ancestor),
        _ => false,
    };
    lexical
        || matches!(
            (fs::canonicalize(path), fs::canonicalize(ancestor)),
            (Ok(path), Ok(ancestor)) if starts_with_components(&path, &ancestor)
        )
}

fn starts_with_components(path: &Path, ancestor: &Path) -> bool {
    let mut components = path.components();
    ancestor.components().all(|expected| {
        components.next().is_some_and(|actual| {
            paths_equal(
                &actual.as_os_str().to_string_lossy(),
                &expected.as_os_str().to_string_lossy(),
            )
        })
    })
}

/// Render a path with `/` separators
pub fn to_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Normalize a game version string
///
/// Surrounding whitespace and one leading `v` are removed. Blank versions
/// become `None`.
pub fn normalize_version(version: Option<&str>) -> Option<String> {
    let trimmed = version?.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
        .trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Format bytes in human-readable form
///
/// Uses binary units (1024-based). Values below 1 KB are printed as whole
/// numbers, larger ones with two decimals.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
