//! # Savevault CLI - Game data backups
//!
//! Command-line interface for the Savevault library.
//!
//! ## Features
//! - Back up a game data directory with deduplicated save archives
//! - List, restore and delete backups
//! - Verify that backups can still be restored
//! - Reclaim save store space with garbage collection
//!
//! ## Usage
//! ```bash
//! # Back up a data directory
//! savevault --root ./backups backup ~/.config/VintagestoryData --game-version 1.19.8
//!
//! # List backups
//! savevault list
//!
//! # Restore a backup
//! savevault restore 2024-05-01-001 ~/.config/VintagestoryData
//!
//! # Delete all backups of a data directory for one game version
//! savevault delete --source ~/.config/VintagestoryData --game-version 1.19.8
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use savevault::utils::format_bytes;
use savevault::{BackupManager, CancellationToken, ProgressCallback, Result, VaultError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Savevault CLI - Deduplicating backups of game data directories
#[derive(Parser)]
#[command(name = "savevault")]
#[command(version)]
#[command(about = "Back up and restore game data directories with deduplicated saves")]
#[command(long_about = None)]
struct Cli {
    /// Backup root directory
    #[arg(short, long, global = true, env = "SAVEVAULT_ROOT", default_value = "backups")]
    root: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up a data directory
    #[command(alias = "b")]
    Backup {
        /// Data directory to back up
        source: PathBuf,

        /// Game version the data belongs to
        #[arg(short, long)]
        game_version: Option<String>,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// Restore a backup over a data directory
    #[command(alias = "rs")]
    Restore {
        /// Backup id
        backup: String,

        /// Data directory to replace
        destination: PathBuf,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// List backups, newest first
    #[command(alias = "ls")]
    List {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,

        /// Limit results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete one backup by id, or all backups of a source and game version
    #[command(alias = "rm")]
    Delete {
        /// Backup id
        #[arg(conflicts_with_all = ["source", "game_version"], required_unless_present = "source")]
        backup: Option<String>,

        /// Data directory whose backups to delete
        #[arg(long, requires = "game_version")]
        source: Option<PathBuf>,

        /// Game version whose backups to delete
        #[arg(short, long, requires = "source")]
        game_version: Option<String>,
    },

    /// Garbage collect unreferenced saves
    Gc {
        /// Dry run
        #[arg(long)]
        dry_run: bool,
    },

    /// Verify a backup
    Verify {
        /// Backup id
        backup: String,
    },

    /// Show save store statistics
    Stats,

    /// Print the backup root directory
    Root,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        if e.is_cancelled() {
            eprintln!("{}", "Cancelled".yellow().bold());
        } else {
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        }
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    let manager = BackupManager::new(cli.root);

    match cli.command {
        Commands::Backup {
            source,
            game_version,
            progress,
        } => cmd_backup(&manager, source, game_version, progress),
        Commands::Restore {
            backup,
            destination,
            progress,
        } => cmd_restore(&manager, backup, destination, progress),
        Commands::List { detailed, limit, json } => cmd_list(&manager, detailed, limit, json),
        Commands::Delete {
            backup,
            source,
            game_version,
        } => cmd_delete(&manager, backup, source, game_version),
        Commands::Gc { dry_run } => cmd_gc(&manager, dry_run),
        Commands::Verify { backup } => cmd_verify(&manager, backup),
        Commands::Stats => cmd_stats(&manager),
        Commands::Root => {
            println!("{}", manager.backup_root_directory().display());
            Ok(())
        }
    }
}

/// Back up a data directory
///
/// Plain files are copied into a new backup directory; saves go into the
/// shared save store, once per distinct content.
fn cmd_backup(
    manager: &BackupManager,
    source: PathBuf,
    game_version: Option<String>,
    show_progress: bool,
) -> Result<()> {
    println!("{}", "Creating backup...".blue().bold());

    let start = Instant::now();
    let (bar, callback) = progress_bar(show_progress);
    let result = manager.create_backup(&source, game_version.as_deref(), callback, &CancellationToken::new());
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
    let backup = result?;

    let summary = manager.find_backup(&backup.id)?;
    println!("{} Created backup {}", "✓".green().bold(), backup.id.yellow().bold());
    println!("  Directory: {}", backup.directory_path.display().to_string().cyan());
    if let Some(version) = &summary.game_version {
        println!("  Game version: {}", version.cyan());
    }
    println!(
        "  Saves: {} ({})",
        summary.save_count.to_string().cyan(),
        format_bytes(summary.save_bytes).cyan()
    );
    println!("  Time: {}", format_duration(round_millis(start.elapsed())).to_string().cyan());

    Ok(())
}

/// Restore a backup
///
/// The destination is emptied first and rebuilt from the backup. A failed
/// restore leaves it partially rewritten.
fn cmd_restore(manager: &BackupManager, backup_id: String, destination: PathBuf, show_progress: bool) -> Result<()> {
    let summary = manager.find_backup(&backup_id)?;
    println!(
        "{} {} into {}",
        "Restoring backup".blue().bold(),
        summary.id.yellow(),
        destination.display().to_string().cyan()
    );

    let (bar, callback) = progress_bar(show_progress);
    let result = manager.restore_backup(&summary, &destination, callback, &CancellationToken::new());
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
    let stats = result?;

    println!("{} Restore completed", "✓".green().bold());
    println!("  Files restored: {}", stats.files_restored.to_string().cyan());
    println!("  Saves restored: {}", stats.saves_restored.to_string().cyan());
    println!("  Written: {}", format_bytes(stats.bytes_written).cyan());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(stats.duration_ms)).to_string().cyan()
    );

    Ok(())
}

/// List backups, newest first
fn cmd_list(manager: &BackupManager, detailed: bool, limit: Option<usize>, json: bool) -> Result<()> {
    let backups = manager.list_backups();
    let display_count = limit.unwrap_or(backups.len()).min(backups.len());

    if json {
        println!("{}", serde_json::to_string_pretty(&backups[..display_count])?);
        return Ok(());
    }

    if backups.is_empty() {
        println!("{}", "No backups found.".yellow());
        return Ok(());
    }

    println!("{}", "Backups:".blue().bold());
    println!();

    for backup in backups.iter().take(display_count) {
        print!("  {} ", backup.id.yellow().bold());
        print!(
            "{} ",
            backup
                .created_at_utc
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed()
        );
        if let Some(version) = &backup.game_version {
            print!("{}", version.cyan());
        }
        println!();

        if detailed {
            println!("    Source: {}", backup.source_data_directory.dimmed());
            println!(
                "    Saves: {} | Size: {}",
                backup.save_count.to_string().dimmed(),
                format_bytes(backup.save_bytes).dimmed()
            );
            println!();
        }
    }

    if display_count < backups.len() {
        println!(
            "\n{}",
            format!("Showing {} of {} backups", display_count, backups.len()).dimmed()
        );
    }

    Ok(())
}

/// Delete backups
fn cmd_delete(
    manager: &BackupManager,
    backup_id: Option<String>,
    source: Option<PathBuf>,
    game_version: Option<String>,
) -> Result<()> {
    match (backup_id, source, game_version) {
        (Some(id), _, _) => {
            let stats = manager.delete_backup(&id)?;
            println!("{} Deleted backup {}", "✓".green().bold(), id.yellow());
            println!(
                "  Saves reclaimed: {} ({})",
                stats.entries_deleted.to_string().green(),
                format_bytes(stats.bytes_reclaimed).green()
            );
        }
        (None, Some(source), Some(version)) => {
            let count = manager.delete_backups(&source, &version)?;
            println!(
                "{} Deleted {} backups of {} ({})",
                "✓".green().bold(),
                count.to_string().yellow(),
                source.display().to_string().cyan(),
                version.cyan()
            );
        }
        _ => {
            return Err(VaultError::validation(
                "specify a backup id, or both --source and --game-version",
            ))
        }
    }
    Ok(())
}

/// Garbage collect unreferenced saves
///
/// Removes save store entries that no backup references any more.
fn cmd_gc(manager: &BackupManager, dry_run: bool) -> Result<()> {
    let start = Instant::now();

    if dry_run {
        println!("{}", "Analyzing garbage collection (dry run)...".blue().bold());
        let stats = manager.gc_analyze();

        println!("\n{}", "Analysis Results:".bold());
        println!("  Entries examined: {}", stats.entries_examined);
        println!(
            "  Unreferenced entries: {}",
            stats.unreferenced_entries.len().to_string().yellow()
        );
        println!("  Space to reclaim: {}", format_bytes(stats.bytes_reclaimed).green());

        if !stats.unreferenced_entries.is_empty() {
            println!("\n{}", "Unreferenced entries:".yellow());
            for name in stats.unreferenced_entries.iter().take(10) {
                println!("  - {}", name.dimmed());
            }
            if stats.unreferenced_entries.len() > 10 {
                println!(
                    "  ... and {} more",
                    (stats.unreferenced_entries.len() - 10).to_string().dimmed()
                );
            }
        }

        println!("\n{}", "No changes made (dry run)".dimmed());
    } else {
        println!("{}", "Running garbage collection...".blue().bold());
        let stats = manager.gc();

        println!("\n{} Garbage collection complete", "✓".green().bold());
        println!("  Entries deleted: {}", stats.entries_deleted.to_string().green());
        println!("  Space reclaimed: {}", format_bytes(stats.bytes_reclaimed).green());
        if !stats.failures.is_empty() {
            println!(
                "  {} {} entries could not be removed",
                "⚠".yellow().bold(),
                stats.failures.len()
            );
        }
    }

    println!(
        "\n{}",
        format!("Total time: {}", format_duration(round_millis(start.elapsed()))).dimmed()
    );
    Ok(())
}

/// Verify that a backup can be restored as recorded
fn cmd_verify(manager: &BackupManager, backup_id: String) -> Result<()> {
    println!("{} {}", "Verifying backup".blue().bold(), backup_id.yellow());
    let report = manager.verify_backup(&backup_id)?;

    println!("\n{}", "Verification Report:".bold());
    println!(
        "  Data tree: {}",
        if report.data_tree_present { "✓ Present".green() } else { "✗ Missing".red() }
    );
    println!(
        "  Saves: {}/{} valid",
        (report.saves_checked - report.missing.len() - report.mismatched.len())
            .to_string()
            .green(),
        report.saves_checked
    );
    for save in &report.missing {
        println!("  {} {} missing from save store", "✗".red(), save);
    }
    for save in &report.mismatched {
        println!("  {} {} does not match its recorded hash", "✗".red(), save);
    }

    if report.is_valid() {
        Ok(())
    } else {
        Err(VaultError::validation(report.summary()))
    }
}

/// Show save store statistics
fn cmd_stats(manager: &BackupManager) -> Result<()> {
    let stats = manager.store_stats()?;
    let backups = manager.list_backups();

    println!("{}", "Save Store:".blue().bold());
    println!("  Root: {}", manager.backup_root_directory().display().to_string().cyan());
    println!("  Backups: {}", backups.len().to_string().cyan());
    println!(
        "  Entries: {} ({} files, {} directories)",
        stats.entry_count.to_string().cyan(),
        stats.file_entries,
        stats.directory_entries
    );
    println!("  Size: {}", format_bytes(stats.total_bytes).cyan());

    let referenced: u64 = backups.iter().map(|b| b.save_bytes).sum();
    if referenced > stats.total_bytes {
        println!(
            "  Saved by deduplication: {}",
            format_bytes(referenced - stats.total_bytes).green()
        );
    }
    Ok(())
}

/// Progress bar fed from the library's progress callback
fn progress_bar(enabled: bool) -> (Option<ProgressBar>, Option<ProgressCallback>) {
    if !enabled {
        return (None, None);
    }

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let sink = pb.clone();
    let callback: ProgressCallback = Arc::new(move |update| {
        sink.set_position(u64::from(update.percent));
        sink.set_message(update.status);
    });
    (Some(pb), Some(callback))
}

fn round_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
