// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Stale entry cleanup inside a backup generation.
//!
//! Walks the generation tree, not the source, and removes every entry whose
//! corresponding source path no longer exists. Directories are handled post
//! order: children first, then the directory itself when the removals left
//! it empty, so a directory that held only stale children disappears with
//! them.
//!
//! Cleanup must run strictly after the mirror walk of the same generation.
//! It compares against current source state only, so running it on a fresh
//! generation before sync populated it would mistake everything for stale.
//!
//! Subtrees whose corresponding source directory contains a `.git` entry
//! are left untouched, mirroring the exclusion the sync walk applies.

use crate::{engine::walker::sorted_entries, journal::Journal};

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Per-entry outcome of one cleanup walk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Entries removed because their source counterpart vanished.
    pub removed: Vec<PathBuf>,

    /// Directories pruned for ending up empty after removal.
    pub pruned: Vec<PathBuf>,

    /// Entries kept because their source counterpart is alive.
    pub kept: Vec<PathBuf>,
}

/// Remove stale entries from a populated backup generation.
///
/// # Errors
///
/// - Return [`CleanupError`] on the first unrecoverable filesystem failure.
#[instrument(skip_all, level = "debug")]
pub fn cleanup(
    generation_root: &Path,
    source_root: &Path,
    journal: &mut Journal,
) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    clean_dir(
        generation_root,
        source_root,
        Path::new(""),
        journal,
        &mut report,
    )?;

    Ok(report)
}

fn clean_dir(
    backup_dir: &Path,
    source_dir: &Path,
    rel: &Path,
    journal: &mut Journal,
    report: &mut CleanupReport,
) -> Result<()> {
    // INVARIANT: Never clean inside a tree the sync walk excludes as a VCS
    // working copy.
    if source_dir.join(".git").symlink_metadata().is_ok() {
        debug!("leave VCS-excluded tree alone at {:?}", backup_dir.display());
        return Ok(());
    }

    for entry in sorted_entries(backup_dir).map_err(CleanupError::Walk)? {
        let backup_path = backup_dir.join(&entry);
        let source_path = source_dir.join(&entry);
        let entry_rel = rel.join(&entry);

        let metadata = backup_path
            .symlink_metadata()
            .map_err(|err| CleanupError::Stat {
                source: err,
                path: backup_path.clone(),
            })?;

        // Expected absence: a vanished source path is the normal trigger
        // for stale removal, not an error.
        if source_path.symlink_metadata().is_err() {
            remove_entry(&backup_path, &metadata)?;
            journal
                .append(format!("removed stale: {}", entry_rel.display()))
                .map_err(CleanupError::Journal)?;
            report.removed.push(entry_rel);
            continue;
        }

        if metadata.is_dir() && source_path.is_dir() {
            clean_dir(&backup_path, &source_path, &entry_rel, journal, report)?;

            // INVARIANT: Post-order pruning, after the recursion had its
            // chance to empty the directory out.
            if dir_is_empty(&backup_path)? {
                fs::remove_dir(&backup_path).map_err(|err| CleanupError::Remove {
                    source: err,
                    path: backup_path.clone(),
                })?;
                journal
                    .append(format!("pruned empty: {}", entry_rel.display()))
                    .map_err(CleanupError::Journal)?;
                report.pruned.push(entry_rel);
            }
        } else if !metadata.is_dir() {
            journal
                .append(format!("kept: {}", entry_rel.display()))
                .map_err(CleanupError::Journal)?;
            report.kept.push(entry_rel);
        }
    }

    Ok(())
}

fn remove_entry(backup_path: &Path, metadata: &fs::Metadata) -> Result<()> {
    let result = if metadata.is_dir() {
        fs::remove_dir_all(backup_path)
    } else {
        fs::remove_file(backup_path)
    };

    result.map_err(|err| CleanupError::Remove {
        source: err,
        path: backup_path.to_path_buf(),
    })
}

fn dir_is_empty(dir: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(dir).map_err(|err| CleanupError::Stat {
        source: err,
        path: dir.to_path_buf(),
    })?;

    Ok(entries.next().is_none())
}

/// Cleanup walk error types.
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    /// Listing a generation directory fails.
    #[error(transparent)]
    Walk(#[from] crate::engine::walker::WalkError),

    /// Entry metadata cannot be inspected.
    #[error("failed to stat {:?}", path.display())]
    Stat {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Stale entry cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Journal write fails mid-walk.
    #[error(transparent)]
    Journal(#[from] crate::journal::JournalError),
}

/// Friendly result alias :3
type Result<T, E = CleanupError> = std::result::Result<T, E>;
