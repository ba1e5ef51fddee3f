// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Generation retention enforcement.
//!
//! Keeps the number of backup generations under the destination root within
//! a fixed bound. Generations are named `backup_<YYYY-MM-DD>`, so sorting
//! them lexicographically sorts them chronologically, and the oldest ones
//! beyond the bound are deleted recursively.
//!
//! Runs once per invocation, after the current generation has been
//! populated, so a freshly created generation never falls victim to its own
//! run unless the bound is zero.

use chrono::NaiveDate;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

use crate::journal::Journal;

/// Prefix every generation directory name carries.
pub const GENERATION_PREFIX: &str = "backup_";

/// Check whether a directory name follows the generation convention.
///
/// The name must be `backup_` followed by a valid `YYYY-MM-DD` date.
/// Anything else under the destination root, the journal file included, is
/// none of retention's business.
pub fn is_generation_name(name: &str) -> bool {
    name.strip_prefix(GENERATION_PREFIX)
        .map(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok())
        .unwrap_or(false)
}

/// Delete the oldest generations beyond the retention bound.
///
/// Returns the names of removed generations, oldest first.
///
/// # Errors
///
/// - Return [`RetentionError`] if the destination cannot be listed or an
///   old generation cannot be removed.
#[instrument(skip(journal), level = "debug")]
pub fn enforce(
    dest_root: &Path,
    max_backups: usize,
    journal: &mut Journal,
) -> Result<Vec<PathBuf>> {
    let mut generations = Vec::new();
    let entries = fs::read_dir(dest_root).map_err(|err| RetentionError::ReadDir {
        source: err,
        path: dest_root.to_path_buf(),
    })?;
    for entry in entries {
        let entry = entry.map_err(|err| RetentionError::ReadDir {
            source: err,
            path: dest_root.to_path_buf(),
        })?;
        let name = entry.file_name();
        if is_generation_name(name.to_string_lossy().as_ref()) && entry.path().is_dir() {
            generations.push(name);
        }
    }
    generations.sort();

    let excess = generations.len().saturating_sub(max_backups);
    let mut removed = Vec::new();
    for name in generations.into_iter().take(excess) {
        let path = dest_root.join(&name);
        info!("retire old generation {:?}", path.display());
        fs::remove_dir_all(&path).map_err(|err| RetentionError::Remove {
            source: err,
            path: path.clone(),
        })?;
        journal
            .append(format!("retired generation: {}", name.to_string_lossy()))
            .map_err(RetentionError::Journal)?;
        removed.push(PathBuf::from(name));
    }

    Ok(removed)
}

/// Retention error types.
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    /// Destination root cannot be listed.
    #[error("failed to read directory {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Old generation cannot be removed.
    #[error("failed to remove generation {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Journal write fails.
    #[error(transparent)]
    Journal(#[from] crate::journal::JournalError),
}

/// Friendly result alias :3
type Result<T, E = RetentionError> = std::result::Result<T, E>;
