// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Mirror walk from source tree into a backup generation.
//!
//! Descends the source tree depth first, directory entries ordered
//! lexicographically by name, and mirrors every file and symlink into the
//! corresponding location under the generation root.
//!
//! # Change Detection
//!
//! A source entry is copied when any of three criteria hold: the backup
//! entry is absent, the source modification time is newer, or the byte
//! sizes differ. There is no content hashing. A same-size edit that does
//! not advance the modification time is therefore missed; that blind spot
//! is a documented property of the tool, kept deliberately so the backup
//! guarantees stay the same across versions.
//!
//! # VCS Exclusion
//!
//! Any directory whose immediate children include a `.git` entry is skipped
//! wholesale before recursion, at every depth. Nested repositories inside a
//! skipped tree are never visited, and the skip produces a single journal
//! notice for the subtree root.

use crate::journal::Journal;

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Per-entry outcome of one mirror walk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries copied into the generation, relative to the source root.
    pub copied: Vec<PathBuf>,

    /// Entries left untouched because no change criterion fired.
    pub unchanged: Vec<PathBuf>,

    /// Subtree roots skipped for containing a `.git` entry.
    pub vcs_skipped: Vec<PathBuf>,
}

/// Mirror the source root into a backup generation root.
///
/// # Errors
///
/// - Return [`WalkError`] on the first unrecoverable filesystem failure.
///   The partially written generation is left as-is for inspection.
#[instrument(skip_all, level = "debug")]
pub fn sync(
    source_root: &Path,
    generation_root: &Path,
    journal: &mut Journal,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    sync_dir(
        source_root,
        generation_root,
        Path::new(""),
        journal,
        &mut report,
    )?;

    Ok(report)
}

fn sync_dir(
    source_dir: &Path,
    backup_dir: &Path,
    rel: &Path,
    journal: &mut Journal,
    report: &mut SyncReport,
) -> Result<()> {
    // INVARIANT: VCS exclusion happens pre-order, before anything under this
    // directory is touched or mirrored.
    if source_dir.join(".git").symlink_metadata().is_ok() {
        debug!("skip VCS tree at {:?}", source_dir.display());
        journal
            .append(format!("skipped vcs tree: {}", display_rel(rel)))
            .map_err(WalkError::Journal)?;
        report.vcs_skipped.push(rel.to_path_buf());
        return Ok(());
    }

    match backup_dir.symlink_metadata() {
        Ok(existing) if existing.is_dir() => {}
        Ok(_) => {
            // A file sat where the source now has a directory. Replace it.
            fs::remove_file(backup_dir).map_err(|err| WalkError::Remove {
                source: err,
                path: backup_dir.to_path_buf(),
            })?;
            fs::create_dir_all(backup_dir).map_err(|err| WalkError::CreateDir {
                source: err,
                path: backup_dir.to_path_buf(),
            })?;
        }
        Err(_) => {
            fs::create_dir_all(backup_dir).map_err(|err| WalkError::CreateDir {
                source: err,
                path: backup_dir.to_path_buf(),
            })?;
        }
    }

    for entry in sorted_entries(source_dir)? {
        let source_path = source_dir.join(&entry);
        let backup_path = backup_dir.join(&entry);
        let entry_rel = rel.join(&entry);

        let metadata =
            source_path
                .symlink_metadata()
                .map_err(|err| WalkError::Stat {
                    source: err,
                    path: source_path.clone(),
                })?;

        if metadata.is_dir() {
            sync_dir(&source_path, &backup_path, &entry_rel, journal, report)?;
        } else if needs_copy(&source_path, &metadata, &backup_path)? {
            copy_entry(&source_path, &metadata, &backup_path)?;
            journal
                .append(format!("copied: {}", display_rel(&entry_rel)))
                .map_err(WalkError::Journal)?;
            report.copied.push(entry_rel);
        } else {
            report.unchanged.push(entry_rel);
        }
    }

    Ok(())
}

/// List directory entry names in lexicographic order.
pub(crate) fn sorted_entries(dir: &Path) -> Result<Vec<std::ffi::OsString>> {
    let mut names = Vec::new();
    let entries = fs::read_dir(dir).map_err(|err| WalkError::ReadDir {
        source: err,
        path: dir.to_path_buf(),
    })?;
    for entry in entries {
        let entry = entry.map_err(|err| WalkError::ReadDir {
            source: err,
            path: dir.to_path_buf(),
        })?;
        names.push(entry.file_name());
    }
    names.sort();

    Ok(names)
}

/// Decide whether a source entry must be copied into the generation.
///
/// True when the backup entry is absent, the source modification time is
/// newer, or the byte sizes differ.
fn needs_copy(source_path: &Path, metadata: &fs::Metadata, backup_path: &Path) -> Result<bool> {
    let backup_metadata = match backup_path.symlink_metadata() {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(err) => {
            return Err(WalkError::Stat {
                source: err,
                path: backup_path.to_path_buf(),
            })
        }
    };

    // INVARIANT: A kind change (symlink to file, directory to file) always
    // copies, no matter what the timestamps and sizes claim.
    if backup_metadata.file_type() != metadata.file_type() {
        debug!("{:?} changed kind since its backup", source_path.display());
        return Ok(true);
    }

    let newer = match (metadata.modified(), backup_metadata.modified()) {
        (Ok(source_mtime), Ok(backup_mtime)) => source_mtime > backup_mtime,
        // No usable timestamps? Fall through to the size criterion.
        _ => false,
    };
    if newer {
        debug!("{:?} newer than its backup", source_path.display());
        return Ok(true);
    }

    Ok(metadata.len() != backup_metadata.len())
}

/// Copy one file or symlink, preserving metadata.
///
/// Permission bits and modification time carry over for regular files.
/// Symlinks are recreated with the same target, never followed.
fn copy_entry(source_path: &Path, metadata: &fs::Metadata, backup_path: &Path) -> Result<()> {
    // INVARIANT: A leftover backup entry of a different kind is replaced
    // wholesale. A stale backup symlink in particular must never survive to
    // the copy below, or `fs::copy` would write the new content through it
    // into whatever the link points at.
    match backup_path.symlink_metadata() {
        Ok(existing) if existing.is_dir() => {
            fs::remove_dir_all(backup_path).map_err(|err| WalkError::Remove {
                source: err,
                path: backup_path.to_path_buf(),
            })?;
        }
        Ok(existing) if existing.is_symlink() || metadata.is_symlink() => {
            fs::remove_file(backup_path).map_err(|err| WalkError::Remove {
                source: err,
                path: backup_path.to_path_buf(),
            })?;
        }
        _ => {}
    }

    if metadata.is_symlink() {
        let target = fs::read_link(source_path).map_err(|err| WalkError::Copy {
            source: err,
            from: source_path.to_path_buf(),
            to: backup_path.to_path_buf(),
        })?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, backup_path).map_err(|err| WalkError::Copy {
            source: err,
            from: source_path.to_path_buf(),
            to: backup_path.to_path_buf(),
        })?;

        return Ok(());
    }

    fs::copy(source_path, backup_path).map_err(|err| WalkError::Copy {
        source: err,
        from: source_path.to_path_buf(),
        to: backup_path.to_path_buf(),
    })?;

    // INVARIANT: The mirror keeps the source modification time, otherwise
    // the newer-mtime criterion would fire again on every later run.
    if let Ok(mtime) = metadata.modified() {
        let times = fs::FileTimes::new().set_modified(mtime);
        fs::OpenOptions::new()
            .write(true)
            .open(backup_path)
            .and_then(|file| file.set_times(times))
            .map_err(|err| WalkError::Copy {
                source: err,
                from: source_path.to_path_buf(),
                to: backup_path.to_path_buf(),
            })?;
    }

    Ok(())
}

fn display_rel(rel: &Path) -> String {
    if rel.as_os_str().is_empty() {
        ".".into()
    } else {
        rel.display().to_string()
    }
}

/// Mirror walk error types.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    /// Directory cannot be listed.
    #[error("failed to read directory {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Entry metadata cannot be inspected.
    #[error("failed to stat {:?}", path.display())]
    Stat {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backup directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Entry cannot be copied into the generation.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Leftover backup entry cannot be removed before replacement.
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
type Result<T, E = WalkError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, read_to_string, write};
    use std::time::{Duration, SystemTime};

    fn journal_in(dir: &Path) -> Journal {
        Journal::open(dir.join("sync.log"), 1 << 20, 1 << 19).unwrap()
    }

    fn set_mtime(path: &Path, mtime: SystemTime) {
        let times = fs::FileTimes::new().set_modified(mtime);
        fs::OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|file| file.set_times(times))
            .unwrap();
    }

    #[test]
    fn mirrors_files_with_content_and_mtime() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("source");
        let generation = temp.path().join("backup_2026-08-26");
        create_dir_all(source.join("notes"))?;
        write(source.join("notes/a.txt"), "alpha")?;
        write(source.join("b.txt"), "beta")?;

        let mut journal = journal_in(temp.path());
        let report = sync(&source, &generation, &mut journal)?;

        assert_eq!(
            report.copied,
            vec![PathBuf::from("b.txt"), PathBuf::from("notes/a.txt")]
        );
        assert_eq!(read_to_string(generation.join("notes/a.txt"))?, "alpha");
        assert_eq!(read_to_string(generation.join("b.txt"))?, "beta");

        let source_mtime = source.join("b.txt").metadata()?.modified()?;
        let backup_mtime = generation.join("b.txt").metadata()?.modified()?;
        assert_eq!(source_mtime, backup_mtime);

        Ok(())
    }

    #[test]
    fn second_run_is_idempotent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("source");
        let generation = temp.path().join("backup_2026-08-26");
        create_dir_all(source.join("deep/deeper"))?;
        write(source.join("deep/deeper/a.txt"), "alpha")?;
        write(source.join("b.txt"), "beta")?;

        let mut journal = journal_in(temp.path());
        let first = sync(&source, &generation, &mut journal)?;
        assert_eq!(first.copied.len(), 2);

        let second = sync(&source, &generation, &mut journal)?;
        assert!(second.copied.is_empty());
        assert_eq!(second.unchanged.len(), 2);

        Ok(())
    }

    #[test]
    fn skips_vcs_trees_at_any_depth() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("source");
        let generation = temp.path().join("backup_2026-08-26");
        create_dir_all(source.join("projects/thing/.git"))?;
        write(source.join("projects/thing/main.rs"), "fn main() {}")?;
        write(source.join("projects/readme.md"), "hello")?;

        let mut journal = journal_in(temp.path());
        let report = sync(&source, &generation, &mut journal)?;

        assert_eq!(report.vcs_skipped, vec![PathBuf::from("projects/thing")]);
        assert!(!generation.join("projects/thing").exists());
        assert!(generation.join("projects/readme.md").exists());

        let log = read_to_string(temp.path().join("sync.log"))?;
        assert_eq!(
            log.matches("skipped vcs tree: projects/thing").count(),
            1
        );
        assert!(!log.contains("main.rs"));

        Ok(())
    }

    #[test]
    fn newer_mtime_triggers_copy() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("source");
        let generation = temp.path().join("backup_2026-08-26");
        create_dir_all(&source)?;
        write(source.join("a.txt"), "alpha")?;

        let mut journal = journal_in(temp.path());
        sync(&source, &generation, &mut journal)?;

        // Same size, strictly newer mtime.
        write(source.join("a.txt"), "aleph")?;
        set_mtime(
            &source.join("a.txt"),
            SystemTime::now() + Duration::from_secs(5),
        );

        let report = sync(&source, &generation, &mut journal)?;
        assert_eq!(report.copied, vec![PathBuf::from("a.txt")]);
        assert_eq!(read_to_string(generation.join("a.txt"))?, "aleph");

        Ok(())
    }

    #[test]
    fn size_change_triggers_copy() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("source");
        let generation = temp.path().join("backup_2026-08-26");
        create_dir_all(&source)?;
        write(source.join("a.txt"), "alpha")?;

        let mut journal = journal_in(temp.path());
        sync(&source, &generation, &mut journal)?;

        // Truncate, then push the mtime into the past so only the size
        // criterion can fire.
        write(source.join("a.txt"), "al")?;
        set_mtime(
            &source.join("a.txt"),
            SystemTime::now() - Duration::from_secs(3600),
        );

        let report = sync(&source, &generation, &mut journal)?;
        assert_eq!(report.copied, vec![PathBuf::from("a.txt")]);
        assert_eq!(read_to_string(generation.join("a.txt"))?, "al");

        Ok(())
    }

    #[test]
    fn same_size_older_mtime_edit_is_missed() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("source");
        let generation = temp.path().join("backup_2026-08-26");
        create_dir_all(&source)?;
        write(source.join("a.txt"), "alpha")?;

        let mut journal = journal_in(temp.path());
        sync(&source, &generation, &mut journal)?;

        // Same size, mtime pushed backwards. The documented blind spot:
        // this edit must not be detected.
        write(source.join("a.txt"), "omega")?;
        set_mtime(
            &source.join("a.txt"),
            SystemTime::now() - Duration::from_secs(3600),
        );

        let report = sync(&source, &generation, &mut journal)?;
        assert!(report.copied.is_empty());
        assert_eq!(read_to_string(generation.join("a.txt"))?, "alpha");

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn file_replacing_symlink_does_not_write_through_link() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("source");
        let generation = temp.path().join("backup_2026-08-26");
        create_dir_all(&source)?;
        write(source.join("real.txt"), "alpha")?;
        std::os::unix::fs::symlink("real.txt", source.join("link.txt"))?;

        let mut journal = journal_in(temp.path());
        sync(&source, &generation, &mut journal)?;

        // The source symlink turns into a regular file. The mirror must end
        // up with a regular file too, and the old link target must keep its
        // mirrored content instead of being clobbered through the link.
        fs::remove_file(source.join("link.txt"))?;
        write(source.join("link.txt"), "now a file")?;

        let report = sync(&source, &generation, &mut journal)?;
        assert!(report.copied.contains(&PathBuf::from("link.txt")));

        let backup_link = generation.join("link.txt");
        assert!(backup_link.symlink_metadata()?.is_file());
        assert_eq!(read_to_string(&backup_link)?, "now a file");
        assert_eq!(read_to_string(generation.join("real.txt"))?, "alpha");

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn kind_change_triggers_copy_despite_matching_size_and_mtime() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("source");
        let generation = temp.path().join("backup_2026-08-26");
        create_dir_all(&source)?;
        // Symlink whose target path length matches the replacement file's
        // size, so neither the size nor the mtime criterion can fire.
        std::os::unix::fs::symlink("real.txt", source.join("entry"))?;

        let mut journal = journal_in(temp.path());
        sync(&source, &generation, &mut journal)?;

        fs::remove_file(source.join("entry"))?;
        write(source.join("entry"), "12345678")?;
        set_mtime(
            &source.join("entry"),
            SystemTime::now() - Duration::from_secs(3600),
        );

        let report = sync(&source, &generation, &mut journal)?;
        assert_eq!(report.copied, vec![PathBuf::from("entry")]);
        assert!(generation.join("entry").symlink_metadata()?.is_file());
        assert_eq!(read_to_string(generation.join("entry"))?, "12345678");

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_recreated_not_followed() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("source");
        let generation = temp.path().join("backup_2026-08-26");
        create_dir_all(&source)?;
        write(source.join("real.txt"), "alpha")?;
        std::os::unix::fs::symlink("real.txt", source.join("link.txt"))?;

        let mut journal = journal_in(temp.path());
        sync(&source, &generation, &mut journal)?;

        let backup_link = generation.join("link.txt");
        assert!(backup_link.symlink_metadata()?.is_symlink());
        assert_eq!(fs::read_link(&backup_link)?, PathBuf::from("real.txt"));

        Ok(())
    }
}
