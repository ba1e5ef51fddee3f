// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run journal management.
//!
//! Every run appends free-text lines to a single journal file under the
//! backup destination, sectioned by start and end banners carrying a
//! timestamp and the resolved source/destination. The journal exists for
//! operator review after the fact, since the tool runs unattended; nothing
//! in it is machine-parseable by contract.
//!
//! # Rotation
//!
//! The journal is bounded: before a run appends anything, a file grown past
//! the configured maximum is cut down to its trailing target bytes. The cut
//! is byte-boundary, so the oldest surviving line may be partial. Everything
//! after rotation is appended write-through, never buffered for the whole
//! run, so a crash mid-run still leaves the lines written so far.

use chrono::Local;
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Append-only bounded journal of sync runs.
#[derive(Debug)]
pub struct Journal {
    file: File,
    journal_path: PathBuf,
}

impl Journal {
    /// Open the journal for appending, rotating first when oversized.
    ///
    /// # Errors
    ///
    /// - Return [`JournalError::Rotate`] if an oversized journal cannot be
    ///   truncated to its trailing bytes.
    /// - Return [`JournalError::Open`] if the journal cannot be opened for
    ///   appending.
    pub fn open(
        journal_path: impl Into<PathBuf>,
        max_size: u64,
        target_size: u64,
    ) -> Result<Self> {
        let journal_path = journal_path.into();
        rotate(&journal_path, max_size, target_size)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .map_err(|err| JournalError::Open {
                source: err,
                journal_path: journal_path.clone(),
            })?;

        Ok(Self {
            file,
            journal_path,
        })
    }

    /// Append one line, written through immediately.
    ///
    /// # Errors
    ///
    /// - Return [`JournalError::Append`] if the line cannot be written.
    pub fn append(&mut self, line: impl AsRef<str>) -> Result<()> {
        writeln!(self.file, "{}", line.as_ref()).map_err(|err| JournalError::Append {
            source: err,
            journal_path: self.journal_path.clone(),
        })?;
        self.file.flush().map_err(|err| JournalError::Append {
            source: err,
            journal_path: self.journal_path.clone(),
        })?;

        Ok(())
    }

    /// Append the start banner of a run section.
    ///
    /// # Errors
    ///
    /// - Return [`JournalError::Append`] if the banner cannot be written.
    pub fn start_banner(&mut self, source: &Path, destination: &Path) -> Result<()> {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        self.append(format!("==== sync started {stamp} ===="))?;
        self.append(format!("source: {}", source.display()))?;
        self.append(format!("destination: {}", destination.display()))?;

        Ok(())
    }

    /// Append the end banner of a run section.
    ///
    /// # Errors
    ///
    /// - Return [`JournalError::Append`] if the banner cannot be written.
    pub fn end_banner(&mut self) -> Result<()> {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        self.append(format!("==== sync finished {stamp} ===="))
    }
}

/// Cut an oversized journal down to its trailing bytes.
///
/// A journal at or under `max_size` is left untouched. Anything larger keeps
/// only the last `target_size` bytes, discarding the earliest-appended
/// portion.
fn rotate(journal_path: &Path, max_size: u64, target_size: u64) -> Result<()> {
    let size = match fs::metadata(journal_path) {
        Ok(metadata) => metadata.len(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(JournalError::Rotate {
                source: err,
                journal_path: journal_path.to_path_buf(),
            })
        }
    };

    if size <= max_size {
        debug!("journal at {size} bytes, under bound, no rotation");
        return Ok(());
    }

    info!("rotating journal from {size} down to {target_size} bytes");
    let contents = fs::read(journal_path).map_err(|err| JournalError::Rotate {
        source: err,
        journal_path: journal_path.to_path_buf(),
    })?;
    let keep_from = contents.len().saturating_sub(target_size as usize);
    fs::write(journal_path, &contents[keep_from..]).map_err(|err| JournalError::Rotate {
        source: err,
        journal_path: journal_path.to_path_buf(),
    })?;

    Ok(())
}

/// Journal error types.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Oversized journal cannot be truncated.
    #[error("failed to rotate journal at {:?}", journal_path.display())]
    Rotate {
        #[source]
        source: std::io::Error,
        journal_path: PathBuf,
    },

    /// Journal cannot be opened for appending.
    #[error("failed to open journal at {:?}", journal_path.display())]
    Open {
        #[source]
        source: std::io::Error,
        journal_path: PathBuf,
    },

    /// Journal cannot be appended to.
    #[error("failed to append to journal at {:?}", journal_path.display())]
    Append {
        #[source]
        source: std::io::Error,
        journal_path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = JournalError> = std::result::Result<T, E>;
