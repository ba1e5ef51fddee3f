// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sync engine orchestration.
//!
//! One run of the engine is a strictly sequential pipeline over the
//! filesystem: open the bounded journal under the destination, stamp a
//! start banner, create or reuse today's generation directory, mirror the
//! source into it, clean stale entries out of it, enforce the retention
//! bound across all generations, and stamp the end banner.
//!
//! # Ordering
//!
//! Cleanup runs only after the mirror walk completed for the same
//! generation, because it compares backup entries against current source
//! state. Retention runs last, after the current generation is populated,
//! so a run never deletes the generation it just produced unless the bound
//! is zero.
//!
//! # Failure
//!
//! There are no retries. The first fatal filesystem error aborts the whole
//! run, leaving the partially written generation in place for operator
//! inspection. Lock release is the caller's concern and happens on every
//! exit path regardless.

pub mod cleanup;
pub mod retention;
pub mod walker;

use crate::{
    config::SyncConfig,
    engine::{
        cleanup::CleanupReport,
        retention::GENERATION_PREFIX,
        walker::SyncReport,
    },
    journal::Journal,
};

use chrono::Local;
use std::path::PathBuf;
use tracing::{info, instrument};

/// File name of the run journal under the destination root.
pub const JOURNAL_NAME: &str = "sync.log";

/// Bounds a run operates under.
///
/// Ambient constants modeled as an injected value so tests can pin a
/// temporary root with bounds of their own choosing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of generations kept under the destination root.
    pub max_backups: usize,

    /// Journal size that triggers rotation.
    pub max_log_size: u64,

    /// Journal size rotation cuts down to.
    pub target_log_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_backups: 7,
            max_log_size: 1 << 20,
            target_log_size: 1 << 19,
        }
    }
}

/// What one run did, for logging and assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Generation directory this run populated.
    pub generation: PathBuf,

    /// Per-entry actions of the mirror walk.
    pub sync: SyncReport,

    /// Per-entry actions of the cleanup walk.
    pub cleanup: CleanupReport,

    /// Generations retired by retention, oldest first.
    pub retired: Vec<PathBuf>,
}

/// One-shot sync engine over a resolved configuration.
#[derive(Debug)]
pub struct Engine {
    config: SyncConfig,
    limits: Limits,
}

impl Engine {
    /// Construct engine with default limits.
    pub fn new(config: SyncConfig) -> Self {
        Self::with_limits(config, Limits::default())
    }

    /// Construct engine with caller-supplied limits.
    pub fn with_limits(config: SyncConfig, limits: Limits) -> Self {
        Self { config, limits }
    }

    /// Perform one full sync run.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError`] on the first fatal filesystem failure of
    ///   any stage.
    #[instrument(skip(self), level = "debug")]
    pub fn run(&self) -> Result<RunSummary> {
        let mut journal = Journal::open(
            self.config.destination.join(JOURNAL_NAME),
            self.limits.max_log_size,
            self.limits.target_log_size,
        )?;
        journal.start_banner(&self.config.source, &self.config.destination)?;

        // INVARIANT: One generation per day. A same-day rerun lands in the
        // same directory and refreshes it in place.
        let generation_name = format!(
            "{GENERATION_PREFIX}{}",
            Local::now().format("%Y-%m-%d")
        );
        let generation = self.config.destination.join(&generation_name);
        journal.append(format!("generation: {generation_name}"))?;
        info!(
            "sync {:?} into {:?}",
            self.config.source.display(),
            generation.display()
        );

        let sync = walker::sync(&self.config.source, &generation, &mut journal)?;
        let cleanup = cleanup::cleanup(&generation, &self.config.source, &mut journal)?;
        let retired = retention::enforce(
            &self.config.destination,
            self.limits.max_backups,
            &mut journal,
        )?;

        journal.append(format!(
            "summary: {} copied, {} unchanged, {} vcs trees skipped, {} stale removed, {} generations retired",
            sync.copied.len(),
            sync.unchanged.len(),
            sync.vcs_skipped.len(),
            cleanup.removed.len(),
            retired.len(),
        ))?;
        journal.end_banner()?;

        Ok(RunSummary {
            generation,
            sync,
            cleanup,
            retired,
        })
    }
}

/// Engine error types.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Journal handling fails.
    #[error(transparent)]
    Journal(#[from] crate::journal::JournalError),

    /// Mirror walk fails.
    #[error(transparent)]
    Walk(#[from] walker::WalkError),

    /// Cleanup walk fails.
    #[error(transparent)]
    Cleanup(#[from] cleanup::CleanupError),

    /// Retention enforcement fails.
    #[error(transparent)]
    Retention(#[from] retention::RetentionError),
}

/// Friendly result alias :3
type Result<T, E = EngineError> = std::result::Result<T, E>;
