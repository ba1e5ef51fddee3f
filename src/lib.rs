// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Incremental dated directory backups.
//!
//! Datemirror mirrors a source tree into dated __generation__ directories
//! under a backup destination, one generation per day. Each run copies new
//! and changed entries into the current generation, removes entries whose
//! source counterpart vanished, prunes directories left empty by that
//! removal, and finally trims the oldest generations beyond a retention
//! bound.
//!
//! # Generations
//!
//! A generation is a directory named `backup_<YYYY-MM-DD>` under the
//! destination root. Running datemirror twice on the same day refreshes the
//! same generation instead of creating a second one, so the tool is safe to
//! fire from cron at any frequency.
//!
//! # Git Awareness
//!
//! Working copies of version-controlled projects are never backed up. Any
//! directory whose immediate children include `.git` is skipped wholesale,
//! at every depth of the walk, so a repository buried several levels deep is
//! pruned as soon as it is reached.
//!
//! # Exclusive Runs
//!
//! Overlapping invocations (two cron firings racing) are prevented with a
//! pid-carrying lock file. See [`lock::RunLock`].

pub mod config;
pub mod engine;
pub mod journal;
pub mod lock;
pub mod path;
