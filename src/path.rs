// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::path::PathBuf;

/// Determine default absolute path to persisted configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/datemirror/config.toml` as
/// the default absolute path. Does not check if the path returned actually
/// exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("datemirror").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to run lock file.
///
/// Prefers `$XDG_RUNTIME_DIR/datemirror.lock`, falling back to the
/// configuration directory when no runtime directory is available. Does not
/// check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_lock_path() -> Result<PathBuf> {
    if let Some(runtime) = dirs::runtime_dir() {
        return Ok(runtime.join("datemirror.lock"));
    }

    dirs::config_dir()
        .map(|path| path.join("datemirror").join("datemirror.lock"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
