// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the persisted configuration file that datemirror
//! uses to remember which tree to mirror and where to mirror it to. The file
//! holds exactly two path-valued keys as plain `key = "value"` assignment
//! lines, machine-written and machine-read.
//!
//! # Resolution
//!
//! Configuration is resolved once per run and stays immutable afterwards. A
//! missing configuration file triggers an interactive first-run prompt whose
//! answers are persisted for every later run. Positional command-line
//! overrides replace the source and/or destination _for the current run
//! only_; the persisted file is never rewritten by an override.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info};

/// Resolved source and destination of one sync run.
///
/// Both paths are absolute and canonical once [`SyncConfig::resolve`]
/// returns. The source must name an existing directory; the destination is
/// created when absent.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Root of the tree to back up.
    pub source: PathBuf,

    /// Root under which backup generations are kept.
    pub destination: PathBuf,
}

impl SyncConfig {
    /// Resolve configuration for the current run.
    ///
    /// Loads the persisted configuration file if it exists. Otherwise
    /// prompts interactively for both paths, re-prompting on empty input,
    /// and persists the answers. Positional overrides then replace the
    /// source and/or destination for this run only. Paths are canonicalized
    /// after any override.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingSource`] if the source directory does
    ///   not exist.
    /// - Return [`ConfigError::CreateDestination`] if the destination
    ///   directory cannot be created.
    /// - Return [`ConfigError::Prompt`] if interactive input fails, e.g.,
    ///   when running unattended without a terminal.
    pub fn resolve(
        config_path: impl AsRef<Path>,
        source_override: Option<PathBuf>,
        dest_override: Option<PathBuf>,
    ) -> Result<Self> {
        let config_path = config_path.as_ref();
        let mut config = if config_path.exists() {
            debug!("load configuration from {:?}", config_path.display());
            fs::read_to_string(config_path)
                .map_err(|err| ConfigError::Read {
                    source: err,
                    path: config_path.to_path_buf(),
                })?
                .parse::<SyncConfig>()?
        } else {
            let config = Self::prompt_new()?;
            config.persist(config_path)?;
            config
        };

        // INVARIANT: Overrides apply to this run only. Never write them back.
        if let Some(source) = source_override {
            config.source = source;
        }
        if let Some(destination) = dest_override {
            config.destination = destination;
        }

        config.canonicalize()
    }

    /// Ask the user for both paths on first run.
    fn prompt_new() -> Result<Self> {
        info!("no configuration found, asking for one");
        let source = prompt_path("source directory to back up")?;
        let destination = prompt_path("destination directory for backups")?;

        Ok(Self {
            source,
            destination,
        })
    }

    /// Write configuration to its persisted location.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Write`] if the file or its parent directory
    ///   cannot be created.
    pub fn persist(&self, config_path: impl AsRef<Path>) -> Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|err| ConfigError::Write {
                source: err,
                path: config_path.to_path_buf(),
            })?;
        }

        let contents = toml::ser::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(config_path, contents).map_err(|err| ConfigError::Write {
            source: err,
            path: config_path.to_path_buf(),
        })?;
        info!("configuration saved to {:?}", config_path.display());

        Ok(())
    }

    /// Validate both paths and pin them down to canonical absolute form.
    fn canonicalize(self) -> Result<Self> {
        if !self.source.is_dir() {
            return Err(ConfigError::MissingSource { path: self.source });
        }
        let source = self.source.canonicalize().map_err(|err| ConfigError::Canonicalize {
            source: err,
            path: self.source.clone(),
        })?;

        fs::create_dir_all(&self.destination).map_err(|err| ConfigError::CreateDestination {
            source: err,
            path: self.destination.clone(),
        })?;
        let destination =
            self.destination
                .canonicalize()
                .map_err(|err| ConfigError::Canonicalize {
                    source: err,
                    path: self.destination.clone(),
                })?;

        Ok(Self {
            source,
            destination,
        })
    }
}

impl FromStr for SyncConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let config: SyncConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on both path fields.
        Ok(Self {
            source: expand_path(&config.source)?,
            destination: expand_path(&config.destination)?,
        })
    }
}

impl Display for SyncConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Prompt for one path, refusing empty input.
fn prompt_path(label: &str) -> Result<PathBuf> {
    loop {
        let answer = inquire::Text::new(label)
            .prompt()
            .map_err(ConfigError::Prompt)?;
        if answer.trim().is_empty() {
            continue;
        }

        return expand_path(answer.trim());
    }
}

/// Expand `~` and environment variables inside a path.
fn expand_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let lossy = path.as_ref().to_string_lossy();
    let expanded = shellexpand::full(lossy.as_ref()).map_err(ConfigError::ShellExpansion)?;

    Ok(PathBuf::from(expanded.into_owned()))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to obtain interactive input.
    #[error(transparent)]
    Prompt(#[from] inquire::InquireError),

    /// Configuration file cannot be read from.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file cannot be written to.
    #[error("failed to write configuration at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Source directory does not exist.
    #[error("source directory {:?} does not exist", path.display())]
    MissingSource { path: PathBuf },

    /// Destination directory cannot be created.
    #[error("failed to create destination directory {:?}", path.display())]
    CreateDestination {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Path cannot be made canonical.
    #[error("failed to canonicalize {:?}", path.display())]
    Canonicalize {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("STUFF", "/home/blah/stuff")])]
    fn deserialize_sync_config() -> anyhow::Result<()> {
        let result: SyncConfig = r#"
            source = "$STUFF"
            destination = "/mnt/backups"
        "#
        .parse()?;

        let expect = SyncConfig {
            source: "/home/blah/stuff".into(),
            destination: "/mnt/backups".into(),
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_sync_config() {
        let result = SyncConfig {
            source: "/home/blah/stuff".into(),
            destination: "/mnt/backups".into(),
        }
        .to_string();

        let expect = indoc! {r#"
            source = "/home/blah/stuff"
            destination = "/mnt/backups"
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn resolve_loads_persisted_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("stuff");
        let destination = temp.path().join("backups");
        std::fs::create_dir(&source)?;

        let config_path = temp.path().join("config.toml");
        SyncConfig {
            source: source.clone(),
            destination: destination.clone(),
        }
        .persist(&config_path)?;

        let result = SyncConfig::resolve(&config_path, None, None)?;
        assert_eq!(result.source, source.canonicalize()?);
        assert_eq!(result.destination, destination.canonicalize()?);

        Ok(())
    }

    #[test]
    fn resolve_overrides_do_not_rewrite_persisted_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("stuff");
        let other_source = temp.path().join("other");
        std::fs::create_dir(&source)?;
        std::fs::create_dir(&other_source)?;

        let config_path = temp.path().join("config.toml");
        let persisted = SyncConfig {
            source: source.clone(),
            destination: temp.path().join("backups"),
        };
        persisted.persist(&config_path)?;
        let before = std::fs::read_to_string(&config_path)?;

        let result = SyncConfig::resolve(&config_path, Some(other_source.clone()), None)?;
        assert_eq!(result.source, other_source.canonicalize()?);

        let after = std::fs::read_to_string(&config_path)?;
        assert_eq!(before, after);

        Ok(())
    }

    #[test]
    fn resolve_rejects_missing_source() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config_path = temp.path().join("config.toml");
        SyncConfig {
            source: temp.path().join("nope"),
            destination: temp.path().join("backups"),
        }
        .persist(&config_path)?;

        let result = SyncConfig::resolve(&config_path, None, None);
        assert!(matches!(result, Err(ConfigError::MissingSource { .. })));

        Ok(())
    }
}
