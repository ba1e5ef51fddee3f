// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use datemirror::{
    config::SyncConfig,
    engine::Engine,
    lock::RunLock,
    path::{default_config_path, default_lock_path},
};

use anyhow::Result;
use clap::Parser;
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "datemirror [source_override] [dest_override]",
    version
)]
struct Cli {
    /// Back up this directory instead of the configured source, this run only.
    #[arg(value_name = "source_override", requires = "dest_override")]
    pub source_override: Option<PathBuf>,

    /// Place backups here instead of the configured destination, this run only.
    #[arg(value_name = "dest_override")]
    pub dest_override: Option<PathBuf>,
}

impl Cli {
    fn run(self) -> Result<()> {
        // INVARIANT: Lock before anything else. Contention must abort with
        // zero side effects under the destination root.
        let _lock = RunLock::try_acquire(default_lock_path()?)?;

        let config = SyncConfig::resolve(
            default_config_path()?,
            self.source_override,
            self.dest_override,
        )?;

        let summary = Engine::new(config).run()?;
        info!(
            "done: {} copied, {} unchanged, {} stale removed",
            summary.sync.copied.len(),
            summary.sync.unchanged.len(),
            summary.cleanup.removed.len(),
        );

        Ok(())
    }
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}
