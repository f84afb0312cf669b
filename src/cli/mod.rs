//! Command-line front-end
//!
//! Staging commands work on the file store of the configured scope, so state
//! survives between invocations. Remote lookups go through the local emulator
//! at `remote.emulator_path`.

pub mod apply;
pub mod diff;
pub mod reset;
pub mod serve;
pub mod stage;
pub mod status;
pub mod tag;

use crate::config::StageConfig;
use crate::models::Service;
use crate::remote::LocalRemote;
use crate::store::FileStore;
use crate::strategy::{ServiceStrategy, StrategyFactory};
use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a staging command needs
pub struct CliContext {
    pub config: StageConfig,
    pub store: FileStore,
    pub factory: StrategyFactory,
    pub cancel: CancellationToken,
}

impl CliContext {
    pub fn load() -> Result<Self> {
        let config = StageConfig::load()?;
        Self::with_config(config)
    }

    pub fn with_config(config: StageConfig) -> Result<Self> {
        let emulator = config.emulator_path();
        let remote = LocalRemote::open(&emulator)
            .with_context(|| format!("Failed to open remote emulator at {}", emulator.display()))?;
        Ok(Self {
            store: config.file_store()?,
            factory: StrategyFactory::from_remote(Arc::new(remote)),
            cancel: CancellationToken::new(),
            config,
        })
    }

    pub fn strategy(&self, service: Service) -> Box<dyn ServiceStrategy> {
        self.factory.create(service)
    }

    /// Cancel the context's token on Ctrl+C
    pub fn cancel_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "Interrupted; finishing the current item...".yellow());
                cancel.cancel();
            }
        });
    }
}

/// Ask before a destructive step unless `yes` was given
pub fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    let answer = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;
    Ok(answer)
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Shorten long values for one-line display
pub fn truncate(value: &str, max: usize) -> String {
    let mut chars = value.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
