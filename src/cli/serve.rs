use crate::config::StageConfig;
use crate::remote::LocalRemote;
use crate::server;
use crate::strategy::StrategyFactory;
use anyhow::{Context, Result};
use std::sync::Arc;

pub async fn run(config: StageConfig, port: Option<u16>) -> Result<()> {
    let mut config = config;
    if let Some(port) = port {
        config.server.port = port;
    }
    let emulator = config.emulator_path();
    let remote = LocalRemote::open(&emulator)
        .with_context(|| format!("Failed to open remote emulator at {}", emulator.display()))?;
    let factory = StrategyFactory::from_remote(Arc::new(remote));
    server::start_server(&config, factory).await
}
