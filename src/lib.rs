// Paramstage - Staging engine for cloud parameters and secrets
// Record pending changes offline, review them against the remote, then apply

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod server;
pub mod services;
pub mod store;
pub mod strategy;

pub use anyhow::{Context, Result};
pub use colored::Colorize;

// Re-export commonly used types
pub use error::{RemoteError, StageError, StageResult};
pub use models::{DeleteOptions, Entry, Operation, Scope, Service, State, TagEntry};
pub use store::{AgentRegistry, FileStore, MemoryStore, StageStore};
pub use strategy::{ServiceStrategy, StrategyFactory};
