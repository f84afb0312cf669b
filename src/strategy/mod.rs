//! Per-service strategies
//!
//! The staging engine is identical for parameters and secrets; everything that
//! differs between the two resource kinds sits behind these capability sets:
//! - [`Parser`]: name validation and `name#version` specs
//! - [`DiffStrategy`]: fetch the current remote value for comparison
//! - [`EditStrategy`]: stage-time checks and version lookups
//! - [`DeleteStrategy`]: delete-time parameters
//! - [`ApplyStrategy`]: push staged changes to the remote API
//!
//! [`ServiceStrategy`] bundles all five; [`StrategyFactory`] builds one per service.

pub mod factory;
pub mod param;
pub mod secret;

pub use factory::StrategyFactory;
pub use param::ParamStrategy;
pub use secret::SecretStrategy;

use crate::error::StageResult;
use crate::models::{DeleteOptions, Service};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;

/// Remote item in the uniform shape the engine compares against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteValue {
    pub name: String,
    pub value: String,
    /// Parameter version number or secret version id
    pub version: String,
    /// Secrets only
    pub arn: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub tags: BTreeMap<String, String>,
}

impl RemoteValue {
    /// Human-readable identifier: `#<version>` or `<arn>#<version>`
    pub fn identifier(&self) -> String {
        match &self.arn {
            Some(arn) => format!("{}#{}", arn, self.version),
            None => format!("#{}", self.version),
        }
    }

    /// Whether the remote changed after `base` (the time a change was staged against)
    pub fn modified_since(&self, base: Option<DateTime<Utc>>) -> bool {
        match (self.last_modified, base) {
            (Some(modified), Some(base)) => modified > base,
            _ => false,
        }
    }
}

pub trait Parser: Send + Sync {
    fn service(&self) -> Service;

    /// Validate and normalize an item name
    fn parse_name(&self, raw: &str) -> StageResult<String>;

    /// Split `name#version` into its parts; the version is optional
    fn parse_spec(&self, raw: &str) -> StageResult<(String, Option<String>)> {
        match raw.rsplit_once('#') {
            Some((name, version)) if !version.is_empty() => {
                Ok((self.parse_name(name)?, Some(version.to_string())))
            }
            _ => Ok((self.parse_name(raw)?, None)),
        }
    }
}

#[async_trait]
pub trait DiffStrategy: Send + Sync {
    /// Current remote value, or `None` if the item does not exist
    async fn fetch_current(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> StageResult<Option<RemoteValue>>;
}

#[async_trait]
pub trait EditStrategy: DiffStrategy {
    /// Reject values the remote service would refuse
    fn validate_value(&self, name: &str, value: &str) -> StageResult<()>;

    /// A specific remote version of an item
    async fn fetch_version(
        &self,
        cancel: &CancellationToken,
        name: &str,
        version: &str,
    ) -> StageResult<RemoteValue>;
}

pub trait DeleteStrategy: Send + Sync {
    /// Build delete options from caller flags, rejecting what this service
    /// does not support
    fn delete_options(
        &self,
        force: bool,
        recovery_window_days: Option<u32>,
    ) -> StageResult<DeleteOptions>;
}

#[async_trait]
pub trait ApplyStrategy: Send + Sync {
    async fn create(
        &self,
        cancel: &CancellationToken,
        name: &str,
        value: &str,
        description: Option<&str>,
    ) -> StageResult<()>;

    async fn update(
        &self,
        cancel: &CancellationToken,
        name: &str,
        value: &str,
        description: Option<&str>,
    ) -> StageResult<()>;

    async fn delete(
        &self,
        cancel: &CancellationToken,
        name: &str,
        options: &DeleteOptions,
    ) -> StageResult<()>;

    async fn add_tags(
        &self,
        cancel: &CancellationToken,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> StageResult<()>;

    async fn remove_tags(
        &self,
        cancel: &CancellationToken,
        name: &str,
        keys: &BTreeSet<String>,
    ) -> StageResult<()>;
}

/// Everything the use-case layer needs from one resource kind
pub trait ServiceStrategy:
    Parser + DiffStrategy + EditStrategy + DeleteStrategy + ApplyStrategy
{
}

impl<T> ServiceStrategy for T where
    T: Parser + DiffStrategy + EditStrategy + DeleteStrategy + ApplyStrategy
{
}
