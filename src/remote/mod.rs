//! Remote resource API boundary
//!
//! The staging engine never talks to the cloud directly. Strategies call these
//! traits; a deployment wires in a real client, and [`LocalRemote`] emulates
//! both services in-process.

pub mod local;

pub use local::LocalRemote;

use crate::error::RemoteError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Current state of a parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub name: String,
    pub value: String,
    pub version: i64,
    pub param_type: String,
    pub description: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
}

/// Current state of a secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub name: String,
    pub arn: String,
    pub value: String,
    pub version_id: String,
    pub description: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
}

#[async_trait]
pub trait ParameterApi: Send + Sync {
    async fn get_parameter(&self, cancel: &CancellationToken, name: &str)
        -> RemoteResult<ParameterRecord>;

    async fn get_parameter_version(
        &self,
        cancel: &CancellationToken,
        name: &str,
        version: i64,
    ) -> RemoteResult<ParameterRecord>;

    /// Write a value; without `overwrite` an existing parameter is an error.
    /// Returns the new version.
    async fn put_parameter(
        &self,
        cancel: &CancellationToken,
        name: &str,
        value: &str,
        description: Option<&str>,
        overwrite: bool,
    ) -> RemoteResult<i64>;

    async fn delete_parameter(&self, cancel: &CancellationToken, name: &str) -> RemoteResult<()>;

    async fn add_tags_to_parameter(
        &self,
        cancel: &CancellationToken,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> RemoteResult<()>;

    async fn remove_tags_from_parameter(
        &self,
        cancel: &CancellationToken,
        name: &str,
        keys: &BTreeSet<String>,
    ) -> RemoteResult<()>;
}

#[async_trait]
pub trait SecretApi: Send + Sync {
    async fn get_secret(&self, cancel: &CancellationToken, name: &str) -> RemoteResult<SecretRecord>;

    async fn get_secret_version(
        &self,
        cancel: &CancellationToken,
        name: &str,
        version_id: &str,
    ) -> RemoteResult<SecretRecord>;

    async fn create_secret(
        &self,
        cancel: &CancellationToken,
        name: &str,
        value: &str,
        description: Option<&str>,
    ) -> RemoteResult<SecretRecord>;

    /// Store a new value version; returns the version id
    async fn put_secret_value(
        &self,
        cancel: &CancellationToken,
        name: &str,
        value: &str,
    ) -> RemoteResult<String>;

    async fn update_secret_description(
        &self,
        cancel: &CancellationToken,
        name: &str,
        description: &str,
    ) -> RemoteResult<()>;

    async fn delete_secret(
        &self,
        cancel: &CancellationToken,
        name: &str,
        force: bool,
        recovery_window_days: Option<u32>,
    ) -> RemoteResult<()>;

    async fn tag_secret(
        &self,
        cancel: &CancellationToken,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> RemoteResult<()>;

    async fn untag_secret(
        &self,
        cancel: &CancellationToken,
        name: &str,
        keys: &BTreeSet<String>,
    ) -> RemoteResult<()>;
}
