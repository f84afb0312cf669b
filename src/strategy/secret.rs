use super::{ApplyStrategy, DeleteStrategy, DiffStrategy, EditStrategy, Parser, RemoteValue};
use crate::error::{RemoteError, StageError, StageResult};
use crate::models::{DeleteOptions, Service};
use crate::remote::{SecretApi, SecretRecord};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;

const MAX_NAME_LEN: usize = 512;
const MAX_VALUE_LEN: usize = 65536;
const RECOVERY_WINDOW_DAYS: RangeInclusive<u32> = 7..=30;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9/_+=.@\-]+$").expect("static pattern"));

/// Strategy for opaque, ARN-addressed secrets
pub struct SecretStrategy {
    api: Arc<dyn SecretApi>,
}

impl SecretStrategy {
    pub fn new(api: Arc<dyn SecretApi>) -> Self {
        Self { api }
    }
}

fn to_remote_value(record: SecretRecord) -> RemoteValue {
    RemoteValue {
        name: record.name,
        value: record.value,
        version: record.version_id,
        arn: Some(record.arn),
        last_modified: Some(record.last_modified),
        tags: record.tags,
    }
}

impl Parser for SecretStrategy {
    fn service(&self) -> Service {
        Service::Secret
    }

    fn parse_name(&self, raw: &str) -> StageResult<String> {
        let name = raw.trim();
        let invalid = |reason: &str| StageError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(invalid("name is too long"));
        }
        if !NAME_PATTERN.is_match(name) {
            return Err(invalid("allowed characters are a-z A-Z 0-9 / _ + = . @ -"));
        }
        Ok(name.to_string())
    }
}

#[async_trait]
impl DiffStrategy for SecretStrategy {
    async fn fetch_current(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> StageResult<Option<RemoteValue>> {
        match self.api.get_secret(cancel, name).await {
            Ok(record) => Ok(Some(to_remote_value(record))),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(RemoteError::Cancelled) => Err(StageError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl EditStrategy for SecretStrategy {
    fn validate_value(&self, name: &str, value: &str) -> StageResult<()> {
        if value.is_empty() {
            return Err(StageError::InvalidOperation(format!(
                "secret '{}' cannot have an empty value",
                name
            )));
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(StageError::InvalidOperation(format!(
                "secret '{}' value exceeds {} bytes",
                name, MAX_VALUE_LEN
            )));
        }
        Ok(())
    }

    async fn fetch_version(
        &self,
        cancel: &CancellationToken,
        name: &str,
        version: &str,
    ) -> StageResult<RemoteValue> {
        match self.api.get_secret_version(cancel, name, version).await {
            Ok(record) => Ok(to_remote_value(record)),
            Err(RemoteError::NotFound(_)) => Err(StageError::NotFound {
                service: Service::Secret,
                name: name.to_string(),
            }),
            Err(RemoteError::Cancelled) => Err(StageError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }
}

impl DeleteStrategy for SecretStrategy {
    fn delete_options(
        &self,
        force: bool,
        recovery_window_days: Option<u32>,
    ) -> StageResult<DeleteOptions> {
        match (force, recovery_window_days) {
            (true, Some(_)) => Err(StageError::InvalidDeleteOptions(
                "--force cannot be combined with a recovery window".to_string(),
            )),
            (false, Some(days)) if !RECOVERY_WINDOW_DAYS.contains(&days) => {
                Err(StageError::InvalidDeleteOptions(format!(
                    "recovery window must be between {} and {} days, got {}",
                    RECOVERY_WINDOW_DAYS.start(),
                    RECOVERY_WINDOW_DAYS.end(),
                    days
                )))
            }
            _ => Ok(DeleteOptions {
                force,
                recovery_window_days,
            }),
        }
    }
}

#[async_trait]
impl ApplyStrategy for SecretStrategy {
    async fn create(
        &self,
        cancel: &CancellationToken,
        name: &str,
        value: &str,
        description: Option<&str>,
    ) -> StageResult<()> {
        self.api
            .create_secret(cancel, name, value, description)
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        cancel: &CancellationToken,
        name: &str,
        value: &str,
        description: Option<&str>,
    ) -> StageResult<()> {
        // The value write moves last_modified; it must be the final call so a
        // failed description update leaves the remote untouched for a retry.
        if let Some(description) = description {
            self.api
                .update_secret_description(cancel, name, description)
                .await?;
        }
        self.api.put_secret_value(cancel, name, value).await?;
        Ok(())
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        name: &str,
        options: &DeleteOptions,
    ) -> StageResult<()> {
        self.api
            .delete_secret(cancel, name, options.force, options.recovery_window_days)
            .await?;
        Ok(())
    }

    async fn add_tags(
        &self,
        cancel: &CancellationToken,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> StageResult<()> {
        self.api.tag_secret(cancel, name, tags).await?;
        Ok(())
    }

    async fn remove_tags(
        &self,
        cancel: &CancellationToken,
        name: &str,
        keys: &BTreeSet<String>,
    ) -> StageResult<()> {
        self.api.untag_secret(cancel, name, keys).await?;
        Ok(())
    }
}
