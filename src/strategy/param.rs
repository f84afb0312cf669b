use super::{ApplyStrategy, DeleteStrategy, DiffStrategy, EditStrategy, Parser, RemoteValue};
use crate::error::{RemoteError, StageError, StageResult};
use crate::models::{DeleteOptions, Service};
use crate::remote::{ParameterApi, ParameterRecord};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;

const MAX_NAME_LEN: usize = 2048;
const MAX_VALUE_LEN: usize = 4096;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-/]+$").expect("static pattern"));

/// Strategy for versioned, typed key/value parameters
pub struct ParamStrategy {
    api: Arc<dyn ParameterApi>,
}

impl ParamStrategy {
    pub fn new(api: Arc<dyn ParameterApi>) -> Self {
        Self { api }
    }
}

fn to_remote_value(record: ParameterRecord) -> RemoteValue {
    RemoteValue {
        name: record.name,
        value: record.value,
        version: record.version.to_string(),
        arn: None,
        last_modified: Some(record.last_modified),
        tags: record.tags,
    }
}

impl Parser for ParamStrategy {
    fn service(&self) -> Service {
        Service::Parameter
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
            return Err(invalid("allowed characters are a-z A-Z 0-9 _ . - /"));
        }
        if name.contains('/') && !name.starts_with('/') {
            return Err(invalid("hierarchical names must start with '/'"));
        }
        if name.contains("//") || (name.len() > 1 && name.ends_with('/')) {
            return Err(invalid("empty path segment"));
        }
        let lower = name.trim_start_matches('/').to_ascii_lowercase();
        if lower.starts_with("aws") || lower.starts_with("ssm") {
            return Err(invalid("names may not start with 'aws' or 'ssm'"));
        }
        Ok(name.to_string())
    }
}

#[async_trait]
impl DiffStrategy for ParamStrategy {
    async fn fetch_current(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> StageResult<Option<RemoteValue>> {
        match self.api.get_parameter(cancel, name).await {
            Ok(record) => Ok(Some(to_remote_value(record))),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(RemoteError::Cancelled) => Err(StageError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl EditStrategy for ParamStrategy {
    fn validate_value(&self, name: &str, value: &str) -> StageResult<()> {
        if value.is_empty() {
            return Err(StageError::InvalidOperation(format!(
                "parameter '{}' cannot have an empty value",
                name
            )));
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(StageError::InvalidOperation(format!(
                "parameter '{}' value exceeds {} bytes",
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
        let number: i64 = version.parse().map_err(|_| StageError::InvalidName {
            name: format!("{}#{}", name, version),
            reason: "parameter versions are positive integers".to_string(),
        })?;
        match self.api.get_parameter_version(cancel, name, number).await {
            Ok(record) => Ok(to_remote_value(record)),
            Err(RemoteError::NotFound(_)) => Err(StageError::NotFound {
                service: Service::Parameter,
                name: name.to_string(),
            }),
            Err(RemoteError::Cancelled) => Err(StageError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }
}

impl DeleteStrategy for ParamStrategy {
    fn delete_options(
        &self,
        force: bool,
        recovery_window_days: Option<u32>,
    ) -> StageResult<DeleteOptions> {
        if force || recovery_window_days.is_some() {
            return Err(StageError::InvalidDeleteOptions(
                "parameters do not support --force or a recovery window".to_string(),
            ));
        }
        Ok(DeleteOptions::default())
    }
}

#[async_trait]
impl ApplyStrategy for ParamStrategy {
    async fn create(
        &self,
        cancel: &CancellationToken,
        name: &str,
        value: &str,
        description: Option<&str>,
    ) -> StageResult<()> {
        self.api
            .put_parameter(cancel, name, value, description, false)
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
        self.api
            .put_parameter(cancel, name, value, description, true)
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        name: &str,
        _options: &DeleteOptions,
    ) -> StageResult<()> {
        self.api.delete_parameter(cancel, name).await?;
        Ok(())
    }

    async fn add_tags(
        &self,
        cancel: &CancellationToken,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> StageResult<()> {
        self.api.add_tags_to_parameter(cancel, name, tags).await?;
        Ok(())
    }

    async fn remove_tags(
        &self,
        cancel: &CancellationToken,
        name: &str,
        keys: &BTreeSet<String>,
    ) -> StageResult<()> {
        self.api
            .remove_tags_from_parameter(cancel, name, keys)
            .await?;
        Ok(())
    }
}
