//! In-process emulator of the parameter and secret services
//!
//! Keeps every parameter version and secret version in memory, optionally
//! mirrored to a JSON file so separate CLI invocations see the same remote.
//! Names registered with [`LocalRemote::fail_on`] make every mutating call on
//! them fail, which is how tests force remote errors.

use super::{ParameterApi, ParameterRecord, RemoteResult, SecretApi, SecretRecord};
use crate::error::RemoteError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

const DEFAULT_PARAM_TYPE: &str = "String";

#[derive(Debug, Default, Serialize, Deserialize)]
struct RemoteState {
    #[serde(default)]
    parameters: BTreeMap<String, StoredParameter>,
    #[serde(default)]
    secrets: BTreeMap<String, StoredSecret>,
    #[serde(default)]
    clock: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredParameter {
    param_type: String,
    description: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    versions: Vec<StoredVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSecret {
    arn: String,
    description: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    versions: Vec<StoredVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredVersion {
    id: String,
    value: String,
    modified: DateTime<Utc>,
}

impl RemoteState {
    /// Strictly increasing timestamps, so "modified after staging" is always observable
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    /// Every stored item must keep at least one version
    fn validate(&self) -> RemoteResult<()> {
        let empty = self
            .parameters
            .iter()
            .filter(|(_, p)| p.versions.is_empty())
            .map(|(name, _)| name)
            .chain(
                self.secrets
                    .iter()
                    .filter(|(_, s)| s.versions.is_empty())
                    .map(|(name, _)| name),
            )
            .next();
        match empty {
            Some(name) => Err(RemoteError::Api(format!("'{}' has no stored versions", name))),
            None => Ok(()),
        }
    }
}

impl StoredParameter {
    fn record(&self, name: &str, index: usize) -> ParameterRecord {
        let version = &self.versions[index];
        ParameterRecord {
            name: name.to_string(),
            value: version.value.clone(),
            version: (index + 1) as i64,
            param_type: self.param_type.clone(),
            description: self.description.clone(),
            last_modified: version.modified,
            tags: self.tags.clone(),
        }
    }

    fn latest(&self, name: &str) -> ParameterRecord {
        self.record(name, self.versions.len() - 1)
    }
}

impl StoredSecret {
    fn record(&self, name: &str, version: &StoredVersion) -> SecretRecord {
        SecretRecord {
            name: name.to_string(),
            arn: self.arn.clone(),
            value: version.value.clone(),
            version_id: version.id.clone(),
            description: self.description.clone(),
            last_modified: version.modified,
            tags: self.tags.clone(),
        }
    }

    fn latest(&self, name: &str) -> SecretRecord {
        let version = &self.versions[self.versions.len() - 1];
        self.record(name, version)
    }
}

#[derive(Debug, Default)]
pub struct LocalRemote {
    state: Mutex<RemoteState>,
    path: Option<PathBuf>,
    failing: Mutex<BTreeSet<String>>,
}

impl LocalRemote {
    /// Purely in-memory emulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulator mirrored to `path`; an absent file starts empty
    pub fn open(path: impl Into<PathBuf>) -> RemoteResult<Self> {
        let path = path.into();
        let state: RemoteState = match std::fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                RemoteError::Api(format!("invalid emulator state {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RemoteState::default(),
            Err(e) => {
                return Err(RemoteError::Api(format!(
                    "failed to read emulator state {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        state.validate().map_err(|e| {
            RemoteError::Api(format!("invalid emulator state {}: {}", path.display(), e))
        })?;
        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
            failing: Mutex::new(BTreeSet::new()),
        })
    }

    /// Make every mutating call on `name` fail
    pub fn fail_on(&self, name: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into());
    }

    pub fn clear_failures(&self) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Write a parameter version directly, bypassing cancellation and failure injection
    pub fn seed_parameter(&self, name: &str, value: &str) -> ParameterRecord {
        let mut state = self.lock();
        let record = write_parameter(&mut state, name, value, None);
        drop(state);
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "failed to save emulator state");
        }
        record
    }

    /// Write a secret version directly, bypassing cancellation and failure injection
    pub fn seed_secret(&self, name: &str, value: &str) -> SecretRecord {
        let mut state = self.lock();
        let record = write_secret(&mut state, name, value);
        drop(state);
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "failed to save emulator state");
        }
        record
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn guard(&self, cancel: &CancellationToken, name: &str) -> RemoteResult<()> {
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing.contains(name) {
            return Err(RemoteError::Api(format!("injected failure for '{}'", name)));
        }
        Ok(())
    }

    fn save(&self) -> RemoteResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(&*self.lock())
            .map_err(|e| RemoteError::Api(format!("failed to encode emulator state: {}", e)))?;
        write_atomic(path, &json)
            .map_err(|e| RemoteError::Api(format!("failed to save emulator state: {}", e)))
    }

    /// Run a mutation under the lock, then mirror the result to disk
    fn mutate<T>(&self, f: impl FnOnce(&mut RemoteState) -> RemoteResult<T>) -> RemoteResult<T> {
        let out = f(&mut self.lock())?;
        self.save()?;
        Ok(out)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(data)?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn write_parameter(
    state: &mut RemoteState,
    name: &str,
    value: &str,
    description: Option<&str>,
) -> ParameterRecord {
    let modified = state.tick();
    let param = state
        .parameters
        .entry(name.to_string())
        .or_insert_with(|| StoredParameter {
            param_type: DEFAULT_PARAM_TYPE.to_string(),
            description: None,
            tags: BTreeMap::new(),
            versions: Vec::new(),
        });
    if let Some(description) = description {
        param.description = Some(description.to_string());
    }
    param.versions.push(StoredVersion {
        id: (param.versions.len() + 1).to_string(),
        value: value.to_string(),
        modified,
    });
    param.latest(name)
}

fn write_secret(state: &mut RemoteState, name: &str, value: &str) -> SecretRecord {
    let modified = state.tick();
    let secret = state
        .secrets
        .entry(name.to_string())
        .or_insert_with(|| StoredSecret {
            arn: secret_arn(name),
            description: None,
            tags: BTreeMap::new(),
            versions: Vec::new(),
        });
    secret.versions.push(StoredVersion {
        id: format!("{:032x}", rand::random::<u128>()),
        value: value.to_string(),
        modified,
    });
    secret.latest(name)
}

fn secret_arn(name: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!(
        "arn:aws:secretsmanager:local:000000000000:secret:{}-{}",
        name, suffix
    )
}

#[async_trait]
impl ParameterApi for LocalRemote {
    async fn get_parameter(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> RemoteResult<ParameterRecord> {
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        self.lock()
            .parameters
            .get(name)
            .map(|p| p.latest(name))
            .ok_or_else(|| RemoteError::NotFound(name.to_string()))
    }

    async fn get_parameter_version(
        &self,
        cancel: &CancellationToken,
        name: &str,
        version: i64,
    ) -> RemoteResult<ParameterRecord> {
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        let state = self.lock();
        let param = state
            .parameters
            .get(name)
            .ok_or_else(|| RemoteError::NotFound(name.to_string()))?;
        if version < 1 || version as usize > param.versions.len() {
            return Err(RemoteError::VersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
            });
        }
        Ok(param.record(name, (version - 1) as usize))
    }

    async fn put_parameter(
        &self,
        cancel: &CancellationToken,
        name: &str,
        value: &str,
        description: Option<&str>,
        overwrite: bool,
    ) -> RemoteResult<i64> {
        self.guard(cancel, name)?;
        self.mutate(|state| {
            if !overwrite && state.parameters.contains_key(name) {
                return Err(RemoteError::AlreadyExists(name.to_string()));
            }
            Ok(write_parameter(state, name, value, description).version)
        })
    }

    async fn delete_parameter(&self, cancel: &CancellationToken, name: &str) -> RemoteResult<()> {
        self.guard(cancel, name)?;
        self.mutate(|state| {
            state
                .parameters
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))
        })
    }

    async fn add_tags_to_parameter(
        &self,
        cancel: &CancellationToken,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> RemoteResult<()> {
        self.guard(cancel, name)?;
        self.mutate(|state| {
            let param = state
                .parameters
                .get_mut(name)
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))?;
            param.tags.extend(tags.clone());
            Ok(())
        })
    }

    async fn remove_tags_from_parameter(
        &self,
        cancel: &CancellationToken,
        name: &str,
        keys: &BTreeSet<String>,
    ) -> RemoteResult<()> {
        self.guard(cancel, name)?;
        self.mutate(|state| {
            let param = state
                .parameters
                .get_mut(name)
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))?;
            param.tags.retain(|k, _| !keys.contains(k));
            Ok(())
        })
    }
}

#[async_trait]
impl SecretApi for LocalRemote {
    async fn get_secret(&self, cancel: &CancellationToken, name: &str) -> RemoteResult<SecretRecord> {
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        self.lock()
            .secrets
            .get(name)
            .map(|s| s.latest(name))
            .ok_or_else(|| RemoteError::NotFound(name.to_string()))
    }

    async fn get_secret_version(
        &self,
        cancel: &CancellationToken,
        name: &str,
        version_id: &str,
    ) -> RemoteResult<SecretRecord> {
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        let state = self.lock();
        let secret = state
            .secrets
            .get(name)
            .ok_or_else(|| RemoteError::NotFound(name.to_string()))?;
        secret
            .versions
            .iter()
            .find(|v| v.id == version_id || v.id.starts_with(version_id))
            .map(|v| secret.record(name, v))
            .ok_or_else(|| RemoteError::VersionNotFound {
                name: name.to_string(),
                version: version_id.to_string(),
            })
    }

    async fn create_secret(
        &self,
        cancel: &CancellationToken,
        name: &str,
        value: &str,
        description: Option<&str>,
    ) -> RemoteResult<SecretRecord> {
        self.guard(cancel, name)?;
        self.mutate(|state| {
            if state.secrets.contains_key(name) {
                return Err(RemoteError::AlreadyExists(name.to_string()));
            }
            let mut record = write_secret(state, name, value);
            if let Some(description) = description {
                if let Some(secret) = state.secrets.get_mut(name) {
                    secret.description = Some(description.to_string());
                }
                record.description = Some(description.to_string());
            }
            Ok(record)
        })
    }

    async fn put_secret_value(
        &self,
        cancel: &CancellationToken,
        name: &str,
        value: &str,
    ) -> RemoteResult<String> {
        self.guard(cancel, name)?;
        self.mutate(|state| {
            if !state.secrets.contains_key(name) {
                return Err(RemoteError::NotFound(name.to_string()));
            }
            Ok(write_secret(state, name, value).version_id)
        })
    }

    async fn update_secret_description(
        &self,
        cancel: &CancellationToken,
        name: &str,
        description: &str,
    ) -> RemoteResult<()> {
        self.guard(cancel, name)?;
        self.mutate(|state| {
            let secret = state
                .secrets
                .get_mut(name)
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))?;
            secret.description = Some(description.to_string());
            Ok(())
        })
    }

    async fn delete_secret(
        &self,
        cancel: &CancellationToken,
        name: &str,
        force: bool,
        recovery_window_days: Option<u32>,
    ) -> RemoteResult<()> {
        self.guard(cancel, name)?;
        if force && recovery_window_days.is_some() {
            return Err(RemoteError::Api(
                "force delete cannot be combined with a recovery window".to_string(),
            ));
        }
        self.mutate(|state| {
            state
                .secrets
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))
        })
    }

    async fn tag_secret(
        &self,
        cancel: &CancellationToken,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> RemoteResult<()> {
        self.guard(cancel, name)?;
        self.mutate(|state| {
            let secret = state
                .secrets
                .get_mut(name)
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))?;
            secret.tags.extend(tags.clone());
            Ok(())
        })
    }

    async fn untag_secret(
        &self,
        cancel: &CancellationToken,
        name: &str,
        keys: &BTreeSet<String>,
    ) -> RemoteResult<()> {
        self.guard(cancel, name)?;
        self.mutate(|state| {
            let secret = state
                .secrets
                .get_mut(name)
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))?;
            secret.tags.retain(|k, _| !keys.contains(k));
            Ok(())
        })
    }
}
