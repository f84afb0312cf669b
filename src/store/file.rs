//! File-backed staging store
//!
//! One file per identity scope at `<stage_dir>/<account>/<region>/stage.json`.
//! Writes replace the whole file atomically; nothing is merged at this layer.
//! A missing file reads as an empty [`State`].

use super::crypto::{self, Passphrase};
use super::{list_entries_in, list_tags_in, StageStore};
use crate::error::{StageError, StageResult};
use crate::models::{Entry, Scope, Service, State, TagEntry};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const STAGE_FILE: &str = "stage.json";

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    passphrase: Option<Passphrase>,
}

impl FileStore {
    /// Store at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            passphrase: None,
        }
    }

    /// Store for an identity scope under `stage_dir`
    ///
    /// Fails with `InvalidScope` unless both fields are plain path components,
    /// so distinct scopes never share a file.
    pub fn for_scope(stage_dir: &Path, scope: &Scope) -> StageResult<Self> {
        scope.validate()?;
        Ok(Self::new(
            stage_dir
                .join(&scope.account_id)
                .join(&scope.region)
                .join(STAGE_FILE),
        ))
    }

    /// Encrypt on write and decrypt on read with this passphrase
    pub fn with_passphrase(mut self, passphrase: Option<Passphrase>) -> Self {
        self.passphrase = passphrase;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Whether the file on disk is an encrypted envelope (`false` if absent)
    pub fn is_encrypted(&self) -> StageResult<bool> {
        match fs::read(&self.path) {
            Ok(data) => Ok(crypto::is_encrypted(&data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_state(&self) -> StageResult<State> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(State::new()),
            Err(e) => return Err(e.into()),
        };

        let plain = if crypto::is_encrypted(&data) {
            let passphrase = self
                .passphrase
                .as_ref()
                .ok_or(StageError::PassphraseRequired)?;
            crypto::decrypt(&data, passphrase)?
        } else {
            data
        };

        let state: State = serde_json::from_slice(&plain)?;
        state.validate()?;
        Ok(state)
    }

    /// Replace the file's content with `state`
    pub fn write_state(&self, state: &State) -> StageResult<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let data = match &self.passphrase {
            Some(passphrase) => crypto::encrypt(&json, passphrase)?,
            None => json,
        };

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(&data)?;
        temp_file.flush()?;
        temp_file.persist(&self.path).map_err(|e| StageError::Io(e.error))?;

        tracing::debug!(
            path = %self.path.display(),
            encrypted = self.passphrase.is_some(),
            entries = state.entry_count(),
            tags = state.tag_count(),
            "wrote staging file"
        );
        Ok(())
    }

    /// Read the file; unless `keep`, delete it once read successfully
    pub fn drain(&self, keep: bool) -> StageResult<State> {
        let state = self.read_state()?;
        if !keep {
            self.delete()?;
        }
        Ok(state)
    }

    /// Remove the file; a missing file is fine
    pub fn delete(&self) -> StageResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn modify<R>(&self, f: impl FnOnce(&mut State) -> R) -> StageResult<R> {
        let mut state = self.read_state()?;
        let out = f(&mut state);
        self.write_state(&state)?;
        Ok(out)
    }
}

impl StageStore for FileStore {
    fn stage_entry(&self, service: Service, name: &str, entry: Entry) -> StageResult<()> {
        self.modify(|state| state.insert_entry(service, name, entry))
    }

    fn get_entry(&self, service: Service, name: &str) -> StageResult<Entry> {
        self.read_state()?
            .entry(service, name)
            .cloned()
            .ok_or_else(|| StageError::not_staged(service, name))
    }

    fn unstage_entry(&self, service: Service, name: &str) -> StageResult<()> {
        if self.read_state()?.entry(service, name).is_none() {
            return Ok(());
        }
        self.modify(|state| {
            state.remove_entry(service, name);
        })
    }

    fn list_entries(&self, service: Service) -> StageResult<Vec<(String, Entry)>> {
        Ok(list_entries_in(&self.read_state()?, service))
    }

    fn stage_tag(&self, service: Service, name: &str, tag: TagEntry) -> StageResult<()> {
        self.modify(|state| state.insert_tag(service, name, tag))
    }

    fn get_tag(&self, service: Service, name: &str) -> StageResult<TagEntry> {
        self.read_state()?
            .tag(service, name)
            .cloned()
            .ok_or_else(|| StageError::not_staged(service, name))
    }

    fn unstage_tag(&self, service: Service, name: &str) -> StageResult<()> {
        if self.read_state()?.tag(service, name).is_none() {
            return Ok(());
        }
        self.modify(|state| {
            state.remove_tag(service, name);
        })
    }

    fn list_tags(&self, service: Service) -> StageResult<Vec<(String, TagEntry)>> {
        Ok(list_tags_in(&self.read_state()?, service))
    }

    fn unstage_all(&self, service: Service) -> StageResult<bool> {
        if self.read_state()?.is_service_empty(service) {
            return Ok(false);
        }
        self.modify(|state| state.clear_service(service))
    }

    fn snapshot(&self, service: Option<Service>) -> StageResult<State> {
        Ok(self.read_state()?.scoped(service))
    }

    fn update(&self, f: &mut dyn FnMut(&mut State) -> StageResult<()>) -> StageResult<()> {
        let mut state = self.read_state()?;
        f(&mut state)?;
        self.write_state(&state)
    }
}
