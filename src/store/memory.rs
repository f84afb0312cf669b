//! Resident (in-memory) store

use super::{list_entries_in, list_tags_in, StageStore};
use crate::error::{StageError, StageResult};
use crate::models::{Entry, Service, State, TagEntry};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-memory staging store; never persists on its own
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: State) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State is only ever replaced whole or mutated by single map calls,
        // so a poisoned guard still holds a consistent value.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StageStore for MemoryStore {
    fn stage_entry(&self, service: Service, name: &str, entry: Entry) -> StageResult<()> {
        self.lock().insert_entry(service, name, entry);
        Ok(())
    }

    fn get_entry(&self, service: Service, name: &str) -> StageResult<Entry> {
        self.lock()
            .entry(service, name)
            .cloned()
            .ok_or_else(|| StageError::not_staged(service, name))
    }

    fn unstage_entry(&self, service: Service, name: &str) -> StageResult<()> {
        self.lock().remove_entry(service, name);
        Ok(())
    }

    fn list_entries(&self, service: Service) -> StageResult<Vec<(String, Entry)>> {
        Ok(list_entries_in(&self.lock(), service))
    }

    fn stage_tag(&self, service: Service, name: &str, tag: TagEntry) -> StageResult<()> {
        self.lock().insert_tag(service, name, tag);
        Ok(())
    }

    fn get_tag(&self, service: Service, name: &str) -> StageResult<TagEntry> {
        self.lock()
            .tag(service, name)
            .cloned()
            .ok_or_else(|| StageError::not_staged(service, name))
    }

    fn unstage_tag(&self, service: Service, name: &str) -> StageResult<()> {
        self.lock().remove_tag(service, name);
        Ok(())
    }

    fn list_tags(&self, service: Service) -> StageResult<Vec<(String, TagEntry)>> {
        Ok(list_tags_in(&self.lock(), service))
    }

    fn unstage_all(&self, service: Service) -> StageResult<bool> {
        Ok(self.lock().clear_service(service))
    }

    fn snapshot(&self, service: Option<Service>) -> StageResult<State> {
        Ok(self.lock().scoped(service))
    }

    fn update(&self, f: &mut dyn FnMut(&mut State) -> StageResult<()>) -> StageResult<()> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        f(&mut next)?;
        *guard = next;
        Ok(())
    }
}
