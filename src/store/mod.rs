//! Staging stores
//!
//! [`StageStore`] is the read/write contract over the state model. Two
//! backends implement it:
//! - [`MemoryStore`]: resident store held by a long-lived process (the agent)
//! - [`FileStore`]: one file per identity scope, optionally encrypted
//!
//! [`AgentRegistry`] hands out one resident store per identity scope.

pub mod agent;
pub mod crypto;
pub mod file;
pub mod memory;

pub use agent::AgentRegistry;
pub use crypto::Passphrase;
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StageResult;
use crate::models::{Entry, Service, State, TagEntry};

/// Store capability set
///
/// - `get_*` on an absent item fails with `NotStaged`
/// - `unstage_*` on an absent item is a no-op
/// - `stage_*` overwrites any prior record for the item
/// - `list_*` returns records sorted by name
pub trait StageStore: Send + Sync {
    fn stage_entry(&self, service: Service, name: &str, entry: Entry) -> StageResult<()>;

    fn get_entry(&self, service: Service, name: &str) -> StageResult<Entry>;

    fn unstage_entry(&self, service: Service, name: &str) -> StageResult<()>;

    fn list_entries(&self, service: Service) -> StageResult<Vec<(String, Entry)>>;

    /// Staging an empty tag entry removes the record instead
    fn stage_tag(&self, service: Service, name: &str, tag: TagEntry) -> StageResult<()>;

    fn get_tag(&self, service: Service, name: &str) -> StageResult<TagEntry>;

    fn unstage_tag(&self, service: Service, name: &str) -> StageResult<()>;

    fn list_tags(&self, service: Service) -> StageResult<Vec<(String, TagEntry)>>;

    /// Clear one service's namespace; returns whether anything was staged
    fn unstage_all(&self, service: Service) -> StageResult<bool>;

    /// Copy of the staged state, optionally restricted to one service
    fn snapshot(&self, service: Option<Service>) -> StageResult<State>;

    /// Read-modify-write of the whole state in one step
    ///
    /// No other store call interleaves with `f`. Its changes are committed
    /// only when it returns `Ok`.
    fn update(&self, f: &mut dyn FnMut(&mut State) -> StageResult<()>) -> StageResult<()>;

    /// `get_entry`, mapping `NotStaged` to `None`
    fn find_entry(&self, service: Service, name: &str) -> StageResult<Option<Entry>> {
        match self.get_entry(service, name) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) if e.is_not_staged() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `get_tag`, mapping `NotStaged` to `None`
    fn find_tag(&self, service: Service, name: &str) -> StageResult<Option<TagEntry>> {
        match self.get_tag(service, name) {
            Ok(tag) => Ok(Some(tag)),
            Err(e) if e.is_not_staged() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Replace the given namespace (or everything, for `None`) with `state`
pub(crate) fn replace_in(target: &mut State, service: Option<Service>, state: State) {
    match service {
        None => *target = state,
        Some(service) => {
            target.clear_service(service);
            let scoped = state.scoped(Some(service));
            if let Some(entries) = scoped.entries.get(&service) {
                target.entries.insert(service, entries.clone());
            }
            if let Some(tags) = scoped.tags.get(&service) {
                target.tags.insert(service, tags.clone());
            }
        }
    }
}

/// Sorted list of one service's entries
pub(crate) fn list_entries_in(state: &State, service: Service) -> Vec<(String, Entry)> {
    state
        .entries
        .get(&service)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

/// Sorted list of one service's tag entries
pub(crate) fn list_tags_in(state: &State, service: Service) -> Vec<(String, TagEntry)> {
    state
        .tags
        .get(&service)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}
