use super::{Entry, Service, TagEntry};
use crate::error::StageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Full staging record: `entries[service][name]` and `tags[service][name]`
///
/// Ordered maps keep listings and serialized output deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub entries: BTreeMap<Service, BTreeMap<String, Entry>>,

    #[serde(default)]
    pub tags: BTreeMap<Service, BTreeMap<String, TagEntry>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty) && self.tags.values().all(BTreeMap::is_empty)
    }

    pub fn is_service_empty(&self, service: Service) -> bool {
        self.entries.get(&service).map_or(true, BTreeMap::is_empty)
            && self.tags.get(&service).map_or(true, BTreeMap::is_empty)
    }

    pub fn entry(&self, service: Service, name: &str) -> Option<&Entry> {
        self.entries.get(&service).and_then(|m| m.get(name))
    }

    pub fn tag(&self, service: Service, name: &str) -> Option<&TagEntry> {
        self.tags.get(&service).and_then(|m| m.get(name))
    }

    pub fn insert_entry(&mut self, service: Service, name: impl Into<String>, entry: Entry) {
        self.entries
            .entry(service)
            .or_default()
            .insert(name.into(), entry);
    }

    /// Insert a tag entry; an empty one removes any existing record instead
    pub fn insert_tag(&mut self, service: Service, name: impl Into<String>, tag: TagEntry) {
        let name = name.into();
        if tag.is_empty() {
            self.remove_tag(service, &name);
            return;
        }
        self.tags.entry(service).or_default().insert(name, tag);
    }

    pub fn remove_entry(&mut self, service: Service, name: &str) -> Option<Entry> {
        let removed = self.entries.get_mut(&service).and_then(|m| m.remove(name));
        self.prune(service);
        removed
    }

    pub fn remove_tag(&mut self, service: Service, name: &str) -> Option<TagEntry> {
        let removed = self.tags.get_mut(&service).and_then(|m| m.remove(name));
        self.prune(service);
        removed
    }

    /// Drop every record of one service; returns whether anything was removed
    pub fn clear_service(&mut self, service: Service) -> bool {
        let had_any = !self.is_service_empty(service);
        self.entries.remove(&service);
        self.tags.remove(&service);
        had_any
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.values().map(BTreeMap::len).sum()
    }

    /// Copy restricted to one service, or the whole state for `None`
    pub fn scoped(&self, service: Option<Service>) -> State {
        match service {
            None => self.clone(),
            Some(service) => {
                let mut scoped = State::new();
                if let Some(entries) = self.entries.get(&service) {
                    if !entries.is_empty() {
                        scoped.entries.insert(service, entries.clone());
                    }
                }
                if let Some(tags) = self.tags.get(&service) {
                    if !tags.is_empty() {
                        scoped.tags.insert(service, tags.clone());
                    }
                }
                scoped
            }
        }
    }

    /// Sorted `(service, name)` pairs that have an entry, a tag entry, or both
    pub fn item_keys(&self) -> Vec<(Service, String)> {
        let mut keys: Vec<(Service, String)> = self
            .entries
            .iter()
            .flat_map(|(s, m)| m.keys().map(move |n| (*s, n.clone())))
            .chain(
                self.tags
                    .iter()
                    .flat_map(|(s, m)| m.keys().map(move |n| (*s, n.clone()))),
            )
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Reject records that break the model invariants (loaded state only)
    pub fn validate(&self) -> Result<(), StageError> {
        for (service, entries) in &self.entries {
            for (name, entry) in entries {
                if !entry.is_consistent() {
                    return Err(StageError::CorruptState(format!(
                        "{} '{}': {} entry has inconsistent value",
                        service, name, entry.operation
                    )));
                }
            }
        }
        for (service, tags) in &self.tags {
            for (name, tag) in tags {
                if tag.is_empty() {
                    return Err(StageError::CorruptState(format!(
                        "{} '{}': empty tag entry",
                        service, name
                    )));
                }
            }
        }
        Ok(())
    }

    fn prune(&mut self, service: Service) {
        if self.entries.get(&service).is_some_and(BTreeMap::is_empty) {
            self.entries.remove(&service);
        }
        if self.tags.get(&service).is_some_and(BTreeMap::is_empty) {
            self.tags.remove(&service);
        }
    }
}

/// Remote-account identity a store is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub account_id: String,
    pub region: String,
}

impl Scope {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
        }
    }

    /// Both fields become directory names, so each must be a single
    /// non-empty path component of `[A-Za-z0-9_.-]`
    pub fn validate(&self) -> Result<(), StageError> {
        for (field, value) in [("account", &self.account_id), ("region", &self.region)] {
            let bad = match value.as_str() {
                "" => Some("is empty"),
                "." | ".." => Some("is a relative path component"),
                v if !v
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) =>
                {
                    Some("may only contain letters, digits, '-', '_' and '.'")
                }
                _ => None,
            };
            if let Some(reason) = bad {
                return Err(StageError::InvalidScope(format!(
                    "{} '{}' {}",
                    field, value, reason
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tag_entry_is_not_inserted() {
        let mut state = State::new();
        state.insert_tag(Service::Parameter, "/app/a", TagEntry::new());
        assert!(state.is_empty());
    }

    #[test]
    fn test_scope_validation() {
        assert!(Scope::new("123456789012", "ap-northeast-1").validate().is_ok());
        assert!(Scope::new("local", "us_east.1").validate().is_ok());

        for (account, region) in [("", "r"), ("a", ".."), (".", "r"), ("1/2", "r"), ("a", "x y")] {
            let err = Scope::new(account, region).validate().unwrap_err();
            assert!(matches!(err, StageError::InvalidScope(_)), "{account}/{region}");
        }
    }

    #[test]
    fn test_scoped_keeps_one_service() {
        let mut state = State::new();
        state.insert_entry(Service::Parameter, "/app/a", Entry::create("1"));
        state.insert_entry(Service::Secret, "db-pass", Entry::create("2"));

        let scoped = state.scoped(Some(Service::Secret));
        assert_eq!(scoped.entry_count(), 1);
        assert!(scoped.entry(Service::Secret, "db-pass").is_some());
        assert!(scoped.is_service_empty(Service::Parameter));
    }

    #[test]
    fn test_item_keys_sorted_and_deduplicated() {
        let mut state = State::new();
        state.insert_entry(Service::Parameter, "/b", Entry::create("1"));
        state.insert_entry(Service::Parameter, "/a", Entry::create("1"));
        let mut tag = TagEntry::new();
        tag.add_tags([("k".to_string(), "v".to_string())]);
        state.insert_tag(Service::Parameter, "/a", tag);

        let keys = state.item_keys();
        assert_eq!(
            keys,
            vec![
                (Service::Parameter, "/a".to_string()),
                (Service::Parameter, "/b".to_string()),
            ]
        );
    }

    #[test]
    fn test_serialized_state_uses_service_names() {
        let mut state = State::new();
        state.insert_entry(Service::Parameter, "/app/config", Entry::create("x"));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["entries"]["parameter"]["/app/config"]["value"], "x");
    }

    #[test]
    fn test_validate_rejects_empty_tag_entry() {
        let mut state = State::new();
        state
            .tags
            .entry(Service::Secret)
            .or_default()
            .insert("s".to_string(), TagEntry::new());
        assert!(matches!(state.validate(), Err(StageError::CorruptState(_))));
    }
}
