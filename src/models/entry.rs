//! Pending change records
//!
//! An [`Entry`] is one pending value change for an item; a [`TagEntry`] is one
//! pending tag change. Both are keyed by `(service, name)` inside [`super::State`].

use super::Operation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Delete-time parameters (secrets only)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Delete immediately, without a recovery window
    #[serde(default)]
    pub force: bool,

    /// Days the remote keeps the item recoverable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_window_days: Option<u32>,
}

impl DeleteOptions {
    pub fn is_empty(&self) -> bool {
        !self.force && self.recovery_window_days.is_none()
    }
}

/// One pending value change
///
/// `value` is present iff `operation` is not [`Operation::Delete`]; use the
/// constructors to keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub operation: Operation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_options: Option<DeleteOptions>,

    pub staged_at: DateTime<Utc>,

    /// Remote last-modified time observed when the change was first staged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_modified_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn create(value: impl Into<String>) -> Self {
        Self {
            operation: Operation::Create,
            value: Some(value.into()),
            description: None,
            delete_options: None,
            staged_at: Utc::now(),
            base_modified_at: None,
        }
    }

    pub fn update(value: impl Into<String>, base_modified_at: Option<DateTime<Utc>>) -> Self {
        Self {
            operation: Operation::Update,
            value: Some(value.into()),
            description: None,
            delete_options: None,
            staged_at: Utc::now(),
            base_modified_at,
        }
    }

    pub fn delete(base_modified_at: Option<DateTime<Utc>>, options: DeleteOptions) -> Self {
        Self {
            operation: Operation::Delete,
            value: None,
            description: None,
            delete_options: (!options.is_empty()).then_some(options),
            staged_at: Utc::now(),
            base_modified_at,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Check the value/operation invariant (used when loading persisted state)
    pub fn is_consistent(&self) -> bool {
        match self.operation {
            Operation::Delete => self.value.is_none(),
            Operation::Create | Operation::Update => self.value.is_some(),
        }
    }

    /// Same pending change, ignoring when it was staged
    pub fn same_change(&self, other: &Entry) -> bool {
        self.operation == other.operation
            && self.value == other.value
            && self.description == other.description
            && self.delete_options == other.delete_options
    }
}

/// One pending tag change
///
/// Never kept once both `add` and `remove` are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub remove: BTreeSet<String>,

    pub staged_at: DateTime<Utc>,
}

impl TagEntry {
    pub fn new() -> Self {
        Self {
            add: BTreeMap::new(),
            remove: BTreeSet::new(),
            staged_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Stage tags for addition; a key pending removal stops being removed
    pub fn add_tags(&mut self, tags: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in tags {
            self.remove.remove(&key);
            self.add.insert(key, value);
        }
        self.staged_at = Utc::now();
    }

    /// Stage keys for removal; a key pending addition stops being added
    pub fn remove_keys(&mut self, keys: impl IntoIterator<Item = String>) {
        for key in keys {
            self.add.remove(&key);
            self.remove.insert(key);
        }
        self.staged_at = Utc::now();
    }

    pub fn same_change(&self, other: &TagEntry) -> bool {
        self.add == other.add && self.remove == other.remove
    }
}

impl Default for TagEntry {
    fn default() -> Self {
        Self::new()
    }
}
