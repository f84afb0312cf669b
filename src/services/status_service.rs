//! Status - list staged changes

use crate::error::StageResult;
use crate::models::{DeleteOptions, Operation, Service};
use crate::store::StageStore;
use crate::strategy::Parser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusInput {
    /// Restrict to one item
    #[serde(default)]
    pub name: Option<String>,

    /// Include staged values (masked otherwise)
    #[serde(default)]
    pub show_values: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub name: String,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_options: Option<DeleteOptions>,
    pub staged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusTagEntry {
    pub name: String,
    pub add: BTreeMap<String, String>,
    pub remove: BTreeSet<String>,
    pub staged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    pub service: Service,
    pub entries: Vec<StatusEntry>,
    pub tag_entries: Vec<StatusTagEntry>,
}

impl StatusOutput {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.tag_entries.is_empty()
    }
}

pub fn status<S>(store: &dyn StageStore, strategy: &S, input: StatusInput) -> StageResult<StatusOutput>
where
    S: Parser + ?Sized,
{
    let service = strategy.service();
    let name = input
        .name
        .as_deref()
        .map(|n| strategy.parse_name(n))
        .transpose()?;
    let wanted = |candidate: &str| name.as_deref().map_or(true, |n| n == candidate);

    let entries = store
        .list_entries(service)?
        .into_iter()
        .filter(|(n, _)| wanted(n.as_str()))
        .map(|(name, entry)| StatusEntry {
            name,
            operation: entry.operation,
            value: if input.show_values { entry.value } else { None },
            description: entry.description,
            delete_options: entry.delete_options,
            staged_at: entry.staged_at,
        })
        .collect();

    let tag_entries = store
        .list_tags(service)?
        .into_iter()
        .filter(|(n, _)| wanted(n.as_str()))
        .map(|(name, tag)| StatusTagEntry {
            name,
            add: tag.add,
            remove: tag.remove,
            staged_at: tag.staged_at,
        })
        .collect();

    Ok(StatusOutput {
        service,
        entries,
        tag_entries,
    })
}
