//! Apply - push staged changes to the remote

use super::diff_service::assess;
use super::ensure_active;
use crate::error::{StageError, StageResult};
use crate::models::{Entry, Operation, Service, TagEntry};
use crate::store::StageStore;
use crate::strategy::ServiceStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplyInput {
    /// Apply a single item instead of the whole service
    #[serde(default)]
    pub name: Option<String>,

    /// Apply entries even when the remote diverged from what they assume
    #[serde(default)]
    pub ignore_conflicts: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyEntryStatus {
    Created,
    Updated,
    Deleted,
    Failed { error: String },
}

impl ApplyEntryStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, ApplyEntryStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyEntryResult {
    pub name: String,
    #[serde(flatten)]
    pub status: ApplyEntryStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyTagResult {
    pub name: String,
    pub added: usize,
    pub removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An entry left staged because the remote no longer matches it
#[derive(Debug, Clone, Serialize)]
pub struct ApplyConflict {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutput {
    pub service: Service,
    pub entries: Vec<ApplyEntryResult>,
    pub tags: Vec<ApplyTagResult>,
    pub conflicts: Vec<ApplyConflict>,
    pub entry_succeeded: usize,
    pub entry_failed: usize,
    pub tag_succeeded: usize,
    pub tag_failed: usize,
    /// Stopped early; unprocessed items are still staged
    pub cancelled: bool,
}

impl ApplyOutput {
    fn new(service: Service) -> Self {
        Self {
            service,
            entries: Vec::new(),
            tags: Vec::new(),
            conflicts: Vec::new(),
            entry_succeeded: 0,
            entry_failed: 0,
            tag_succeeded: 0,
            tag_failed: 0,
            cancelled: false,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.entry_failed > 0 || self.tag_failed > 0
    }
}

/// Conflict reason for an entry, or `None` when it can be pushed
async fn check_conflict<S>(
    strategy: &S,
    cancel: &CancellationToken,
    name: &str,
    entry: &Entry,
    ignore_conflicts: bool,
) -> StageResult<Option<String>>
where
    S: ServiceStrategy + ?Sized,
{
    let remote = strategy.fetch_current(cancel, name).await?;
    let assessment = assess(entry, remote.as_ref());
    match assessment.conflict_reason() {
        Some(reason) if ignore_conflicts => {
            warn!(name = %name, reason = %reason, "applying over conflict");
            Ok(None)
        }
        reason => Ok(reason.map(str::to_string)),
    }
}

async fn push<S>(
    strategy: &S,
    cancel: &CancellationToken,
    name: &str,
    entry: &Entry,
) -> StageResult<ApplyEntryStatus>
where
    S: ServiceStrategy + ?Sized,
{
    let value = entry.value.as_deref().unwrap_or_default();
    let description = entry.description.as_deref();
    match entry.operation {
        Operation::Create => {
            strategy.create(cancel, name, value, description).await?;
            Ok(ApplyEntryStatus::Created)
        }
        Operation::Update => {
            strategy.update(cancel, name, value, description).await?;
            Ok(ApplyEntryStatus::Updated)
        }
        Operation::Delete => {
            let options = entry.delete_options.clone().unwrap_or_default();
            strategy.delete(cancel, name, &options).await?;
            Ok(ApplyEntryStatus::Deleted)
        }
    }
}

/// Apply staged entries, then staged tags, in name order
///
/// A failing item is recorded and the pass continues. Successful items are
/// unstaged; failed and conflicting ones stay staged for another attempt.
pub async fn apply<S>(
    store: &dyn StageStore,
    strategy: &S,
    cancel: &CancellationToken,
    input: ApplyInput,
) -> StageResult<ApplyOutput>
where
    S: ServiceStrategy + ?Sized,
{
    ensure_active(cancel)?;
    let service = strategy.service();
    let filter = input
        .name
        .as_deref()
        .map(|n| strategy.parse_name(n))
        .transpose()?;
    let wanted = |candidate: &str| filter.as_deref().map_or(true, |n| n == candidate);

    let mut output = ApplyOutput::new(service);
    // Tags of these items are held back: the item is missing or gone
    let mut held: BTreeSet<String> = BTreeSet::new();
    let mut deleted: BTreeSet<String> = BTreeSet::new();

    for (name, entry) in store.list_entries(service)? {
        if !wanted(name.as_str()) {
            continue;
        }
        if cancel.is_cancelled() {
            output.cancelled = true;
            break;
        }

        let status = match check_conflict(strategy, cancel, &name, &entry, input.ignore_conflicts)
            .await
        {
            Ok(None) => match push(strategy, cancel, &name, &entry).await {
                Ok(status) => status,
                Err(e) => ApplyEntryStatus::Failed {
                    error: e.to_string(),
                },
            },
            Ok(Some(reason)) => {
                info!(service = %service, name = %name, reason = %reason, "conflict; left staged");
                held.insert(name.clone());
                output.conflicts.push(ApplyConflict { name, reason });
                continue;
            }
            Err(StageError::Cancelled) => {
                output.cancelled = true;
                break;
            }
            Err(e) => ApplyEntryStatus::Failed {
                error: e.to_string(),
            },
        };

        if status.is_success() {
            store.unstage_entry(service, &name)?;
            output.entry_succeeded += 1;
            if status == ApplyEntryStatus::Deleted {
                deleted.insert(name.clone());
            }
            info!(service = %service, name = %name, ?status, "applied");
        } else {
            output.entry_failed += 1;
            held.insert(name.clone());
            warn!(service = %service, name = %name, ?status, "apply failed");
        }
        output.entries.push(ApplyEntryResult { name, status });
    }

    if output.cancelled {
        return Ok(output);
    }

    for (name, tag) in store.list_tags(service)? {
        if !wanted(name.as_str()) {
            continue;
        }
        if deleted.contains(&name) {
            store.unstage_tag(service, &name)?;
            continue;
        }
        if cancel.is_cancelled() {
            output.cancelled = true;
            break;
        }

        let mut result = ApplyTagResult {
            name: name.clone(),
            added: tag.add.len(),
            removed: tag.remove.len(),
            error: None,
        };
        if held.contains(&name) {
            result.error = Some("value change was not applied; tags left staged".to_string());
        } else if let Err(e) = push_tags(strategy, cancel, &name, &tag).await {
            result.error = Some(e.to_string());
        }

        if result.error.is_none() {
            store.unstage_tag(service, &name)?;
            output.tag_succeeded += 1;
            info!(service = %service, name = %name, "applied tags");
        } else {
            output.tag_failed += 1;
            warn!(service = %service, name = %name, "tag apply failed");
        }
        output.tags.push(result);
    }

    Ok(output)
}

async fn push_tags<S>(
    strategy: &S,
    cancel: &CancellationToken,
    name: &str,
    tag: &TagEntry,
) -> StageResult<()>
where
    S: ServiceStrategy + ?Sized,
{
    if !tag.add.is_empty() {
        strategy.add_tags(cancel, name, &tag.add).await?;
    }
    if !tag.remove.is_empty() {
        strategy.remove_tags(cancel, name, &tag.remove).await?;
    }
    Ok(())
}
