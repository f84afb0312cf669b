//! Reset - unstage, restore, or clear staged changes

use super::ensure_active;
use crate::error::{StageError, StageResult};
use crate::models::Entry;
use crate::store::StageStore;
use crate::strategy::ServiceStrategy;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetInput {
    /// `name` to unstage, or `name#version` to stage a restore of that version
    #[serde(default)]
    pub spec: Option<String>,

    /// Clear everything staged for the service
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResetResult {
    Unstaged { name: String },
    Restored { name: String, version: String },
    NotStaged { name: String },
    UnstagedAll { entries: usize, tags: usize },
    NothingStaged,
}

pub async fn reset<S>(
    store: &dyn StageStore,
    strategy: &S,
    cancel: &CancellationToken,
    input: ResetInput,
) -> StageResult<ResetResult>
where
    S: ServiceStrategy + ?Sized,
{
    ensure_active(cancel)?;
    if input.all {
        return reset_all(store, strategy);
    }
    let Some(spec) = input.spec else {
        return Err(StageError::InvalidOperation(
            "specify an item to reset or use --all".to_string(),
        ));
    };

    match strategy.parse_spec(&spec)? {
        (name, Some(version)) => restore(store, strategy, cancel, name, version).await,
        (name, None) => unstage(store, strategy, &name),
    }
}

/// Remove the staged entry and tag entry of one item
///
/// Returns [`ResetResult::NotStaged`] rather than failing when neither exists.
pub fn unstage<S>(store: &dyn StageStore, strategy: &S, name: &str) -> StageResult<ResetResult>
where
    S: ServiceStrategy + ?Sized,
{
    let service = strategy.service();
    let name = strategy.parse_name(name)?;
    let had_entry = store.find_entry(service, &name)?.is_some();
    let had_tag = store.find_tag(service, &name)?.is_some();
    if !had_entry && !had_tag {
        return Ok(ResetResult::NotStaged { name });
    }

    store.unstage_entry(service, &name)?;
    store.unstage_tag(service, &name)?;
    info!(service = %service, name = %name, "unstaged");
    Ok(ResetResult::Unstaged { name })
}

/// Clear every staged entry and tag entry of the strategy's service
pub fn reset_all<S>(store: &dyn StageStore, strategy: &S) -> StageResult<ResetResult>
where
    S: ServiceStrategy + ?Sized,
{
    let service = strategy.service();
    let entries = store.list_entries(service)?.len();
    let tags = store.list_tags(service)?.len();
    if !store.unstage_all(service)? {
        return Ok(ResetResult::NothingStaged);
    }
    info!(service = %service, entries, tags, "unstaged all");
    Ok(ResetResult::UnstagedAll { entries, tags })
}

/// Stage an update that brings the item back to a past version's value
async fn restore<S>(
    store: &dyn StageStore,
    strategy: &S,
    cancel: &CancellationToken,
    name: String,
    version: String,
) -> StageResult<ResetResult>
where
    S: ServiceStrategy + ?Sized,
{
    let service = strategy.service();
    let past = strategy.fetch_version(cancel, &name, &version).await?;
    let current = strategy
        .fetch_current(cancel, &name)
        .await?
        .ok_or_else(|| StageError::NotFound {
            service,
            name: name.clone(),
        })?;
    ensure_active(cancel)?;

    store.stage_entry(
        service,
        &name,
        Entry::update(past.value, current.last_modified),
    )?;
    info!(service = %service, name = %name, version = %past.version, "staged restore");
    Ok(ResetResult::Restored {
        name,
        version: past.version,
    })
}
