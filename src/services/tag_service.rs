//! Tag / Untag / CancelTag - stage tag changes

use super::ensure_active;
use crate::error::{StageError, StageResult};
use crate::models::{Operation, Service, TagEntry};
use crate::store::StageStore;
use crate::strategy::ServiceStrategy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Prefix reserved by the remote services for their own tags
const RESERVED_TAG_PREFIX: &str = "aws:";

#[derive(Debug, Clone, Deserialize)]
pub struct TagInput {
    pub name: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UntagInput {
    pub name: String,
    pub keys: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagOutput {
    pub name: String,
    pub add: BTreeMap<String, String>,
    pub remove: BTreeSet<String>,
}

impl TagOutput {
    fn from_entry(name: String, entry: &TagEntry) -> Self {
        Self {
            name,
            add: entry.add.clone(),
            remove: entry.remove.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelTagInput {
    pub name: String,
    pub keys: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelTagOutput {
    pub name: String,
    /// Nothing remained staged, so the tag entry was removed
    pub unstaged: bool,
}

fn validate_keys<'a>(keys: impl IntoIterator<Item = &'a String>) -> StageResult<()> {
    for key in keys {
        if key.trim().is_empty() {
            return Err(StageError::InvalidOperation(
                "tag keys must not be empty".to_string(),
            ));
        }
        if key.starts_with(RESERVED_TAG_PREFIX) {
            return Err(StageError::InvalidOperation(format!(
                "tag key '{}' uses the reserved '{}' prefix",
                key, RESERVED_TAG_PREFIX
            )));
        }
    }
    Ok(())
}

/// Tags can only be staged for an item that will exist after apply
async fn ensure_taggable<S>(
    store: &dyn StageStore,
    strategy: &S,
    cancel: &CancellationToken,
    name: &str,
) -> StageResult<()>
where
    S: ServiceStrategy + ?Sized,
{
    let service = strategy.service();
    match store.find_entry(service, name)?.map(|e| e.operation) {
        Some(Operation::Create) => Ok(()),
        Some(Operation::Delete) => Err(StageError::InvalidOperation(format!(
            "{} '{}' is staged for deletion; tags cannot be staged",
            service, name
        ))),
        Some(Operation::Update) | None => {
            if strategy.fetch_current(cancel, name).await?.is_none() {
                return Err(StageError::NotFound {
                    service,
                    name: name.to_string(),
                });
            }
            Ok(())
        }
    }
}

/// Apply `f` to the item's staged tag entry (or a fresh one) in one store update
fn merge_tag(
    store: &dyn StageStore,
    service: Service,
    name: &str,
    mut f: impl FnMut(&mut TagEntry),
) -> StageResult<TagEntry> {
    let mut merged = TagEntry::default();
    store.update(&mut |state| {
        let mut entry = state.tag(service, name).cloned().unwrap_or_default();
        f(&mut entry);
        entry.staged_at = chrono::Utc::now();
        merged = entry.clone();
        state.insert_tag(service, name, entry);
        Ok(())
    })?;
    Ok(merged)
}

/// Stage tags to add; merges with anything already staged for the item
pub async fn tag<S>(
    store: &dyn StageStore,
    strategy: &S,
    cancel: &CancellationToken,
    input: TagInput,
) -> StageResult<TagOutput>
where
    S: ServiceStrategy + ?Sized,
{
    ensure_active(cancel)?;
    let service = strategy.service();
    let name = strategy.parse_name(&input.name)?;
    if input.tags.is_empty() {
        return Err(StageError::InvalidOperation(
            "at least one tag is required".to_string(),
        ));
    }
    validate_keys(input.tags.keys())?;
    ensure_taggable(store, strategy, cancel, &name).await?;
    ensure_active(cancel)?;

    let entry = merge_tag(store, service, &name, |e| e.add_tags(input.tags.clone()))?;
    info!(service = %service, name = %name, add = entry.add.len(), "staged tags");
    Ok(TagOutput::from_entry(name, &entry))
}

/// Stage tag keys to remove; merges with anything already staged for the item
pub async fn untag<S>(
    store: &dyn StageStore,
    strategy: &S,
    cancel: &CancellationToken,
    input: UntagInput,
) -> StageResult<TagOutput>
where
    S: ServiceStrategy + ?Sized,
{
    ensure_active(cancel)?;
    let service = strategy.service();
    let name = strategy.parse_name(&input.name)?;
    if input.keys.is_empty() {
        return Err(StageError::InvalidOperation(
            "at least one tag key is required".to_string(),
        ));
    }
    validate_keys(&input.keys)?;
    ensure_taggable(store, strategy, cancel, &name).await?;
    ensure_active(cancel)?;

    let entry = merge_tag(store, service, &name, |e| e.remove_keys(input.keys.clone()))?;
    info!(service = %service, name = %name, remove = entry.remove.len(), "staged tag removal");
    Ok(TagOutput::from_entry(name, &entry))
}

/// Drop keys from the staged additions of an item
pub fn cancel_add_tag<S>(
    store: &dyn StageStore,
    strategy: &S,
    input: CancelTagInput,
) -> StageResult<CancelTagOutput>
where
    S: ServiceStrategy + ?Sized,
{
    cancel_keys(store, strategy, input, |entry, key| {
        entry.add.remove(key).is_some()
    })
}

/// Drop keys from the staged removals of an item
pub fn cancel_remove_tag<S>(
    store: &dyn StageStore,
    strategy: &S,
    input: CancelTagInput,
) -> StageResult<CancelTagOutput>
where
    S: ServiceStrategy + ?Sized,
{
    cancel_keys(store, strategy, input, |entry, key| entry.remove.remove(key))
}

fn cancel_keys<S>(
    store: &dyn StageStore,
    strategy: &S,
    input: CancelTagInput,
    mut take: impl FnMut(&mut TagEntry, &str) -> bool,
) -> StageResult<CancelTagOutput>
where
    S: ServiceStrategy + ?Sized,
{
    let service = strategy.service();
    let name = strategy.parse_name(&input.name)?;

    let mut unstaged = false;
    store.update(&mut |state| {
        let mut entry = state
            .tag(service, &name)
            .cloned()
            .ok_or_else(|| StageError::not_staged(service, name.as_str()))?;
        for key in &input.keys {
            if !take(&mut entry, key) {
                return Err(StageError::TagKeyNotStaged {
                    service,
                    name: name.clone(),
                    key: key.clone(),
                });
            }
        }
        // an emptied entry is removed by insert_tag
        unstaged = entry.is_empty();
        state.insert_tag(service, name.as_str(), entry);
        Ok(())
    })?;
    info!(service = %service, name = %name, unstaged, "cancelled staged tag keys");
    Ok(CancelTagOutput { name, unstaged })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entry;
    use crate::services::testing::Fixture;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::thread;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn keys(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_tag_then_untag_same_key_moves_it() {
        let fx = Fixture::new();
        let params = fx.params();
        fx.remote.seed_parameter("/app/a", "v");

        tag(
            &fx.store,
            &*params,
            &fx.cancel,
            TagInput {
                name: "/app/a".to_string(),
                tags: tags(&[("env", "prod"), ("team", "core")]),
            },
        )
        .await
        .unwrap();
        let out = untag(
            &fx.store,
            &*params,
            &fx.cancel,
            UntagInput {
                name: "/app/a".to_string(),
                keys: keys(&["env"]),
            },
        )
        .await
        .unwrap();

        assert_eq!(out.add, tags(&[("team", "core")]));
        assert_eq!(out.remove, keys(&["env"]));
    }

    #[tokio::test]
    async fn test_tag_merges_with_existing_entry() {
        let fx = Fixture::new();
        let secrets = fx.secrets();
        fx.remote.seed_secret("db", "pw");

        for (k, v) in [("a", "1"), ("b", "2")] {
            tag(
                &fx.store,
                &*secrets,
                &fx.cancel,
                TagInput {
                    name: "db".to_string(),
                    tags: tags(&[(k, v)]),
                },
            )
            .await
            .unwrap();
        }

        let entry = fx.store.get_tag(Service::Secret, "db").unwrap();
        assert_eq!(entry.add, tags(&[("a", "1"), ("b", "2")]));
    }

    #[tokio::test]
    async fn test_tag_staged_create_without_remote() {
        let fx = Fixture::new();
        fx.store
            .stage_entry(Service::Parameter, "/app/new", Entry::create("v"))
            .unwrap();
        let out = tag(
            &fx.store,
            &*fx.params(),
            &fx.cancel,
            TagInput {
                name: "/app/new".to_string(),
                tags: tags(&[("env", "dev")]),
            },
        )
        .await
        .unwrap();
        assert_eq!(out.add.len(), 1);
    }

    #[tokio::test]
    async fn test_tag_missing_item_is_not_found() {
        let fx = Fixture::new();
        let err = tag(
            &fx.store,
            &*fx.params(),
            &fx.cancel,
            TagInput {
                name: "/app/ghost".to_string(),
                tags: tags(&[("env", "dev")]),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_tag_rejects_reserved_prefix() {
        let fx = Fixture::new();
        fx.remote.seed_parameter("/app/a", "v");
        let err = tag(
            &fx.store,
            &*fx.params(),
            &fx.cancel,
            TagInput {
                name: "/app/a".to_string(),
                tags: tags(&[("aws:owner", "x")]),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StageError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_tag_item_staged_for_delete_is_rejected() {
        let fx = Fixture::new();
        fx.remote.seed_parameter("/app/a", "v");
        fx.store
            .stage_entry(
                Service::Parameter,
                "/app/a",
                Entry::delete(None, Default::default()),
            )
            .unwrap();
        let err = tag(
            &fx.store,
            &*fx.params(),
            &fx.cancel,
            TagInput {
                name: "/app/a".to_string(),
                tags: tags(&[("env", "dev")]),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StageError::InvalidOperation(_)));
    }

    #[test]
    fn test_concurrent_merges_keep_every_key() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for j in 0..25 {
                        let pair = (format!("k{i}-{j}"), "v".to_string());
                        merge_tag(&*store, Service::Parameter, "/app/a", |e| {
                            e.add_tags([pair.clone()])
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entry = store.get_tag(Service::Parameter, "/app/a").unwrap();
        assert_eq!(entry.add.len(), 200);
    }

    #[test]
    fn test_cancel_add_tag_auto_unstages_when_empty() {
        let fx = Fixture::new();
        let mut entry = TagEntry::new();
        entry.add_tags(tags(&[("env", "dev")]));
        fx.store.stage_tag(Service::Parameter, "/app/a", entry).unwrap();

        let out = cancel_add_tag(
            &fx.store,
            &*fx.params(),
            CancelTagInput {
                name: "/app/a".to_string(),
                keys: keys(&["env"]),
            },
        )
        .unwrap();
        assert!(out.unstaged);
        assert!(fx.store.find_tag(Service::Parameter, "/app/a").unwrap().is_none());
    }

    #[test]
    fn test_cancel_remove_tag_keeps_remaining() {
        let fx = Fixture::new();
        let mut entry = TagEntry::new();
        entry.add_tags(tags(&[("team", "core")]));
        entry.remove_keys(keys(&["old"]));
        fx.store.stage_tag(Service::Secret, "db", entry).unwrap();

        let out = cancel_remove_tag(
            &fx.store,
            &*fx.secrets(),
            CancelTagInput {
                name: "db".to_string(),
                keys: keys(&["old"]),
            },
        )
        .unwrap();
        assert!(!out.unstaged);
        let entry = fx.store.get_tag(Service::Secret, "db").unwrap();
        assert!(entry.remove.is_empty());
        assert_eq!(entry.add.len(), 1);
    }

    #[test]
    fn test_cancel_unknown_key_is_not_staged() {
        let fx = Fixture::new();
        let mut entry = TagEntry::new();
        entry.add_tags(tags(&[("team", "core")]));
        fx.store.stage_tag(Service::Secret, "db", entry).unwrap();

        let err = cancel_add_tag(
            &fx.store,
            &*fx.secrets(),
            CancelTagInput {
                name: "db".to_string(),
                keys: keys(&["missing"]),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StageError::TagKeyNotStaged { .. }));
        assert!(err.is_not_staged());
    }

    #[test]
    fn test_cancel_without_tag_entry_is_not_staged() {
        let fx = Fixture::new();
        let err = cancel_remove_tag(
            &fx.store,
            &*fx.params(),
            CancelTagInput {
                name: "/app/a".to_string(),
                keys: keys(&["env"]),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StageError::NotStaged { .. }));
    }
}
