//! Diff - compare staged changes against the remote

use super::ensure_active;
use crate::error::StageResult;
use crate::models::{Entry, Operation, Service};
use crate::store::StageStore;
use crate::strategy::{RemoteValue, ServiceStrategy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiffInput {
    /// Restrict to one item
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffEntryType {
    /// Modifying an existing item in place
    Normal,
    /// Creating an item that does not exist remotely
    Create,
    /// Stale against the remote; dropped from the store
    AutoUnstaged,
    /// Still staged, but needs a look before apply
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: DiffEntryType,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_value: Option<String>,
    /// `#<version>` or `<arn>#<version>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffTagEntry {
    pub name: String,
    pub add: BTreeMap<String, String>,
    pub remove: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffOutput {
    pub service: Service,
    pub entries: Vec<DiffEntry>,
    pub tag_entries: Vec<DiffTagEntry>,
}

impl DiffOutput {
    pub fn auto_unstaged(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.entry_type == DiffEntryType::AutoUnstaged)
            .count()
    }
}

/// How a staged entry relates to the current remote state
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Assessment {
    /// Applies cleanly
    Ok,
    /// No longer makes sense against the remote
    Stale(String),
    /// The remote changed after the entry was staged
    Diverged(String),
    /// Would be a no-op
    Redundant(String),
}

impl Assessment {
    /// Stale and diverged entries must not be applied blindly
    pub(crate) fn conflict_reason(&self) -> Option<&str> {
        match self {
            Assessment::Stale(reason) | Assessment::Diverged(reason) => Some(reason.as_str()),
            Assessment::Ok | Assessment::Redundant(_) => None,
        }
    }
}

pub(crate) fn assess(entry: &Entry, remote: Option<&RemoteValue>) -> Assessment {
    match (entry.operation, remote) {
        (Operation::Create, None) => Assessment::Ok,
        (Operation::Create, Some(_)) => {
            Assessment::Stale("item was created remotely after it was staged".to_string())
        }
        (Operation::Update | Operation::Delete, None) => {
            Assessment::Stale("item no longer exists remotely".to_string())
        }
        (Operation::Update, Some(remote)) => {
            if remote.modified_since(entry.base_modified_at) {
                Assessment::Diverged(format!(
                    "remote changed after staging (now {})",
                    remote.identifier()
                ))
            } else if entry.value.as_deref() == Some(remote.value.as_str())
                && entry.description.is_none()
            {
                Assessment::Redundant("remote value already equals the staged value".to_string())
            } else {
                Assessment::Ok
            }
        }
        (Operation::Delete, Some(remote)) => {
            if remote.modified_since(entry.base_modified_at) {
                Assessment::Diverged(format!(
                    "remote changed after deletion was staged (now {})",
                    remote.identifier()
                ))
            } else {
                Assessment::Ok
            }
        }
    }
}

/// Compare staged entries with the remote, dropping those that went stale
pub async fn diff<S>(
    store: &dyn StageStore,
    strategy: &S,
    cancel: &CancellationToken,
    input: DiffInput,
) -> StageResult<DiffOutput>
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

    let mut entries = Vec::new();
    for (name, entry) in store.list_entries(service)? {
        if !wanted(name.as_str()) {
            continue;
        }
        ensure_active(cancel)?;
        let remote = strategy.fetch_current(cancel, &name).await?;
        let assessment = assess(&entry, remote.as_ref());
        debug!(service = %service, name = %name, ?assessment, "assessed staged entry");

        let (entry_type, warning) = match assessment {
            Assessment::Ok if entry.operation == Operation::Create => (DiffEntryType::Create, None),
            Assessment::Ok => (DiffEntryType::Normal, None),
            Assessment::Stale(reason) => {
                store.unstage_entry(service, &name)?;
                info!(service = %service, name = %name, reason = %reason, "auto-unstaged stale entry");
                (DiffEntryType::AutoUnstaged, Some(reason))
            }
            Assessment::Diverged(reason) | Assessment::Redundant(reason) => {
                (DiffEntryType::Warning, Some(reason))
            }
        };

        entries.push(DiffEntry {
            name,
            entry_type,
            operation: entry.operation,
            remote_value: remote.as_ref().map(|r| r.value.clone()),
            remote_identifier: remote.as_ref().map(RemoteValue::identifier),
            staged_value: entry.value,
            description: entry.description,
            warning,
        });
    }

    let tag_entries = store
        .list_tags(service)?
        .into_iter()
        .filter(|(n, _)| wanted(n.as_str()))
        .map(|(name, tag)| DiffTagEntry {
            name,
            add: tag.add,
            remove: tag.remove,
        })
        .collect();

    Ok(DiffOutput {
        service,
        entries,
        tag_entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::models::TagEntry;
    use crate::services::testing::Fixture;
    use chrono::Utc;

    fn remote_value(value: &str) -> RemoteValue {
        RemoteValue {
            name: "n".to_string(),
            value: value.to_string(),
            version: "2".to_string(),
            arn: None,
            last_modified: Some(Utc::now()),
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_assess_create() {
        let entry = Entry::create("v");
        assert_eq!(assess(&entry, None), Assessment::Ok);
        assert!(matches!(
            assess(&entry, Some(&remote_value("x"))),
            Assessment::Stale(_)
        ));
    }

    #[test]
    fn test_assess_update_against_newer_remote() {
        let remote = remote_value("old");
        let base = remote.last_modified.map(|t| t - chrono::Duration::seconds(1));
        let entry = Entry::update("new", base);
        let assessment = assess(&entry, Some(&remote));
        assert!(matches!(assessment, Assessment::Diverged(_)));
        assert!(assessment.conflict_reason().is_some());
    }

    #[test]
    fn test_assess_update_equal_value_is_redundant() {
        let remote = remote_value("same");
        let entry = Entry::update("same", remote.last_modified);
        let assessment = assess(&entry, Some(&remote));
        assert!(matches!(assessment, Assessment::Redundant(_)));
        assert!(assessment.conflict_reason().is_none());
    }

    #[test]
    fn test_assess_delete_of_missing_item_is_stale() {
        let entry = Entry::delete(None, Default::default());
        assert!(matches!(assess(&entry, None), Assessment::Stale(_)));
    }

    #[tokio::test]
    async fn test_diff_classifies_entries() {
        let fx = Fixture::new();
        let params = fx.params();
        let a = fx.remote.seed_parameter("/app/a", "old");
        fx.store
            .stage_entry(
                Service::Parameter,
                "/app/a",
                Entry::update("new", Some(a.last_modified)),
            )
            .unwrap();
        fx.store
            .stage_entry(Service::Parameter, "/app/b", Entry::create("fresh"))
            .unwrap();

        let out = diff(&fx.store, &*params, &fx.cancel, DiffInput::default())
            .await
            .unwrap();
        assert_eq!(out.entries.len(), 2);

        let a = &out.entries[0];
        assert_eq!(a.entry_type, DiffEntryType::Normal);
        assert_eq!(a.remote_value.as_deref(), Some("old"));
        assert_eq!(a.remote_identifier.as_deref(), Some("#1"));
        assert_eq!(a.staged_value.as_deref(), Some("new"));

        assert_eq!(out.entries[1].entry_type, DiffEntryType::Create);
        assert_eq!(out.auto_unstaged(), 0);
    }

    #[tokio::test]
    async fn test_diff_auto_unstages_stale_update() {
        let fx = Fixture::new();
        fx.store
            .stage_entry(Service::Parameter, "/app/gone", Entry::update("v", None))
            .unwrap();

        let out = diff(&fx.store, &*fx.params(), &fx.cancel, DiffInput::default())
            .await
            .unwrap();
        assert_eq!(out.entries[0].entry_type, DiffEntryType::AutoUnstaged);
        assert!(out.entries[0].warning.is_some());
        assert!(fx
            .store
            .find_entry(Service::Parameter, "/app/gone")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_diff_warns_when_remote_moved() {
        let fx = Fixture::new();
        let base = fx.remote.seed_secret("db", "one");
        fx.store
            .stage_entry(
                Service::Secret,
                "db",
                Entry::update("two", Some(base.last_modified)),
            )
            .unwrap();
        fx.remote.seed_secret("db", "changed elsewhere");

        let out = diff(&fx.store, &*fx.secrets(), &fx.cancel, DiffInput::default())
            .await
            .unwrap();
        let entry = &out.entries[0];
        assert_eq!(entry.entry_type, DiffEntryType::Warning);
        assert!(entry
            .remote_identifier
            .as_deref()
            .is_some_and(|id| id.starts_with("arn:aws:secretsmanager:")));
        assert!(fx.store.find_entry(Service::Secret, "db").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_diff_reports_tags_and_filters_by_name() {
        let fx = Fixture::new();
        let mut tag = TagEntry::new();
        tag.add_tags([("env".to_string(), "prod".to_string())]);
        fx.store.stage_tag(Service::Parameter, "/app/a", tag.clone()).unwrap();
        fx.store.stage_tag(Service::Parameter, "/app/b", tag).unwrap();

        let out = diff(
            &fx.store,
            &*fx.params(),
            &fx.cancel,
            DiffInput {
                name: Some("/app/b".to_string()),
            },
        )
        .await
        .unwrap();
        assert!(out.entries.is_empty());
        assert_eq!(out.tag_entries.len(), 1);
        assert_eq!(out.tag_entries[0].name, "/app/b");
    }

    #[tokio::test]
    async fn test_diff_cancelled() {
        let fx = Fixture::new();
        fx.cancel.cancel();
        let err = diff(&fx.store, &*fx.params(), &fx.cancel, DiffInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Cancelled));
    }
}
