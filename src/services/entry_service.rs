//! Add / Edit / Delete - stage a value change

use super::ensure_active;
use crate::error::{StageError, StageResult};
use crate::models::{Entry, Operation};
use crate::store::StageStore;
use crate::strategy::ServiceStrategy;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct AddInput {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddOutput {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditInput {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditOutput {
    pub name: String,
    /// Operation now staged; `None` when nothing is staged afterwards
    pub operation: Option<Operation>,
    /// The value matched the remote, so nothing was staged
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteInput {
    pub name: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub recovery_window_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutput {
    pub name: String,
    /// The item was only staged for creation, so the staged create was dropped
    pub unstaged_create: bool,
}

/// Stage creation of a new item
pub async fn add<S>(
    store: &dyn StageStore,
    strategy: &S,
    cancel: &CancellationToken,
    input: AddInput,
) -> StageResult<AddOutput>
where
    S: ServiceStrategy + ?Sized,
{
    ensure_active(cancel)?;
    let service = strategy.service();
    let name = strategy.parse_name(&input.name)?;
    strategy.validate_value(&name, &input.value)?;

    let existing = store.find_entry(service, &name)?;
    let description = match &existing {
        Some(entry) if entry.operation != Operation::Create => {
            return Err(StageError::InvalidOperation(format!(
                "{} '{}' is already staged for {}; use edit or reset",
                service, name, entry.operation
            )));
        }
        Some(entry) => input.description.or_else(|| entry.description.clone()),
        None => {
            if strategy.fetch_current(cancel, &name).await?.is_some() {
                return Err(StageError::AlreadyExists { service, name });
            }
            input.description
        }
    };

    ensure_active(cancel)?;
    store.stage_entry(
        service,
        &name,
        Entry::create(input.value).with_description(description),
    )?;
    info!(service = %service, name = %name, "staged create");

    Ok(AddOutput { name })
}

/// Stage a new value for an existing item (or replace a staged create's value)
pub async fn edit<S>(
    store: &dyn StageStore,
    strategy: &S,
    cancel: &CancellationToken,
    input: EditInput,
) -> StageResult<EditOutput>
where
    S: ServiceStrategy + ?Sized,
{
    ensure_active(cancel)?;
    let service = strategy.service();
    let name = strategy.parse_name(&input.name)?;
    strategy.validate_value(&name, &input.value)?;

    let existing = store.find_entry(service, &name)?;
    if let Some(entry) = existing.as_ref().filter(|e| e.operation == Operation::Create) {
        let description = input.description.or_else(|| entry.description.clone());
        store.stage_entry(
            service,
            &name,
            Entry::create(input.value).with_description(description),
        )?;
        info!(service = %service, name = %name, "updated staged create");
        return Ok(EditOutput {
            name,
            operation: Some(Operation::Create),
            skipped: false,
        });
    }

    let remote = strategy
        .fetch_current(cancel, &name)
        .await?
        .ok_or_else(|| StageError::NotFound {
            service,
            name: name.clone(),
        })?;
    ensure_active(cancel)?;

    if remote.value == input.value && input.description.is_none() {
        store.unstage_entry(service, &name)?;
        info!(service = %service, name = %name, "value matches remote; nothing staged");
        return Ok(EditOutput {
            name,
            operation: None,
            skipped: true,
        });
    }

    // The first staging fixes the base the change was made against
    let base = match &existing {
        Some(entry) => entry.base_modified_at.or(remote.last_modified),
        None => remote.last_modified,
    };
    let description = input.description.or_else(|| {
        existing
            .as_ref()
            .filter(|e| e.operation == Operation::Update)
            .and_then(|e| e.description.clone())
    });
    store.stage_entry(
        service,
        &name,
        Entry::update(input.value, base).with_description(description),
    )?;
    info!(service = %service, name = %name, "staged update");

    Ok(EditOutput {
        name,
        operation: Some(Operation::Update),
        skipped: false,
    })
}

/// Stage deletion of an existing item
pub async fn delete<S>(
    store: &dyn StageStore,
    strategy: &S,
    cancel: &CancellationToken,
    input: DeleteInput,
) -> StageResult<DeleteOutput>
where
    S: ServiceStrategy + ?Sized,
{
    ensure_active(cancel)?;
    let service = strategy.service();
    let name = strategy.parse_name(&input.name)?;
    let options = strategy.delete_options(input.force, input.recovery_window_days)?;

    let existing = store.find_entry(service, &name)?;
    if existing
        .as_ref()
        .is_some_and(|e| e.operation == Operation::Create)
    {
        store.unstage_entry(service, &name)?;
        store.unstage_tag(service, &name)?;
        info!(service = %service, name = %name, "dropped staged create");
        return Ok(DeleteOutput {
            name,
            unstaged_create: true,
        });
    }

    let remote = strategy
        .fetch_current(cancel, &name)
        .await?
        .ok_or_else(|| StageError::NotFound {
            service,
            name: name.clone(),
        })?;
    ensure_active(cancel)?;

    let base = existing
        .and_then(|e| e.base_modified_at)
        .or(remote.last_modified);
    store.stage_entry(service, &name, Entry::delete(base, options))?;
    info!(service = %service, name = %name, "staged delete");

    Ok(DeleteOutput {
        name,
        unstaged_create: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Service, TagEntry};
    use crate::services::testing::Fixture;

    fn add_input(name: &str, value: &str) -> AddInput {
        AddInput {
            name: name.to_string(),
            value: value.to_string(),
            description: None,
        }
    }

    fn edit_input(name: &str, value: &str) -> EditInput {
        EditInput {
            name: name.to_string(),
            value: value.to_string(),
            description: None,
        }
    }

    fn delete_input(name: &str) -> DeleteInput {
        DeleteInput {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_stages_create() {
        let fx = Fixture::new();
        let params = fx.params();

        let out = add(&fx.store, &*params, &fx.cancel, add_input("/app/new", "v"))
            .await
            .unwrap();
        assert_eq!(out.name, "/app/new");

        let entry = fx.store.get_entry(Service::Parameter, "/app/new").unwrap();
        assert_eq!(entry.operation, Operation::Create);
        assert_eq!(entry.value.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_add_rejects_existing_remote() {
        let fx = Fixture::new();
        fx.remote.seed_parameter("/app/a", "v");

        let err = add(&fx.store, &*fx.params(), &fx.cancel, add_input("/app/a", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_add_twice_overwrites() {
        let fx = Fixture::new();
        let params = fx.params();
        add(&fx.store, &*params, &fx.cancel, add_input("/app/new", "one"))
            .await
            .unwrap();
        add(&fx.store, &*params, &fx.cancel, add_input("/app/new", "two"))
            .await
            .unwrap();

        let entries = fx.store.list_entries(Service::Parameter).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.value.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_add_rejects_item_staged_for_update() {
        let fx = Fixture::new();
        fx.store
            .stage_entry(Service::Parameter, "/app/a", Entry::update("v", None))
            .unwrap();
        let err = add(&fx.store, &*fx.params(), &fx.cancel, add_input("/app/a", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_edit_stages_update_with_base() {
        let fx = Fixture::new();
        let seeded = fx.remote.seed_parameter("/app/a", "old");

        let out = edit(&fx.store, &*fx.params(), &fx.cancel, edit_input("/app/a", "new"))
            .await
            .unwrap();
        assert_eq!(out.operation, Some(Operation::Update));
        assert!(!out.skipped);

        let entry = fx.store.get_entry(Service::Parameter, "/app/a").unwrap();
        assert_eq!(entry.value.as_deref(), Some("new"));
        assert_eq!(entry.base_modified_at, Some(seeded.last_modified));
    }

    #[tokio::test]
    async fn test_edit_keeps_original_base() {
        let fx = Fixture::new();
        let params = fx.params();
        let first = fx.remote.seed_parameter("/app/a", "old");
        edit(&fx.store, &*params, &fx.cancel, edit_input("/app/a", "new"))
            .await
            .unwrap();

        fx.remote.seed_parameter("/app/a", "changed elsewhere");
        edit(&fx.store, &*params, &fx.cancel, edit_input("/app/a", "newer"))
            .await
            .unwrap();

        let entry = fx.store.get_entry(Service::Parameter, "/app/a").unwrap();
        assert_eq!(entry.value.as_deref(), Some("newer"));
        assert_eq!(entry.base_modified_at, Some(first.last_modified));
    }

    #[tokio::test]
    async fn test_edit_identical_value_is_skipped() {
        let fx = Fixture::new();
        let params = fx.params();
        fx.remote.seed_parameter("/app/a", "same");
        fx.store
            .stage_entry(Service::Parameter, "/app/a", Entry::update("other", None))
            .unwrap();

        let out = edit(&fx.store, &*params, &fx.cancel, edit_input("/app/a", "same"))
            .await
            .unwrap();
        assert!(out.skipped);
        assert!(fx.store.find_entry(Service::Parameter, "/app/a").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edit_missing_remote_is_not_found() {
        let fx = Fixture::new();
        let err = edit(&fx.store, &*fx.params(), &fx.cancel, edit_input("/app/x", "v"))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_edit_staged_create_stays_create() {
        let fx = Fixture::new();
        let secrets = fx.secrets();
        add(&fx.store, &*secrets, &fx.cancel, add_input("token", "a"))
            .await
            .unwrap();
        let out = edit(&fx.store, &*secrets, &fx.cancel, edit_input("token", "b"))
            .await
            .unwrap();

        assert_eq!(out.operation, Some(Operation::Create));
        let entry = fx.store.get_entry(Service::Secret, "token").unwrap();
        assert_eq!(entry.operation, Operation::Create);
        assert_eq!(entry.value.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_delete_stages_delete_with_options() {
        let fx = Fixture::new();
        fx.remote.seed_secret("token", "v");

        let input = DeleteInput {
            name: "token".to_string(),
            force: false,
            recovery_window_days: Some(14),
        };
        let out = delete(&fx.store, &*fx.secrets(), &fx.cancel, input)
            .await
            .unwrap();
        assert!(!out.unstaged_create);

        let entry = fx.store.get_entry(Service::Secret, "token").unwrap();
        assert_eq!(entry.operation, Operation::Delete);
        assert!(entry.value.is_none());
        assert_eq!(
            entry.delete_options.and_then(|o| o.recovery_window_days),
            Some(14)
        );
    }

    #[tokio::test]
    async fn test_delete_of_staged_create_unstages() {
        let fx = Fixture::new();
        let params = fx.params();
        add(&fx.store, &*params, &fx.cancel, add_input("/app/new", "v"))
            .await
            .unwrap();
        let mut tag = TagEntry::new();
        tag.add_tags([("env".to_string(), "dev".to_string())]);
        fx.store.stage_tag(Service::Parameter, "/app/new", tag).unwrap();

        let out = delete(&fx.store, &*params, &fx.cancel, delete_input("/app/new"))
            .await
            .unwrap();
        assert!(out.unstaged_create);
        assert!(fx.store.snapshot(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_rejects_param_options() {
        let fx = Fixture::new();
        fx.remote.seed_parameter("/app/a", "v");
        let input = DeleteInput {
            name: "/app/a".to_string(),
            force: true,
            recovery_window_days: None,
        };
        let err = delete(&fx.store, &*fx.params(), &fx.cancel, input)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidDeleteOptions(_)));
    }

    #[tokio::test]
    async fn test_cancelled_add_leaves_store_untouched() {
        let fx = Fixture::new();
        fx.cancel.cancel();
        let err = add(&fx.store, &*fx.params(), &fx.cancel, add_input("/app/new", "v"))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Cancelled));
        assert!(fx.store.snapshot(None).unwrap().is_empty());
    }
}
