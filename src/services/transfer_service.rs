//! Drain / Persist - move staged state between the file and a resident store

use super::{ensure_active, parse_service_filter};
use crate::error::{StageError, StageResult};
use crate::models::{Service, State};
use crate::store::{replace_in, FileStore, StageStore};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrainInput {
    /// Only drain one service's namespace
    #[serde(default)]
    pub service: Option<String>,

    /// Leave the drained records in the file
    #[serde(default)]
    pub keep: bool,

    /// Proceed even when the resident store holds different changes for the same items
    #[serde(default)]
    pub force: bool,

    /// On overlap keep the resident record; otherwise the file's record wins
    #[serde(default)]
    pub merge: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DrainOutput {
    pub entries: usize,
    pub tags: usize,
    /// Some drained items were already staged in the resident store
    pub merged: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersistInput {
    /// Only persist one service's namespace
    #[serde(default)]
    pub service: Option<String>,

    /// Leave the persisted records in the resident store
    #[serde(default)]
    pub keep: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistOutput {
    pub entries: usize,
    pub tags: usize,
}

/// Items present in both states, and those whose pending change differs
fn overlap(file: &State, resident: &State) -> (bool, Vec<String>) {
    let mut any = false;
    let mut differing = Vec::new();
    for (service, name) in file.item_keys() {
        let ours = (resident.entry(service, &name), resident.tag(service, &name));
        if ours == (None, None) {
            continue;
        }
        any = true;

        let theirs = (file.entry(service, &name), file.tag(service, &name));
        let same_entry = match (theirs.0, ours.0) {
            (Some(a), Some(b)) => a.same_change(b),
            (None, None) => true,
            _ => false,
        };
        let same_tag = match (theirs.1, ours.1) {
            (Some(a), Some(b)) => a.same_change(b),
            (None, None) => true,
            _ => false,
        };
        if !(same_entry && same_tag) {
            differing.push(format!("{}:{}", service, name));
        }
    }
    (any, differing)
}

/// Copy the file's records into `resident`; returns how many entries and
/// tags were written
fn combine(resident: &mut State, from_file: &State, merge: bool) -> (usize, usize) {
    let (mut entries, mut tags) = (0, 0);
    for (service, records) in &from_file.entries {
        for (name, entry) in records {
            if merge && resident.entry(*service, name).is_some() {
                continue;
            }
            resident.insert_entry(*service, name.clone(), entry.clone());
            entries += 1;
        }
    }
    for (service, records) in &from_file.tags {
        for (name, tag) in records {
            if merge && resident.tag(*service, name).is_some() {
                continue;
            }
            resident.insert_tag(*service, name.clone(), tag.clone());
            tags += 1;
        }
    }
    (entries, tags)
}

/// Load staged changes from the file into the resident store
///
/// The collision check and the copy run in one store update, so a rejected
/// drain leaves both sides as they were and concurrent staging is kept.
pub fn drain(
    file: &FileStore,
    agent: &dyn StageStore,
    cancel: &CancellationToken,
    input: DrainInput,
) -> StageResult<DrainOutput> {
    ensure_active(cancel)?;
    let target = parse_service_filter(input.service.as_deref())?;
    let on_disk = file.read_state()?;
    let from_file = on_disk.scoped(target);

    let mut output = DrainOutput {
        entries: 0,
        tags: 0,
        merged: false,
    };
    agent.update(&mut |resident| {
        let (merged, collisions) = overlap(&from_file, resident);
        if !collisions.is_empty() && !input.force {
            return Err(StageError::DrainCollision { names: collisions });
        }
        ensure_active(cancel)?;
        let (entries, tags) = combine(resident, &from_file, input.merge);
        output = DrainOutput {
            entries,
            tags,
            merged,
        };
        Ok(())
    })?;

    if !input.keep {
        remove_from_file(file, target, on_disk)?;
    }

    info!(
        path = %file.path().display(),
        entries = output.entries,
        tags = output.tags,
        merged = output.merged,
        "drained staging file"
    );
    Ok(output)
}

/// Drop the drained namespace from the file, given its content as read
fn remove_from_file(file: &FileStore, target: Option<Service>, mut rest: State) -> StageResult<()> {
    let Some(service) = target else {
        return file.delete();
    };
    if !rest.clear_service(service) {
        return Ok(());
    }
    if rest.is_empty() {
        file.delete()
    } else {
        file.write_state(&rest)
    }
}

/// Unstage what was persisted, skipping records re-staged since the snapshot
fn forget_persisted(resident: &mut State, snapshot: &State) {
    for (service, name) in snapshot.item_keys() {
        if let Some(entry) = snapshot.entry(service, &name) {
            if resident.entry(service, &name) == Some(entry) {
                resident.remove_entry(service, &name);
            }
        }
        if let Some(tag) = snapshot.tag(service, &name) {
            if resident.tag(service, &name) == Some(tag) {
                resident.remove_tag(service, &name);
            }
        }
    }
}

/// Save the resident store's staged changes to the file
///
/// A service-scoped persist only replaces that namespace in the file.
pub fn persist(
    file: &FileStore,
    agent: &dyn StageStore,
    cancel: &CancellationToken,
    input: PersistInput,
) -> StageResult<PersistOutput> {
    ensure_active(cancel)?;
    let target = parse_service_filter(input.service.as_deref())?;
    let snapshot = agent.snapshot(target)?;
    let output = PersistOutput {
        entries: snapshot.entry_count(),
        tags: snapshot.tag_count(),
    };
    if snapshot.is_empty() {
        return Ok(output);
    }

    let state = match target {
        None => snapshot.clone(),
        Some(service) => {
            let mut existing = file.read_state()?;
            replace_in(&mut existing, Some(service), snapshot.clone());
            existing
        }
    };

    ensure_active(cancel)?;
    file.write_state(&state)?;

    if !input.keep {
        agent.update(&mut |resident| {
            forget_persisted(resident, &snapshot);
            Ok(())
        })?;
    }

    info!(
        path = %file.path().display(),
        entries = output.entries,
        tags = output.tags,
        "persisted staged changes"
    );
    Ok(output)
}
