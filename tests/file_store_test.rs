//! Integration tests for the file store and the drain/persist protocol

use paramstage::models::{Entry, Service, State, TagEntry};
use paramstage::services::{self, DrainInput, PersistInput};
use paramstage::store::{FileStore, MemoryStore, Passphrase, StageStore};
use paramstage::StageError;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn config_state(value: &str) -> State {
    let mut state = State::new();
    state.insert_entry(Service::Parameter, "/app/config", Entry::update(value, None));
    state
}

#[test]
fn test_round_trip_plain() {
    let dir = TempDir::new().unwrap();
    let file = FileStore::new(dir.path().join("stage.json"));

    file.write_state(&config_state("test-value")).unwrap();
    assert!(!file.is_encrypted().unwrap());

    let state = file.drain(false).unwrap();
    let entry = state.entry(Service::Parameter, "/app/config").unwrap();
    assert_eq!(entry.value.as_deref(), Some("test-value"));
    assert!(!file.exists());
}

#[test]
fn test_round_trip_encrypted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stage.json");
    let file = FileStore::new(&path).with_passphrase(Some(Passphrase::new("correct horse")));

    file.write_state(&config_state("test-value")).unwrap();
    assert!(file.is_encrypted().unwrap());

    let raw = std::fs::read(&path).unwrap();
    assert!(!String::from_utf8_lossy(&raw).contains("test-value"));

    let wrong = FileStore::new(&path).with_passphrase(Some(Passphrase::new("battery staple")));
    assert!(matches!(wrong.drain(true), Err(StageError::DecryptionFailed)));

    let missing = FileStore::new(&path);
    assert!(matches!(missing.drain(true), Err(StageError::PassphraseRequired)));

    let state = file.drain(false).unwrap();
    let entry = state.entry(Service::Parameter, "/app/config").unwrap();
    assert_eq!(entry.value.as_deref(), Some("test-value"));
}

#[test]
fn test_drain_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let file = FileStore::new(dir.path().join("nothing-here.json"));
    assert!(file.drain(false).unwrap().is_empty());
    assert!(file.drain(true).unwrap().is_empty());
}

#[test]
fn test_write_replaces_previous_content() {
    let dir = TempDir::new().unwrap();
    let file = FileStore::new(dir.path().join("stage.json"));

    let mut a = State::new();
    a.insert_entry(Service::Parameter, "/app/a", Entry::create("a"));
    let mut b = State::new();
    b.insert_entry(Service::Secret, "b", Entry::create("b"));

    file.write_state(&a).unwrap();
    file.write_state(&b).unwrap();

    let state = file.drain(false).unwrap();
    assert!(state.entry(Service::Parameter, "/app/a").is_none());
    assert!(state.entry(Service::Secret, "b").is_some());
}

#[test]
fn test_persist_then_drain_hand_off() {
    let dir = TempDir::new().unwrap();
    let file = FileStore::new(dir.path().join("stage.json"));
    let cancel = CancellationToken::new();

    let session = MemoryStore::new();
    session
        .stage_entry(Service::Parameter, "/app/config", Entry::create("v"))
        .unwrap();
    let mut tag = TagEntry::new();
    tag.add_tags([("env".to_string(), "prod".to_string())]);
    session.stage_tag(Service::Parameter, "/app/config", tag).unwrap();

    let out = services::persist(&file, &session, &cancel, PersistInput::default()).unwrap();
    assert_eq!((out.entries, out.tags), (1, 1));
    assert!(session.snapshot(None).unwrap().is_empty());

    let next = MemoryStore::new();
    let out = services::drain(&file, &next, &cancel, DrainInput::default()).unwrap();
    assert_eq!((out.entries, out.tags), (1, 1));
    assert!(!out.merged);
    assert!(!file.exists());

    let entry = next.get_entry(Service::Parameter, "/app/config").unwrap();
    assert_eq!(entry.value.as_deref(), Some("v"));
}

#[test]
fn test_drain_collision_requires_force() {
    let dir = TempDir::new().unwrap();
    let file = FileStore::new(dir.path().join("stage.json"));
    let cancel = CancellationToken::new();
    file.write_state(&config_state("from-file")).unwrap();

    let session = MemoryStore::new();
    session
        .stage_entry(Service::Parameter, "/app/config", Entry::update("in-session", None))
        .unwrap();

    let err = services::drain(&file, &session, &cancel, DrainInput::default()).unwrap_err();
    assert!(matches!(err, StageError::DrainCollision { .. }));
    assert!(file.exists());
    let entry = session.get_entry(Service::Parameter, "/app/config").unwrap();
    assert_eq!(entry.value.as_deref(), Some("in-session"));

    let out = services::drain(
        &file,
        &session,
        &cancel,
        DrainInput {
            force: true,
            merge: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(out.merged);
    let entry = session.get_entry(Service::Parameter, "/app/config").unwrap();
    assert_eq!(entry.value.as_deref(), Some("in-session"));
}

#[test]
fn test_cancelled_persist_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let file = FileStore::new(dir.path().join("stage.json"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let session = MemoryStore::new();
    session
        .stage_entry(Service::Secret, "token", Entry::create("t"))
        .unwrap();

    let err = services::persist(&file, &session, &cancel, PersistInput::default()).unwrap_err();
    assert!(matches!(err, StageError::Cancelled));
    assert!(!file.exists());
    assert!(session.get_entry(Service::Secret, "token").is_ok());
}
