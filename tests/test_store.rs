//! Tests for the credential stores

use std::collections::BTreeMap;

use guard_dispatch::store::{CredentialStore, JsonFileStore, MemoryCredentialStore, StoreKey};
use guard_dispatch::{GuardId, GuardSession, GuardStatus, ReportId, TokenPair};

fn session() -> GuardSession {
    GuardSession {
        guard_id: Some(GuardId::new(42)),
        status: GuardStatus::Intervention,
        access_token: Some("access".into()),
        refresh_token: Some("refresh".into()),
        last_report_id: Some(ReportId::new(7)),
    }
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("credentials.json");

    let store = JsonFileStore::open(&path).unwrap();
    assert_eq!(store.load_session().unwrap(), GuardSession::default());
    store.save_session(&session()).unwrap();
    drop(store);

    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(reopened.load_session().unwrap(), session());
    assert_eq!(reopened.path(), path.as_path());
}

#[test]
fn test_file_store_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let store = JsonFileStore::open(&path).unwrap();

    store.save_session(&GuardSession {
        last_report_id: None,
        ..session()
    })
    .unwrap();

    let raw: BTreeMap<String, String> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["guard_id"], "42");
    assert_eq!(raw["guard_status"], "2");
    assert_eq!(raw["last_report_id"], "-1");
    assert_eq!(raw["access_token"], "access");
}

#[cfg(unix)]
#[test]
fn test_file_store_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let store = JsonFileStore::open(&path).unwrap();
    store.set(StoreKey::AccessToken, "secret").unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_file_store_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    std::fs::write(&path, "not json").unwrap();

    assert!(JsonFileStore::open(&path).is_err());
}

#[test]
fn test_clear_removes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let store = JsonFileStore::open(&path).unwrap();
    store.save_session(&session()).unwrap();

    store.clear().unwrap();

    assert_eq!(store.load_session().unwrap(), GuardSession::default());
    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(reopened.guard_id().unwrap(), None);
}

#[test]
fn test_failed_write_leaves_values_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let store = JsonFileStore::open(&path).unwrap();
    store.set(StoreKey::GuardId, "42").unwrap();

    // A directory where the file should be makes every write fail
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    assert!(store.set(StoreKey::AccessToken, "access").is_err());
    assert!(store.clear().is_err());
    assert_eq!(store.get(StoreKey::AccessToken).unwrap(), None);
    assert_eq!(store.guard_id().unwrap(), Some(GuardId::new(42)));

    std::fs::remove_dir(&path).unwrap();
    store.set(StoreKey::Status, "0").unwrap();
    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(reopened.get(StoreKey::GuardId).unwrap().as_deref(), Some("42"));
    assert_eq!(reopened.get(StoreKey::AccessToken).unwrap(), None);
}

#[test]
fn test_access_only_refresh_keeps_refresh_token() {
    let store = MemoryCredentialStore::new();
    store.save_session(&session()).unwrap();

    store.save_tokens(&TokenPair::new("access-2", None)).unwrap();

    assert_eq!(store.access_token().unwrap().as_deref(), Some("access-2"));
    assert_eq!(store.refresh_token().unwrap().as_deref(), Some("refresh"));
}

#[test]
fn test_unreadable_values_fall_back() {
    let store = MemoryCredentialStore::new();
    assert!(store.is_empty());
    assert_eq!(store.status().unwrap(), GuardStatus::Unavailable);

    store.set(StoreKey::Status, "9").unwrap();
    store.set(StoreKey::GuardId, "guard").unwrap();
    store.set(StoreKey::LastReportId, "-1").unwrap();

    assert_eq!(store.status().unwrap(), GuardStatus::Unavailable);
    assert_eq!(store.guard_id().unwrap(), None);
    assert_eq!(store.last_report_id().unwrap(), None);
    assert_eq!(store.len(), 3);
}

#[test]
fn test_key_names() {
    for key in StoreKey::ALL {
        assert_eq!(StoreKey::from_name(key.as_str()), Some(key));
    }
    assert_eq!(StoreKey::from_name("password"), None);
}
