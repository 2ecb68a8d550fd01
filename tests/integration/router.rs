//! Session lifecycle and dispatch through the storage router.

use crate::support::{harness, harness_with_store};
use notestore::driver::DriverKind;
use notestore::session::{MemorySessionStore, SessionStore};
use notestore::{Node, SelectOptions, SessionState, StorageError};
use std::sync::Arc;
use tempfile::TempDir;

fn migrate() -> SelectOptions {
    SelectOptions {
        migrate: true,
        continue_on_error: false,
    }
}

#[tokio::test]
async fn operations_fail_before_a_backend_is_chosen() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    assert_eq!(h.router.state(), SessionState::Uninitialized);
    let err = h.router.list().await.unwrap_err();
    assert!(matches!(err, StorageError::NotConfigured), "{:?}", err);
}

#[tokio::test]
async fn sandbox_selection_is_persisted() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    let outcome = h
        .router
        .select_backend(DriverKind::Sandbox, SelectOptions::default())
        .await
        .unwrap();
    assert!(outcome.switched);
    assert!(outcome.migration.is_none());
    assert_eq!(h.router.state(), SessionState::Active(DriverKind::Sandbox));

    let record = h.store.load().unwrap().unwrap();
    assert_eq!(record.mode, DriverKind::Sandbox);
    assert_eq!(record.local_root, None);

    h.router.create(Node::file(None, "hello", "world")).await.unwrap();
    assert!(temp.path().join("sandbox").join("hello.md").is_file());
}

#[tokio::test]
async fn local_selection_uses_the_picked_folder() {
    let temp = TempDir::new().unwrap();
    let folder = temp.path().join("my notes");
    std::fs::create_dir(&folder).unwrap();
    let h = harness(temp.path(), Some(folder.clone()));

    h.router
        .select_backend(DriverKind::Local, SelectOptions::default())
        .await
        .unwrap();
    let canonical = dunce::canonicalize(&folder).unwrap();
    assert_eq!(h.router.local_root(), Some(canonical.clone()));
    assert_eq!(h.store.load().unwrap().unwrap().local_root, Some(canonical));

    h.router
        .create(Node::file(Some("work"), "todo", "x"))
        .await
        .unwrap();
    assert!(folder.join("work").join("todo.md").is_file());
}

#[tokio::test]
async fn missing_local_folder_is_rejected() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), Some(temp.path().join("nope")));
    assert!(h
        .router
        .select_backend(DriverKind::Local, SelectOptions::default())
        .await
        .is_err());
    assert_eq!(h.router.state(), SessionState::Uninitialized);
    assert!(h.store.load().unwrap().is_none());
}

#[tokio::test]
async fn switching_with_migration_copies_everything() {
    let temp = TempDir::new().unwrap();
    let folder = temp.path().join("local");
    std::fs::create_dir(&folder).unwrap();
    let h = harness(temp.path(), Some(folder.clone()));

    h.router
        .select_backend(DriverKind::Sandbox, SelectOptions::default())
        .await
        .unwrap();
    h.router
        .create(Node::file(Some("work"), "todo", "- [ ] buy milk"))
        .await
        .unwrap();
    h.router.create(Node::folder(None, "empty")).await.unwrap();
    h.router.create(Node::file(None, "inbox", "hi")).await.unwrap();

    let outcome = h
        .router
        .select_backend(DriverKind::Local, migrate())
        .await
        .unwrap();
    assert!(outcome.switched);
    let report = outcome.migration.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.copied.len(), 4);

    assert_eq!(h.router.read("work/todo").await.unwrap(), "- [ ] buy milk");
    assert!(folder.join("empty").is_dir());

    // The source is left untouched.
    assert!(temp.path().join("sandbox").join("inbox.md").is_file());
}

#[tokio::test]
async fn failed_migration_keeps_the_current_backend() {
    let temp = TempDir::new().unwrap();
    let folder = temp.path().join("local");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("inbox.md"), "already here").unwrap();
    let h = harness(temp.path(), Some(folder.clone()));

    h.router
        .select_backend(DriverKind::Sandbox, SelectOptions::default())
        .await
        .unwrap();
    h.router.create(Node::file(None, "inbox", "from sandbox")).await.unwrap();

    let outcome = h
        .router
        .select_backend(DriverKind::Local, migrate())
        .await
        .unwrap();
    assert!(!outcome.switched);
    let report = outcome.migration.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0].1, StorageError::AlreadyExists(_)));
    assert_eq!(h.router.state(), SessionState::Active(DriverKind::Sandbox));
    assert_eq!(h.store.load().unwrap().unwrap().mode, DriverKind::Sandbox);

    let outcome = h
        .router
        .select_backend(
            DriverKind::Local,
            SelectOptions {
                migrate: true,
                continue_on_error: true,
            },
        )
        .await
        .unwrap();
    assert!(outcome.switched);
    assert_eq!(h.router.read("inbox").await.unwrap(), "already here");
}

#[tokio::test]
async fn resume_restores_the_saved_session() {
    let temp = TempDir::new().unwrap();
    let folder = temp.path().join("local");
    std::fs::create_dir(&folder).unwrap();
    let store = Arc::new(MemorySessionStore::new());

    let first = harness_with_store(temp.path(), Some(folder.clone()), store.clone());
    first
        .router
        .select_backend(DriverKind::Local, SelectOptions::default())
        .await
        .unwrap();
    first.router.create(Node::file(None, "kept", "yes")).await.unwrap();

    let second = harness_with_store(temp.path(), None, store);
    assert_eq!(
        second.router.resume().await.unwrap(),
        SessionState::Active(DriverKind::Local)
    );
    assert_eq!(second.router.read("kept").await.unwrap(), "yes");
}

#[tokio::test]
async fn lost_folder_requires_reauthorization() {
    let temp = TempDir::new().unwrap();
    let folder = temp.path().join("local");
    std::fs::create_dir(&folder).unwrap();
    let store = Arc::new(MemorySessionStore::new());

    let first = harness_with_store(temp.path(), Some(folder.clone()), store.clone());
    first
        .router
        .select_backend(DriverKind::Local, SelectOptions::default())
        .await
        .unwrap();
    std::fs::remove_dir_all(&folder).unwrap();

    let second = harness_with_store(temp.path(), None, store.clone());
    assert_eq!(
        second.router.resume().await.unwrap(),
        SessionState::RequiresReauthorization(DriverKind::Local)
    );
    let err = second.router.list().await.unwrap_err();
    assert!(matches!(err, StorageError::PermissionDenied(_)), "{:?}", err);
    // The record is kept so the folder can be granted again.
    assert!(store.load().unwrap().is_some());

    std::fs::create_dir(&folder).unwrap();
    assert_eq!(
        second.router.reauthorize().await.unwrap(),
        SessionState::Active(DriverKind::Local)
    );
    assert!(second.router.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn disconnect_forgets_the_session_but_not_the_notes() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    h.router
        .select_backend(DriverKind::Cloud, SelectOptions::default())
        .await
        .unwrap();
    h.router.create(Node::file(None, "a", "1")).await.unwrap();
    let objects = h.drive.object_count();

    h.router.disconnect().unwrap();
    assert_eq!(h.router.state(), SessionState::Uninitialized);
    assert!(h.store.load().unwrap().is_none());
    assert!(!h.router.backends().tokens().has_token());
    assert_eq!(h.drive.object_count(), objects);
    assert!(matches!(
        h.router.read("a").await.unwrap_err(),
        StorageError::NotConfigured
    ));
}

#[tokio::test]
async fn backup_moves_notes_between_backends() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    h.router
        .select_backend(DriverKind::Sandbox, SelectOptions::default())
        .await
        .unwrap();
    h.router
        .create(Node::file(Some("work"), "todo", "- [ ] buy milk"))
        .await
        .unwrap();
    let json = h.router.export_backup().await.unwrap().to_json().unwrap();

    h.router
        .select_backend(DriverKind::Cloud, SelectOptions::default())
        .await
        .unwrap();
    h.router.create(Node::file(None, "stale", "gone soon")).await.unwrap();

    let backup = notestore::backup::Backup::from_json(&json).unwrap();
    let report = h.router.restore_backup(&backup).await.unwrap();
    assert!(report.is_complete());

    let mut ids: Vec<String> = h.router.list().await.unwrap().into_iter().map(|n| n.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["work".to_string(), "work/todo".to_string()]);
    assert_eq!(h.router.read("work/todo").await.unwrap(), "- [ ] buy milk");
}

#[tokio::test]
async fn writes_to_one_note_land_in_call_order() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    h.router
        .select_backend(DriverKind::Sandbox, SelectOptions::default())
        .await
        .unwrap();
    h.router.create(Node::file(None, "log", "")).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..10 {
        let router = h.router.clone();
        tasks.push(tokio::spawn(async move {
            router.write("log", &format!("version {}", i)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(h.router.read("log").await.unwrap(), "version 9");
}

#[tokio::test]
async fn rename_then_remove_by_new_id() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    h.router
        .select_backend(DriverKind::Sandbox, SelectOptions::default())
        .await
        .unwrap();
    h.router
        .create(Node::file(Some("work"), "todo", "x"))
        .await
        .unwrap();

    let renamed = h.router.rename("work", "jobs").await.unwrap();
    assert_eq!(renamed.id, "jobs");
    assert_eq!(h.router.read("jobs/todo").await.unwrap(), "x");

    h.router.remove("jobs/todo").await.unwrap();
    h.router.remove("jobs/todo").await.unwrap();
    let ids: Vec<String> = h.router.list().await.unwrap().into_iter().map(|n| n.id).collect();
    assert_eq!(ids, vec!["jobs".to_string()]);
}

#[tokio::test]
async fn names_are_validated_before_dispatch() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    h.router
        .select_backend(DriverKind::Sandbox, SelectOptions::default())
        .await
        .unwrap();
    h.router.create(Node::file(None, "a", "")).await.unwrap();
    for bad in ["", "a/b", ".hidden", ".."] {
        assert!(
            matches!(
                h.router.rename("a", bad).await,
                Err(StorageError::InvalidName(_))
            ),
            "{:?} accepted",
            bad
        );
    }
}
