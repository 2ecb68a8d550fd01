//! Cloud backend behind the router, over the in-memory Drive.

use crate::support::harness;
use notestore::driver::cloud::api::TOP_LEVEL;
use notestore::driver::cloud::memory::CallCounts;
use notestore::driver::DriverKind;
use notestore::{Node, NodeKind, SelectOptions, StorageError};
use tempfile::TempDir;

#[tokio::test]
async fn notes_survive_a_new_session_on_the_same_drive() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    h.router
        .select_backend(DriverKind::Cloud, SelectOptions::default())
        .await
        .unwrap();
    h.router
        .create(Node::file(Some("journal"), "monday", "rain"))
        .await
        .unwrap();

    // Disconnect, then a fresh driver resolves the same root folder.
    h.router.disconnect().unwrap();
    h.router
        .select_backend(DriverKind::Cloud, SelectOptions::default())
        .await
        .unwrap();
    let nodes = h.router.list().await.unwrap();
    let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    assert!(ids.contains(&"journal"));
    assert!(ids.contains(&"journal/monday"));
    assert_eq!(h.router.read("journal/monday").await.unwrap(), "rain");
}

#[tokio::test]
async fn foreign_objects_are_invisible() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    let root = h.drive.seed_folder("Notes", TOP_LEVEL);
    h.drive.seed_file("keep.md", &root, "mine");
    h.drive.seed_file("photo.jpg", &root, "binary");
    h.drive.seed_file(".hidden.md", &root, "secret");
    h.drive.seed_file("loose.md", TOP_LEVEL, "not in the notes folder");

    h.router
        .select_backend(DriverKind::Cloud, SelectOptions::default())
        .await
        .unwrap();
    let nodes = h.router.list().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].id, "keep");
    assert_eq!(nodes[0].content.as_deref(), Some("mine"));
}

#[tokio::test]
async fn rename_and_move_keep_the_object() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    h.router
        .select_backend(DriverKind::Cloud, SelectOptions::default())
        .await
        .unwrap();
    let created = h
        .router
        .create(Node::file(Some("work"), "todo", "- [ ] buy milk"))
        .await
        .unwrap();
    let object_id = created.object_id().unwrap().to_string();
    let before = h.drive.object_count();

    let renamed = h.router.rename("work/todo", "groceries").await.unwrap();
    assert_eq!(renamed.object_id(), Some(object_id.as_str()));
    let moved = h.router.move_node("work/groceries", None).await.unwrap();
    assert_eq!(moved.id, "groceries");
    assert_eq!(moved.object_id(), Some(object_id.as_str()));

    assert_eq!(h.drive.object_count(), before);
    assert_eq!(CallCounts::get(&h.drive.calls().patch_metadata), 2);
    assert_eq!(CallCounts::get(&h.drive.calls().create_file), 1);
    let stored = h.drive.object(&object_id).unwrap();
    assert_eq!(stored.name, "groceries.md");
}

#[tokio::test]
async fn root_folder_is_resolved_once_per_session() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    h.router
        .select_backend(DriverKind::Cloud, SelectOptions::default())
        .await
        .unwrap();
    for name in ["a", "b", "c"] {
        h.router.create(Node::file(None, name, name)).await.unwrap();
    }
    h.router.list().await.unwrap();
    assert_eq!(CallCounts::get(&h.drive.calls().find_folder), 1);
    assert_eq!(CallCounts::get(&h.drive.calls().create_folder), 1);
}

#[tokio::test]
async fn revoked_token_surfaces_as_auth_required() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    h.router
        .select_backend(DriverKind::Cloud, SelectOptions::default())
        .await
        .unwrap();
    h.router.create(Node::file(None, "a", "")).await.unwrap();
    assert!(h.router.backends().tokens().has_token());

    h.drive.set_accepted_token(Some("something-else"));
    let err = h.router.list().await.unwrap_err();
    assert!(matches!(err, StorageError::AuthRequired(_)), "{:?}", err);
    assert!(!h.router.backends().tokens().has_token());
}

#[tokio::test]
async fn removing_a_folder_removes_its_objects() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    h.router
        .select_backend(DriverKind::Cloud, SelectOptions::default())
        .await
        .unwrap();
    h.router
        .create(Node::file(Some("old/deep"), "x", "1"))
        .await
        .unwrap();
    h.router.create(Node::file(None, "kept", "2")).await.unwrap();
    assert_eq!(h.router.kind_of("old").await.unwrap(), NodeKind::Folder);

    h.router.remove("old").await.unwrap();
    let ids: Vec<String> = h.router.list().await.unwrap().into_iter().map(|n| n.id).collect();
    assert_eq!(ids, vec!["kept".to_string()]);
    // Notes root plus "kept.md".
    assert_eq!(h.drive.object_count(), 2);
}
