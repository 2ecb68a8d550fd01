//! The same behavior checks run against every driver.

use notestore::driver::cloud::auth::TokenCache;
use notestore::driver::cloud::{MemoryDriveApi, StaticTokenProvider};
use notestore::driver::{CloudDriver, DriverKind, FsDirectory, HandleDriver, StorageDriver};
use notestore::node::path;
use notestore::{Node, NodeKind, StorageError};
use std::sync::Arc;
use tempfile::TempDir;

async fn handle_driver(temp: &TempDir, native_move: bool) -> HandleDriver {
    let root = FsDirectory::open_or_create(temp.path())
        .await
        .unwrap()
        .with_native_move(native_move);
    HandleDriver::new(DriverKind::Local, Arc::new(root), "md")
}

fn cloud_driver() -> CloudDriver {
    let provider = Arc::new(StaticTokenProvider::new("token", chrono::Duration::hours(1)));
    let auth = Arc::new(TokenCache::new(provider, chrono::Duration::seconds(60)));
    CloudDriver::new(Arc::new(MemoryDriveApi::new()), auth, "Notes", "md")
}

fn find<'a>(nodes: &'a [Node], id: &str) -> Option<&'a Node> {
    nodes.iter().find(|n| n.id == id)
}

async fn content_of(driver: &dyn StorageDriver, node: &Node) -> String {
    match node.content {
        Some(ref content) => content.clone(),
        None => driver.get_content(&node.id).await.unwrap(),
    }
}

/// Scenarios 1 to 3: create, rename in place, move to root.
async fn create_rename_move(driver: &dyn StorageDriver) {
    driver.create(&Node::folder(None, "work")).await.unwrap();
    let todo = driver
        .create(&Node::file(Some("work"), "todo", "- [ ] buy milk"))
        .await
        .unwrap();

    let nodes = driver.list_all().await.unwrap();
    assert_eq!(nodes.len(), 2, "{:?}", driver.kind());
    let work = find(&nodes, "work").unwrap();
    assert_eq!(work.kind, NodeKind::Folder);
    assert_eq!(work.parent_id, None);
    let listed = find(&nodes, "work/todo").unwrap();
    assert_eq!(listed.kind, NodeKind::File);
    assert_eq!(listed.parent_id.as_deref(), Some("work"));
    assert_eq!(content_of(driver, listed).await, "- [ ] buy milk");

    let renamed = driver.rename("work/todo", "groceries", &todo).await.unwrap();
    assert_eq!(renamed.id, path::join(todo.parent_id.as_deref(), "groceries"));
    assert_eq!(renamed.id, "work/groceries");
    assert_eq!(renamed.parent_id.as_deref(), Some("work"));
    assert_eq!(driver.get_content("work/groceries").await.unwrap(), "- [ ] buy milk");

    let moved = driver.move_node("work/groceries", None, &renamed).await.unwrap();
    assert_eq!(moved.id, "groceries");
    assert_eq!(moved.parent_id, None);
    assert_eq!(driver.get_content("groceries").await.unwrap(), "- [ ] buy milk");

    let ids: Vec<String> = driver
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert!(ids.contains(&"groceries".to_string()));
    assert!(!ids.contains(&"work/groceries".to_string()));
}

async fn delete_removes_subtree(driver: &dyn StorageDriver) {
    driver.create(&Node::folder(None, "archive")).await.unwrap();
    driver
        .create(&Node::file(Some("archive/2023"), "q1", "old"))
        .await
        .unwrap();
    driver.delete("archive", NodeKind::Folder).await.unwrap();

    let nodes = driver.list_all().await.unwrap();
    assert!(nodes
        .iter()
        .all(|n| n.id != "archive" && !path::is_descendant(&n.id, "archive")));
    // Deleting again is not an error.
    driver.delete("archive", NodeKind::Folder).await.unwrap();
}

async fn create_is_unique(driver: &dyn StorageDriver) {
    driver.create(&Node::file(None, "inbox", "a")).await.unwrap();
    let err = driver.create(&Node::file(None, "inbox", "b")).await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists(_)), "{:?}", err);
    assert_eq!(driver.get_content("inbox").await.unwrap(), "a");
}

async fn update_content_keeps_id(driver: &dyn StorageDriver) {
    driver.create(&Node::file(None, "draft", "v1")).await.unwrap();
    let updated = driver.update_content("draft", "v2").await.unwrap();
    assert_eq!(updated.id, "draft");
    assert_eq!(driver.get_content("draft").await.unwrap(), "v2");

    let err = driver.update_content("missing", "x").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)), "{:?}", err);
}

async fn folder_move_keeps_structure(driver: &dyn StorageDriver) {
    let project = driver.create(&Node::folder(None, "project")).await.unwrap();
    driver
        .create(&Node::file(Some("project/notes"), "a", "alpha"))
        .await
        .unwrap();
    driver.create(&Node::folder(None, "done")).await.unwrap();

    let moved = driver.move_node("project", Some("done"), &project).await.unwrap();
    assert_eq!(moved.id, "done/project");

    let nodes = driver.list_all().await.unwrap();
    assert!(find(&nodes, "done/project/notes").is_some());
    assert!(find(&nodes, "project").is_none());
    assert_eq!(driver.get_content("done/project/notes/a").await.unwrap(), "alpha");
}

#[tokio::test]
async fn sandbox_with_native_move() {
    let temp = TempDir::new().unwrap();
    let driver = handle_driver(&temp, true).await;
    create_rename_move(&driver).await;
    delete_removes_subtree(&driver).await;
    create_is_unique(&driver).await;
    update_content_keeps_id(&driver).await;
    folder_move_keeps_structure(&driver).await;
}

#[tokio::test]
async fn local_folder_without_native_move() {
    let temp = TempDir::new().unwrap();
    let driver = handle_driver(&temp, false).await;
    create_rename_move(&driver).await;
    delete_removes_subtree(&driver).await;
    create_is_unique(&driver).await;
    update_content_keeps_id(&driver).await;

    // Folders cannot be relocated by copy.
    let folder = driver.create(&Node::folder(None, "project")).await.unwrap();
    let err = driver.rename("project", "renamed", &folder).await.unwrap_err();
    assert!(matches!(err, StorageError::Unsupported(_)), "{:?}", err);
    assert!(temp.path().join("project").is_dir());
}

#[tokio::test]
async fn cloud_object_store() {
    let driver = cloud_driver();
    create_rename_move(&driver).await;
    delete_removes_subtree(&driver).await;
    create_is_unique(&driver).await;
    update_content_keeps_id(&driver).await;
    folder_move_keeps_structure(&driver).await;
}

#[tokio::test]
async fn lazy_local_listing_fetches_on_demand() {
    let temp = TempDir::new().unwrap();
    let driver = handle_driver(&temp, true).await.with_lazy_content(true);
    driver.create(&Node::file(None, "note", "body")).await.unwrap();

    let nodes = driver.list_all().await.unwrap();
    assert!(nodes[0].is_unloaded());
    assert_eq!(content_of(&driver, &nodes[0]).await, "body");
}

#[tokio::test]
async fn picked_folder_with_same_stem_entries_lists_unique_ids() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("foo").join("bar")).unwrap();
    std::fs::write(temp.path().join("foo.md"), "note").unwrap();
    std::fs::write(temp.path().join("foo").join("bar.md"), "note").unwrap();
    let driver = handle_driver(&temp, true).await;

    let nodes = driver.list_all().await.unwrap();
    let ids: std::collections::HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids.len(), nodes.len(), "{:?}", nodes);
    assert!(ids.contains("foo"));
}

#[tokio::test]
async fn invalid_parents_are_rejected_by_every_driver() {
    let temp = TempDir::new().unwrap();
    let local = handle_driver(&temp, true).await;
    let cloud = cloud_driver();
    let drivers: [&dyn StorageDriver; 2] = [&local, &cloud];
    for driver in drivers {
        for parent in [".hidden", "a//b"] {
            let err = driver
                .create(&Node::file(Some(parent), "x", "c"))
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::InvalidName(_)), "{:?}", err);
        }
        assert!(driver.list_all().await.unwrap().is_empty());
    }
}
