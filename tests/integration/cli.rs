//! CLI parsing and command execution against a temp sandbox.

use crate::support::harness;
use clap::Parser;
use notestore::tooling::{BackendArg, Cli, CliContext, Commands};
use notestore::driver::cloud::memory::CallCounts;
use notestore::driver::DriverKind;
use notestore::{Node, SelectOptions, StorageError};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn parse(args: &[&str]) -> Commands {
    let mut argv = vec!["notes"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().command
}

#[test]
fn parses_every_backend() {
    assert_eq!(
        parse(&["use", "sandbox"]),
        Commands::Use {
            backend: BackendArg::Sandbox,
            migrate: false,
            continue_on_error: false
        }
    );
    assert_eq!(
        parse(&["use", "--migrate", "--continue-on-error", "cloud"]),
        Commands::Use {
            backend: BackendArg::Cloud,
            migrate: true,
            continue_on_error: true
        }
    );
    assert_eq!(
        parse(&["use", "local", "./notes"]).picked_folder(),
        Some(PathBuf::from("./notes"))
    );
}

#[test]
fn parses_node_commands() {
    assert_eq!(
        parse(&["new-file", "work/todo", "--content", "x", "--unique"]),
        Commands::NewFile {
            id: "work/todo".to_string(),
            content: "x".to_string(),
            unique: true
        }
    );
    assert_eq!(
        parse(&["mv", "a/b", "c"]),
        Commands::Mv {
            id: "a/b".to_string(),
            parent: Some("c".to_string())
        }
    );
    assert_eq!(
        parse(&["import", "backup.json", "--yes"]),
        Commands::Import {
            file: PathBuf::from("backup.json"),
            yes: true
        }
    );
    assert_eq!(
        parse(&["stream", "journal/today"]),
        Commands::Stream {
            id: "journal/today".to_string()
        }
    );
    assert_eq!(parse(&["ls"]).picked_folder(), None);
}

#[test]
fn rejects_malformed_invocations() {
    for argv in [
        vec!["notes"],
        vec!["notes", "use"],
        vec!["notes", "use", "ftp"],
        vec!["notes", "use", "local"],
        vec!["notes", "cat"],
        vec!["notes", "rename", "only-id"],
        vec!["notes", "ls", "--bogus"],
    ] {
        assert!(Cli::try_parse_from(argv.clone()).is_err(), "{:?} parsed", argv);
    }
}

#[tokio::test]
async fn commands_run_against_the_router() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    let cli = CliContext::from_router(h.router.clone());

    let out = cli.execute(&parse(&["ls"])).await;
    assert!(out.is_err());
    assert!(cli.execute(&parse(&["status"])).await.unwrap().contains("not connected"));

    let out = cli.execute(&parse(&["use", "sandbox"])).await.unwrap();
    assert_eq!(out, "Now using sandbox");
    cli.execute(&parse(&["new-folder", "work"])).await.unwrap();
    cli.execute(&parse(&["new-file", "work/todo", "--content", "milk"]))
        .await
        .unwrap();
    let out = cli
        .execute(&parse(&["new-file", "work/todo", "--unique"]))
        .await
        .unwrap();
    assert_eq!(out, "Created work/todo 1");

    assert_eq!(cli.execute(&parse(&["cat", "work/todo"])).await.unwrap(), "milk");
    assert_eq!(
        cli.execute(&parse(&["tree"])).await.unwrap(),
        "work/\n  todo\n  todo 1\n"
    );

    cli.execute(&parse(&["write", "work/todo", "eggs"])).await.unwrap();
    cli.execute(&parse(&["rename", "work/todo", "groceries"])).await.unwrap();
    cli.execute(&parse(&["mv", "work/groceries"])).await.unwrap();
    assert_eq!(cli.execute(&parse(&["cat", "groceries"])).await.unwrap(), "eggs");

    let backup = temp.path().join("backup.json");
    let backup_arg = backup.to_str().unwrap();
    let out = cli.execute(&parse(&["export", backup_arg])).await.unwrap();
    assert!(out.starts_with("Exported 3 nodes"), "{}", out);

    cli.execute(&parse(&["rm", "work"])).await.unwrap();
    cli.execute(&parse(&["rm", "groceries"])).await.unwrap();
    assert_eq!(cli.execute(&parse(&["tree"])).await.unwrap(), "No notes yet.");

    let out = cli
        .execute(&parse(&["import", backup_arg, "--yes"]))
        .await
        .unwrap();
    assert_eq!(out, "Restored 3 nodes");
    assert_eq!(cli.execute(&parse(&["cat", "work/todo 1"])).await.unwrap(), "");

    let out = cli.execute(&parse(&["disconnect"])).await.unwrap();
    assert!(out.starts_with("Disconnected"));
    assert!(temp.path().join("sandbox").join("groceries.md").is_file());
}

#[tokio::test]
async fn streamed_input_is_saved_once_per_quiet_period() {
    let temp = TempDir::new().unwrap();
    let h = harness(temp.path(), None);
    h.router
        .select_backend(DriverKind::Cloud, SelectOptions::default())
        .await
        .unwrap();
    h.router.create(Node::file(None, "log", "")).await.unwrap();
    h.router.create(Node::folder(None, "dir")).await.unwrap();

    let cli = CliContext::from_router(h.router.clone()).with_save_quiet(Duration::from_secs(60));
    let out = cli
        .stream_into("log", &b"first\nsecond\nthird\n"[..])
        .await
        .unwrap();
    assert_eq!(out, "Streamed 3 lines into log");
    assert_eq!(h.router.read("log").await.unwrap(), "first\nsecond\nthird\n");
    assert_eq!(CallCounts::get(&h.drive.calls().update_media), 1);

    let err = cli.stream_into("dir", &b"x\n"[..]).await.unwrap_err();
    assert!(matches!(err, StorageError::NotAFile(_)));
}
