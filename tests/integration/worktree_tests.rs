//! Worktree reuse and creation against a fake git.

use std::path::Path;

use yak_box::runtime::command::CommandOutput;
use yak_box::worktree::WorktreeManager;

use super::test_helpers::RecordingRunner;

const PROJECT: &str = "/src/yakthang";

#[tokio::test]
async fn reuses_worktree_already_on_task_branch() {
    let runner = RecordingRunner::new();
    runner.on(
        "git",
        &["-C", PROJECT, "worktree", "list"],
        CommandOutput::ok(
            "worktree /src/yakthang\nbranch refs/heads/main\n\n\
             worktree /wt/auth-api\nbranch refs/heads/auth-api\n",
        ),
    );
    let data = tempfile::tempdir().expect("tempdir");
    let path = WorktreeManager::with_data_home(&runner, data.path())
        .ensure(Path::new(PROJECT), "auth/api")
        .await
        .expect("reuse");
    assert_eq!(path, Path::new("/wt/auth-api"));
    assert!(runner
        .calls_matching("git", &["-C", PROJECT, "worktree", "add"])
        .is_empty());
}

#[tokio::test]
async fn creates_branch_when_missing() {
    let runner = RecordingRunner::new();
    runner.on(
        "git",
        &["-C", PROJECT, "show-ref"],
        CommandOutput::failed(1, ""),
    );
    let data = tempfile::tempdir().expect("tempdir");
    let manager = WorktreeManager::with_data_home(&runner, data.path());
    let path = manager
        .ensure(Path::new(PROJECT), "auth/api")
        .await
        .expect("create");

    let expected = data.path().join("yak-box/worktrees/yakthang/auth-api");
    assert_eq!(path, expected);
    assert!(expected.parent().expect("parent").is_dir());

    let adds = runner.calls_matching("git", &["-C", PROJECT, "worktree", "add"]);
    assert_eq!(adds.len(), 1);
    assert!(adds[0].args.ends_with(&["-b".to_owned(), "auth-api".to_owned()]));
}

#[tokio::test]
async fn checks_out_existing_branch() {
    let runner = RecordingRunner::new();
    let data = tempfile::tempdir().expect("tempdir");
    WorktreeManager::with_data_home(&runner, data.path())
        .ensure(Path::new(PROJECT), "docs")
        .await
        .expect("create");

    let adds = runner.calls_matching("git", &["-C", PROJECT, "worktree", "add"]);
    assert_eq!(adds[0].args.last().map(String::as_str), Some("docs"));
    assert!(!adds[0].args.contains(&"-b".to_owned()));
}

#[tokio::test]
async fn rejects_non_repository() {
    let runner = RecordingRunner::new();
    runner.on(
        "git",
        &["-C", PROJECT, "rev-parse"],
        CommandOutput::failed(128, "not a git repository"),
    );
    let err = WorktreeManager::with_data_home(&runner, "/tmp/unused")
        .ensure(Path::new(PROJECT), "docs")
        .await
        .expect_err("not a repo");
    assert!(err.to_string().contains("not a git repository"));
}
