//! Workspace discovery through git.

use yak_box::runtime::command::CommandOutput;
use yak_box::workspace::Workspace;

use super::test_helpers::RecordingRunner;

#[tokio::test]
async fn root_comes_from_git_toplevel() {
    let runner = RecordingRunner::new();
    runner.on(
        "git",
        &["rev-parse", "--show-toplevel"],
        CommandOutput::ok("/src/yakthang\n"),
    );
    let workspace = Workspace::discover(&runner).await.expect("discovered");
    assert_eq!(workspace.root(), std::path::Path::new("/src/yakthang"));
}

#[tokio::test]
async fn outside_a_repository_is_not_found() {
    let runner = RecordingRunner::new();
    runner.on(
        "git",
        &["rev-parse"],
        CommandOutput::failed(128, "fatal: not a git repository"),
    );
    let err = Workspace::discover(&runner).await.expect_err("no repo");
    assert!(err.is_not_found());
    assert!(err.to_string().contains("inside a git repository"));
}

#[tokio::test]
async fn empty_toplevel_is_not_found() {
    let runner = RecordingRunner::new();
    let err = Workspace::discover(&runner).await.expect_err("empty");
    assert!(err.is_not_found());
}
