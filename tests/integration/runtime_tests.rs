//! Container engine, multiplexer and backend detection driven through a
//! fake command runner.

use std::fs;
use std::time::Duration;

use yak_box::models::worker::RuntimeKind;
use yak_box::runtime::command::CommandOutput;
use yak_box::runtime::container::{ContainerEngine, ImageStatus, COMMIT_LABEL};
use yak_box::runtime::detect::{detect_with, Detected};
use yak_box::runtime::multiplexer::{Multiplexer, TabClose};

use super::test_helpers::{test_config, RecordingRunner};

#[tokio::test]
async fn detect_prefers_responsive_container_engine() {
    let runner = RecordingRunner::new();
    let config = test_config();
    let detected = detect_with(&runner, &config, |_| true).await;
    assert_eq!(detected, Detected::Available(RuntimeKind::Sandboxed));
}

#[tokio::test]
async fn detect_falls_back_to_multiplexer_when_daemon_is_down() {
    let runner = RecordingRunner::new();
    runner.on("docker", &["ps"], CommandOutput::failed(1, "daemon down"));
    let config = test_config();
    let detected = detect_with(&runner, &config, |_| true).await;
    assert_eq!(detected, Detected::Available(RuntimeKind::Native));
}

#[tokio::test]
async fn detect_reports_unknown_without_either_binary() {
    let runner = RecordingRunner::new();
    let config = test_config();
    let detected = detect_with(&runner, &config, |_| false).await;
    assert_eq!(detected, Detected::Unknown);
    assert_eq!(detected.as_str(), "unknown");
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn network_mode_falls_back_to_bridge() {
    let runner = RecordingRunner::new();
    runner.on(
        "docker",
        &["network", "inspect"],
        CommandOutput::failed(1, "no such network"),
    );
    let engine = ContainerEngine::new(&runner, "docker");
    assert_eq!(engine.network_mode("yak-shavers").await, "bridge");
}

#[tokio::test]
async fn stop_and_remove_missing_container_is_not_found() {
    let runner = RecordingRunner::new();
    let err = ContainerEngine::new(&runner, "docker")
        .stop_and_remove("yak-worker-x", Duration::from_secs(5))
        .await
        .expect_err("missing container");
    assert!(err.is_not_found());
    assert!(runner.calls_matching("docker", &["stop"]).is_empty());
}

#[tokio::test]
async fn stop_failure_carries_manual_hint() {
    let runner = RecordingRunner::new();
    runner.on("docker", &["ps", "-a"], CommandOutput::ok("yak-worker-x\n"));
    runner.on("docker", &["stop"], CommandOutput::failed(1, "timeout"));
    let err = ContainerEngine::new(&runner, "docker")
        .stop_and_remove("yak-worker-x", Duration::from_secs(5))
        .await
        .expect_err("stop fails");
    assert!(err.to_string().contains("docker stop yak-worker-x"));
    assert!(runner.calls_matching("docker", &["rm"]).is_empty());
}

#[tokio::test]
async fn list_workers_filters_on_prefix() {
    let runner = RecordingRunner::new();
    runner.on(
        "docker",
        &["ps"],
        CommandOutput::ok("yak-worker-a\n\nyak-worker-b\n"),
    );
    let engine = ContainerEngine::new(&runner, "docker");
    let workers = engine.list_workers(false).await.expect("list");
    assert_eq!(workers, vec!["yak-worker-a", "yak-worker-b"]);

    engine.list_workers(true).await.expect("list all");
    let calls = runner.calls();
    assert!(!calls[0].args.contains(&"-a".to_owned()));
    assert!(calls[1].has_args_prefix(&["ps", "-a", "--filter", "name=yak-worker-"]));
}

#[tokio::test]
async fn ensure_image_builds_missing_image_from_devcontainer() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join(".devcontainer")).expect("devcontainer dir");

    let runner = RecordingRunner::new();
    runner.on(
        "docker",
        &["image", "inspect"],
        CommandOutput::failed(1, "No such image"),
    );
    runner.on("git", &[], CommandOutput::ok("abc123\n"));

    let status = ContainerEngine::new(&runner, "docker")
        .ensure_image("yak-worker:latest", dir.path())
        .await
        .expect("built");
    assert_eq!(status, ImageStatus::Built);

    let builds = runner.calls_matching("docker", &["build"]);
    assert_eq!(builds.len(), 1);
    assert!(builds[0].args.contains(&format!("{COMMIT_LABEL}=abc123")));
    assert_eq!(builds[0].cwd.as_deref(), Some(dir.path()));
}

#[tokio::test]
async fn ensure_image_keeps_current_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join(".devcontainer")).expect("devcontainer dir");

    let runner = RecordingRunner::new();
    runner.on("docker", &["image", "inspect"], CommandOutput::ok("abc123\n"));
    runner.on("git", &[], CommandOutput::ok("abc123\n"));
    let devcontainer = dir.path().join(".devcontainer");
    let devcontainer = devcontainer.to_string_lossy();
    runner.on(
        "git",
        &["-C", &*devcontainer, "status"],
        CommandOutput::ok(""),
    );

    let status = ContainerEngine::new(&runner, "docker")
        .ensure_image("yak-worker:latest", dir.path())
        .await
        .expect("present");
    assert_eq!(status, ImageStatus::Present);
    assert!(runner.calls_matching("docker", &["build"]).is_empty());
}

#[tokio::test]
async fn ensure_image_rebuilds_when_devcontainer_is_dirty() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join(".devcontainer")).expect("devcontainer dir");

    let runner = RecordingRunner::new();
    runner.on("docker", &["image", "inspect"], CommandOutput::ok("abc123\n"));
    runner.on("git", &[], CommandOutput::ok("abc123\n"));
    let devcontainer = dir.path().join(".devcontainer");
    let devcontainer = devcontainer.to_string_lossy();
    runner.on(
        "git",
        &["-C", &*devcontainer, "status"],
        CommandOutput::ok(" M Dockerfile\n"),
    );

    let status = ContainerEngine::new(&runner, "docker")
        .ensure_image("yak-worker:latest", dir.path())
        .await
        .expect("rebuilt");
    assert_eq!(status, ImageStatus::Rebuilt);
}

#[tokio::test]
async fn close_tab_navigates_by_index() {
    let runner = RecordingRunner::new();
    runner.on(
        "zellij",
        &["--session", "yak", "action", "query-tab-names"],
        CommandOutput::ok("orchestrator\nYakriel 🪒🦬 api\nshell\n"),
    );
    let outcome = Multiplexer::new(&runner, "zellij")
        .close_tab(Some("yak"), "Yakriel 🪒🦬 api", None)
        .await
        .expect("close");
    assert_eq!(outcome, TabClose::Closed);

    let calls = runner.calls();
    assert!(calls[1].has_args_prefix(&["--session", "yak", "action", "go-to-tab", "2"]));
    assert!(calls[2].has_args_prefix(&["--session", "yak", "action", "close-tab"]));
}

#[tokio::test]
async fn close_tab_leaves_focused_tab_alone_when_name_is_missing() {
    let runner = RecordingRunner::new();
    runner.on(
        "zellij",
        &["action", "query-tab-names"],
        CommandOutput::ok("orchestrator\n"),
    );
    let outcome = Multiplexer::new(&runner, "zellij")
        .close_tab(None, "ghost", None)
        .await
        .expect("query succeeds");
    assert_eq!(outcome, TabClose::NotFound);
    assert!(runner.calls_matching("zellij", &["action", "close-tab"]).is_empty());
}

#[tokio::test]
async fn close_tab_prefers_helper_script() {
    let runner = RecordingRunner::new();
    let helper = std::path::Path::new("/ws/bin/close-tab.sh");
    Multiplexer::new(&runner, "zellij")
        .close_tab(Some("yak"), "Yakriel", Some(helper))
        .await
        .expect("helper");
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, "/ws/bin/close-tab.sh");
    assert_eq!(calls[0].args, vec!["--session", "yak", "Yakriel"]);
}
