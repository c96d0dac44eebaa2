//! `message`, `diff` and `check` against a temporary workspace with faked
//! external programs.

use std::fs;
use std::path::Path;

use chrono::Utc;
use yak_box::models::session::Session;
use yak_box::models::worker::RuntimeKind;
use yak_box::opencode::MessageFormat;
use yak_box::orchestrator::{CheckRequest, MessageRequest, Orchestrator, StatusFilter};
use yak_box::registry::SessionRegistry;
use yak_box::runtime::command::CommandOutput;
use yak_box::workspace::Workspace;
use yak_box::AppError;

use super::test_helpers::{test_config, RecordingRunner};

const SESSION_LIST: &str = r#"[plugin] ready
[{"id":"ses_old","title":"first","updated":100,"created":1,"projectId":"p","directory":"/w"},
 {"id":"ses_new","title":"second","updated":900,"created":2,"projectId":"p","directory":"/w"}]"#;

fn register(workspace: &Workspace, name: &str, runtime: RuntimeKind) {
    let session = Session {
        worker: "Yakriel".to_owned(),
        task: None,
        container: Some(format!("yak-worker-{name}")),
        spawned_at: Utc::now(),
        runtime,
        cwd: workspace.root().join("src"),
        display_name: format!("Yakriel {name}"),
        zellij_session: None,
        pid_file: None,
        yak_path: None,
    };
    SessionRegistry::for_workspace(workspace)
        .register(name, session)
        .expect("register");
}

fn message(name: &str, text: &str) -> MessageRequest {
    MessageRequest {
        session_name: name.to_owned(),
        text: text.to_owned(),
        ..MessageRequest::default()
    }
}

#[tokio::test]
async fn message_goes_to_most_recent_session_of_container() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::at(dir.path());
    register(&workspace, "api", RuntimeKind::Sandboxed);

    let runner = RecordingRunner::new();
    runner.on(
        "docker",
        &["exec", "yak-worker-api", "opencode", "session", "list"],
        CommandOutput::ok(SESSION_LIST),
    );
    runner.on(
        "docker",
        &["exec", "yak-worker-api", "opencode", "run"],
        CommandOutput::ok("on it\n"),
    );
    let config = test_config();

    let report = Orchestrator::for_workspace(&runner, &workspace, &config)
        .message(&message("api", "add error handling"))
        .await
        .expect("delivered");
    assert_eq!(report.session_id, "ses_new");
    assert_eq!(report.exit_code, 0);
    assert_eq!(report.output, "on it\n");

    let sent = runner.calls_matching("docker", &["exec", "yak-worker-api", "opencode", "run"]);
    assert_eq!(
        sent[0].args,
        vec![
            "exec",
            "yak-worker-api",
            "opencode",
            "run",
            "--session",
            "ses_new",
            "add error handling"
        ]
    );
}

#[tokio::test]
async fn native_message_with_explicit_session_skips_discovery() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::at(dir.path());
    register(&workspace, "docs", RuntimeKind::Native);

    let runner = RecordingRunner::new();
    runner.on("opencode", &["run"], CommandOutput::failed(3, "agent busy"));
    let config = test_config();

    let request = MessageRequest {
        opencode_session: Some("ses_pinned".to_owned()),
        format: MessageFormat::Json,
        ..message("docs", "check tests")
    };
    let report = Orchestrator::for_workspace(&runner, &workspace, &config)
        .message(&request)
        .await
        .expect("delivered");
    assert_eq!(report.exit_code, 3);
    assert!(report.output.contains("agent busy"));

    assert!(runner.calls_matching("opencode", &["session"]).is_empty());
    let sent = runner.calls_matching("opencode", &["run"]);
    let cwd = workspace.root().join("src").to_string_lossy().into_owned();
    assert_eq!(
        sent[0].args,
        vec![
            "run",
            "--session",
            "ses_pinned",
            "--dir",
            cwd.as_str(),
            "--format",
            "json",
            "check tests"
        ]
    );
}

#[tokio::test]
async fn message_to_unknown_worker_lists_registered_ones() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::at(dir.path());
    let runner = RecordingRunner::new();
    let config = test_config();
    let orchestrator = Orchestrator::for_workspace(&runner, &workspace, &config);

    let err = orchestrator
        .message(&message("ghost", "hi"))
        .await
        .expect_err("nobody registered");
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("No active workers registered"));

    register(&workspace, "api", RuntimeKind::Sandboxed);
    register(&workspace, "web", RuntimeKind::Sandboxed);
    let err = orchestrator
        .message(&message("ghost", "hi"))
        .await
        .expect_err("unknown worker");
    assert!(err.to_string().contains("Available workers: api, web"), "{err}");
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn message_without_opencode_sessions_is_a_runtime_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::at(dir.path());
    register(&workspace, "api", RuntimeKind::Sandboxed);

    let runner = RecordingRunner::new();
    runner.on(
        "docker",
        &["exec", "yak-worker-api", "opencode", "session"],
        CommandOutput::ok("[]"),
    );
    let config = test_config();
    let orchestrator = Orchestrator::for_workspace(&runner, &workspace, &config);

    let err = orchestrator
        .message(&message("api", "hi"))
        .await
        .expect_err("no sessions");
    assert!(matches!(err, AppError::Runtime(_)));
    assert!(err.to_string().contains("no active opencode sessions"));

    runner.on(
        "docker",
        &["exec", "yak-worker-api", "opencode", "session"],
        CommandOutput::failed(1, "No such container"),
    );
    let err = orchestrator
        .message(&message("api", "hi"))
        .await
        .expect_err("container gone");
    assert!(err.to_string().contains("No such container"), "{err}");
    assert!(runner
        .calls_matching("docker", &["exec", "yak-worker-api", "opencode", "run"])
        .is_empty());
}

fn fake_repo(home: &Path, name: &str) -> String {
    let repo = home.join(name);
    fs::create_dir_all(repo.join(".git")).expect("repo");
    repo.to_string_lossy().into_owned()
}

#[tokio::test]
async fn diff_covers_each_repository_in_persona_home() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::at(dir.path());
    let home = workspace.ensure_home_dir("Yakriel").expect("home");
    let api = fake_repo(&home, "api");
    let web = fake_repo(&home, "web");
    fs::create_dir_all(home.join("notes")).expect("plain dir");

    let runner = RecordingRunner::new();
    runner.on("git", &["-C", api.as_str(), "diff"], CommandOutput::ok("+fn login() {}\n"));
    runner.on("git", &["-C", web.as_str(), "rev-parse"], CommandOutput::failed(1, ""));
    runner.on(
        "git",
        &["-C", web.as_str(), "rev-parse", "--verify", "--quiet", "origin/master"],
        CommandOutput::ok("abc\n"),
    );
    runner.on("git", &["-C", web.as_str(), "diff"], CommandOutput::failed(128, "bad revision"));
    let config = test_config();

    let report = Orchestrator::for_workspace(&runner, &workspace, &config)
        .diff("Yakriel")
        .await
        .expect("diff");
    let repos: Vec<&str> = report.repos.iter().map(|r| r.repo.as_str()).collect();
    assert_eq!(repos, vec!["api", "web"]);

    assert_eq!(report.repos[0].base, "main");
    assert_eq!(report.repos[0].diff.as_deref(), Ok("+fn login() {}\n"));
    assert_eq!(report.repos[1].base, "origin/master");
    assert_eq!(report.repos[1].diff, Err("bad revision".to_owned()));

    let diffed = runner.calls_matching("git", &["-C", api.as_str(), "diff"]);
    assert_eq!(diffed[0].args.last().map(String::as_str), Some("main...HEAD"));
}

#[tokio::test]
async fn diff_rejects_missing_or_escaping_home() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::at(dir.path());
    let runner = RecordingRunner::new();
    let config = test_config();
    let orchestrator = Orchestrator::for_workspace(&runner, &workspace, &config);

    let err = orchestrator.diff("Yakov").await.expect_err("no home");
    assert!(err.is_not_found());
    assert!(err.to_string().contains("Yakov"));

    let err = orchestrator.diff("../..").await.expect_err("escape");
    assert!(matches!(err, AppError::PathViolation(_)));
    assert!(runner.calls().is_empty());
}

fn write_status(root: &Path, task: &str, status: &str) {
    let dir = root.join(".yaks").join(task);
    fs::create_dir_all(&dir).expect("task dir");
    fs::write(dir.join("agent-status"), format!("{status}\n")).expect("status");
}

#[tokio::test]
async fn check_reports_tasks_containers_and_costs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let workspace = Workspace::at(root);
    register(&workspace, "api", RuntimeKind::Sandboxed);
    let home = workspace.ensure_home_dir("Yakriel").expect("home");
    fs::write(home.join("notes.md"), vec![b'x'; 2048]).expect("file");
    write_status(root, "auth/api", "wip: adding tokens");
    write_status(root, "auth/ui", "blocked: waiting on api");
    write_status(root, "docs", "done");

    let runner = RecordingRunner::new();
    runner.on(
        "docker",
        &["ps", "--filter"],
        CommandOutput::ok("yak-worker-api\tUp 2 hours\t2 hours ago\n"),
    );
    runner.on(
        "docker",
        &["ps", "-a", "--filter", "status=exited"],
        CommandOutput::ok("yak-worker-old\tExited (0) 1 minute ago\t\n"),
    );
    runner.on(
        "docker",
        &["exec", "yak-worker-api", "opencode", "stats"],
        CommandOutput::ok("Sessions   2\nTotal Cost   $0.42\n"),
    );
    let config = test_config();

    let report = Orchestrator::for_workspace(&runner, &workspace, &config)
        .check(&CheckRequest::default())
        .await
        .expect("check");
    assert!(report.notes.is_empty(), "{:?}", report.notes);
    assert!(report.sessions.contains_key("api"));
    assert_eq!(report.homes.len(), 1);
    assert_eq!(report.homes[0].persona, "Yakriel");
    assert_eq!(report.homes[0].bytes, 2048);

    let tasks: Vec<(&str, &str)> = report
        .tasks
        .as_deref()
        .expect("tracker exists")
        .iter()
        .map(|t| (t.task.as_str(), t.status.as_str()))
        .collect();
    assert_eq!(
        tasks,
        vec![
            ("auth/api", "wip: adding tokens"),
            ("auth/ui", "blocked: waiting on api"),
            ("docs", "done"),
        ]
    );

    assert_eq!(report.running.len(), 1);
    assert_eq!(report.running[0].container.status, "Up 2 hours");
    assert_eq!(report.running[0].cost.as_deref(), Some("$0.42"));
    assert_eq!(report.stopped.len(), 1);
    assert_eq!(report.stopped[0].name, "yak-worker-old");
}

async fn task_names(orchestrator: &Orchestrator<'_>, request: CheckRequest) -> Vec<String> {
    orchestrator
        .check(&request)
        .await
        .expect("check")
        .tasks
        .expect("tracker exists")
        .into_iter()
        .map(|t| t.task)
        .collect()
}

#[tokio::test]
async fn check_filters_tasks_by_status_and_prefix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    write_status(root, "auth/api", "wip");
    write_status(root, "auth/ui", "blocked: design");
    write_status(root, "billing", "blocked: keys");

    let workspace = Workspace::at(root);
    let runner = RecordingRunner::new();
    let config = test_config();
    let orchestrator = Orchestrator::for_workspace(&runner, &workspace, &config);

    let blocked = CheckRequest {
        status: Some(StatusFilter::Blocked),
        prefix: None,
    };
    assert_eq!(task_names(&orchestrator, blocked).await, vec!["auth/ui", "billing"]);

    let wip_under_auth = CheckRequest {
        status: Some(StatusFilter::Wip),
        prefix: Some("auth".to_owned()),
    };
    assert_eq!(task_names(&orchestrator, wip_under_auth).await, vec!["auth/api"]);

    let missing = orchestrator
        .check(&CheckRequest {
            status: None,
            prefix: Some("nothing/here".to_owned()),
        })
        .await
        .expect("check");
    assert!(missing.tasks.is_none());

    let err = orchestrator
        .check(&CheckRequest {
            status: None,
            prefix: Some("../../etc".to_owned()),
        })
        .await
        .expect_err("escaping prefix");
    assert!(matches!(err, AppError::PathViolation(_)));
}

#[tokio::test]
async fn check_notes_engine_failure_instead_of_failing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::at(dir.path());
    let runner = RecordingRunner::new();
    runner.on("docker", &["ps"], CommandOutput::failed(1, "daemon not running"));
    let config = test_config();

    let report = Orchestrator::for_workspace(&runner, &workspace, &config)
        .check(&CheckRequest::default())
        .await
        .expect("check");
    assert!(report.running.is_empty());
    assert!(report.tasks.is_none());
    assert_eq!(report.notes.len(), 2);
    assert!(report.notes[0].contains("daemon not running"));
}
