use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;
use yak_box::models::session::Session;
use yak_box::models::worker::RuntimeKind;
use yak_box::registry::lock::FileLock;
use yak_box::registry::{JsonFileStore, MemoryStore, SessionRegistry};

fn session(persona: &str, container: &str) -> Session {
    Session {
        worker: persona.to_owned(),
        task: Some("auth/api".to_owned()),
        container: Some(container.to_owned()),
        spawned_at: Utc::now(),
        runtime: RuntimeKind::Sandboxed,
        cwd: PathBuf::from("/ws"),
        display_name: format!("{persona} 🪒🦬 api"),
        zellij_session: None,
        pid_file: None,
        yak_path: Some(PathBuf::from("/ws/.yaks")),
    }
}

#[test]
fn missing_file_reads_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = SessionRegistry::new(JsonFileStore::new(dir.path().join("sessions.json")));
    assert!(registry.list().expect("list").is_empty());
}

#[test]
fn register_get_unregister() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested/sessions.json");
    let registry = SessionRegistry::new(JsonFileStore::new(&path));

    let stored = session("Yakriel", "yak-worker-api");
    registry.register("api", stored.clone()).expect("register");
    assert!(path.is_file());
    assert_eq!(registry.get("api").expect("get"), stored);
    assert_eq!(
        registry.get_by_container("yak-worker-api").expect("by container"),
        stored
    );

    registry.unregister("api").expect("unregister");
    assert!(registry.get("api").expect_err("gone").is_not_found());
}

#[test]
fn unregister_of_unknown_id_is_ok() {
    let registry = SessionRegistry::new(MemoryStore::default());
    registry.unregister("ghost").expect("no-op");
}

#[test]
fn register_overwrites_same_id() {
    let registry = SessionRegistry::new(MemoryStore::default());
    registry
        .register("api", session("Yakriel", "yak-worker-api"))
        .expect("first");
    registry
        .register("api", session("Yakov", "yak-worker-api"))
        .expect("second");
    let sessions = registry.list().expect("list");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions["api"].worker, "Yakov");
}

#[test]
fn invalid_json_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sessions.json");
    fs::write(&path, "{ not json").expect("write");
    let registry = SessionRegistry::new(JsonFileStore::new(&path));
    assert!(registry.list().is_err());
    assert!(registry
        .register("api", session("Yakriel", "yak-worker-api"))
        .is_err());
    assert_eq!(fs::read_to_string(&path).expect("untouched"), "{ not json");
}

#[test]
fn file_format_uses_snake_case_and_omits_empty_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sessions.json");
    let registry = SessionRegistry::new(JsonFileStore::new(&path));
    registry
        .register("api", session("Yakriel", "yak-worker-api"))
        .expect("register");

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    let entry = &raw["api"];
    assert_eq!(entry["worker"], "Yakriel");
    assert_eq!(entry["runtime"], "sandboxed");
    assert_eq!(entry["display_name"], "Yakriel 🪒🦬 api");
    assert!(entry.get("pid_file").is_none());
    assert!(entry.get("zellij_session").is_none());
}

#[test]
fn concurrent_registrations_are_all_kept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sessions.json");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let path = path.clone();
            std::thread::spawn(move || {
                SessionRegistry::new(JsonFileStore::new(path))
                    .register(&format!("w{i}"), session("Yakriel", &format!("yak-worker-w{i}")))
                    .expect("register");
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    let registry = SessionRegistry::new(JsonFileStore::new(&path));
    assert_eq!(registry.list().expect("list").len(), 8);
}

fn lock_dir_entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read_dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[cfg(unix)]
#[test]
fn lock_held_by_dead_owner_is_reclaimed() {
    let mut child = std::process::Command::new("true").spawn().expect("spawn");
    let dead = child.id();
    child.wait().expect("wait");

    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("sessions.json");
    fs::write(FileLock::lock_path(&target), dead.to_string()).expect("stale lock");

    let guard = FileLock::acquire(&target, Duration::from_secs(1)).expect("reclaimed");
    assert_eq!(
        fs::read_to_string(FileLock::lock_path(&target)).expect("lock"),
        std::process::id().to_string()
    );
    drop(guard);
    assert!(lock_dir_entries(dir.path()).is_empty());
}

#[test]
fn abandoned_empty_lock_is_reclaimed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("sessions.json");
    let lock = FileLock::lock_path(&target);
    let file = fs::File::create(&lock).expect("empty lock");
    file.set_modified(SystemTime::now() - Duration::from_secs(60))
        .expect("age lock");
    drop(file);

    let started = Instant::now();
    let guard = FileLock::acquire(&target, Duration::from_secs(5)).expect("reclaimed");
    assert!(started.elapsed() < Duration::from_secs(1));
    drop(guard);
    assert!(lock_dir_entries(dir.path()).is_empty());
}

#[test]
fn fresh_empty_lock_is_respected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("sessions.json");
    fs::File::create(FileLock::lock_path(&target)).expect("empty lock");

    let err = FileLock::acquire(&target, Duration::from_millis(200)).expect_err("still held");
    assert!(err.to_string().contains("timed out"));
    assert_eq!(lock_dir_entries(dir.path()), vec!["sessions.json.lock"]);
}

#[test]
fn contenders_for_a_stale_lock_never_share_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("sessions.json");
    let file = fs::File::create(FileLock::lock_path(&target)).expect("empty lock");
    file.set_modified(SystemTime::now() - Duration::from_secs(60))
        .expect("age lock");
    drop(file);

    let holders = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let target = target.clone();
            let holders = Arc::clone(&holders);
            std::thread::spawn(move || {
                let _guard = FileLock::acquire(&target, Duration::from_secs(5)).expect("acquire");
                assert_eq!(holders.fetch_add(1, Ordering::SeqCst), 0, "lock shared");
                std::thread::sleep(Duration::from_millis(5));
                holders.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }
    assert!(lock_dir_entries(dir.path()).is_empty());
}
