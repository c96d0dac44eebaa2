use std::fs;
use std::path::Path;

use yak_box::orchestrator::tasks::{
    clear_assignment, find_task_dir, find_yak_path, write_assignment, write_worktree_marker,
    ASSIGNED_TO_FILE, WORKTREE_PATH_FILE,
};

fn tree(root: &Path) {
    for dir in ["a/b/leaf", "c/leaf", "c/leaf2", "with space"] {
        fs::create_dir_all(root.join(dir)).expect("mkdir");
    }
}

#[test]
fn direct_path_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    tree(dir.path());
    let found = find_task_dir(dir.path(), "c/leaf").expect("direct");
    assert_eq!(found.path, dir.path().join("c/leaf"));
    assert!(!found.is_ambiguous());
}

#[test]
fn leaf_name_search_reports_ambiguity_in_sorted_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    tree(dir.path());
    let found = find_task_dir(dir.path(), "leaf").expect("search");
    assert_eq!(found.path, dir.path().join("a/b/leaf"));
    assert!(found.is_ambiguous());
    assert_eq!(found.also_matched, vec![dir.path().join("c/leaf")]);
}

#[test]
fn unique_leaf_is_found_anywhere() {
    let dir = tempfile::tempdir().expect("tempdir");
    tree(dir.path());
    let found = find_task_dir(dir.path(), "x/leaf2").expect("by leaf");
    assert_eq!(found.path, dir.path().join("c/leaf2"));
}

#[test]
fn traversal_is_not_taken_literally() {
    let dir = tempfile::tempdir().expect("tempdir");
    let yaks = dir.path().join(".yaks");
    fs::create_dir_all(&yaks).expect("yaks");
    fs::create_dir_all(dir.path().join("outside")).expect("outside");

    let err = find_task_dir(&yaks, "../outside").expect_err("escape");
    assert!(err.to_string().contains("no directory matching"));
}

#[test]
fn missing_task_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    tree(dir.path());
    let err = find_task_dir(dir.path(), "nope").expect_err("missing");
    assert!(err.is_not_found());
}

#[test]
fn yak_path_is_found_in_ancestor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("src/deep");
    fs::create_dir_all(&nested).expect("nested");
    fs::create_dir_all(dir.path().join(".yaks")).expect("yaks");

    assert_eq!(
        find_yak_path(&nested, ".yaks").expect("found"),
        dir.path().join(".yaks")
    );
}

#[test]
fn assignment_markers_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let task = dir.path().join("auth/api");
    fs::create_dir_all(&task).expect("task");

    write_assignment(&task, "Yakriel").expect("assign");
    write_worktree_marker(&task, Path::new("/wt/auth-api")).expect("marker");
    assert_eq!(
        fs::read_to_string(task.join(ASSIGNED_TO_FILE)).expect("read"),
        "Yakriel"
    );
    assert!(fs::read_to_string(task.join(WORKTREE_PATH_FILE))
        .expect("read")
        .contains("/wt/auth-api"));

    assert!(clear_assignment(dir.path(), "auth/api").expect("clear"));
    assert!(!task.join(ASSIGNED_TO_FILE).exists());
    assert!(!clear_assignment(dir.path(), "auth/api").expect("already clear"));
    assert!(!clear_assignment(dir.path(), "ghost").expect("missing task"));
}
