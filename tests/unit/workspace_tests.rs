use std::fs;

use yak_box::workspace::{Workspace, HOME_SUBDIRS};

#[test]
fn metadata_paths_hang_off_root() {
    let workspace = Workspace::at("/ws");
    assert_eq!(workspace.sessions_path(), std::path::Path::new("/ws/.yak-boxes/sessions.json"));
    assert_eq!(
        workspace.scripts_dir("Yakov"),
        std::path::Path::new("/ws/.yak-boxes/@home/Yakov/scripts")
    );
    assert_eq!(
        workspace.close_tab_script(),
        std::path::Path::new("/ws/close-zellij-tab.sh")
    );
}

#[test]
fn home_dir_is_created_with_subdirectories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::at(dir.path());
    let home = workspace.ensure_home_dir("Yakira").expect("home");
    for sub in HOME_SUBDIRS {
        assert!(home.join(sub).is_dir(), "{sub}");
    }
    assert_eq!(workspace.list_homes().expect("homes"), vec!["Yakira"]);
}

#[test]
fn clean_home_removes_contents_and_tolerates_absence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::at(dir.path());
    let home = workspace.ensure_home_dir("Yakov").expect("home");
    fs::write(home.join(".bash_history"), "ls\n").expect("write");

    workspace.clean_home("Yakov").expect("clean");
    assert!(!home.exists());
    workspace.clean_home("Yakov").expect("clean again");
}

#[test]
fn list_homes_is_sorted_and_ignores_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::at(dir.path());
    assert!(workspace.list_homes().expect("empty").is_empty());

    workspace.ensure_home_dir("Yakueline").expect("home");
    workspace.ensure_home_dir("Yakov").expect("home");
    fs::write(workspace.metadata_dir().join("@home/notes.txt"), "").expect("file");
    assert_eq!(
        workspace.list_homes().expect("homes"),
        vec!["Yakov", "Yakueline"]
    );
}

#[test]
fn config_defaults_when_file_is_absent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Workspace::at(dir.path()).load_config().expect("config");
    assert_eq!(config.default_image, "yak-worker:latest");
}
