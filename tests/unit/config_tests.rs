use std::time::Duration;

use yak_box::{AppError, YakBoxConfig};

#[test]
fn empty_file_yields_defaults() {
    let config = YakBoxConfig::from_toml_str("").expect("defaults");
    assert_eq!(config, YakBoxConfig::default());
    assert_eq!(config.container_engine, "docker");
    assert_eq!(config.multiplexer, "zellij");
    assert_eq!(config.task_dir_name, ".yaks");
    assert_eq!(config.stop_timeout().expect("timeout"), Duration::from_secs(30));
    assert_eq!(config.kill_poll_interval(), Duration::from_millis(100));
}

#[test]
fn overrides_are_applied() {
    let config = YakBoxConfig::from_toml_str(
        r#"
container_engine = "podman"
network_name = "isolated"
personas = ["Solo"]
default_stop_timeout = "2m"
"#,
    )
    .expect("valid");
    assert_eq!(config.container_engine, "podman");
    assert_eq!(config.network_name, "isolated");
    assert_eq!(config.personas, vec!["Solo"]);
    assert_eq!(config.stop_timeout().expect("timeout"), Duration::from_secs(120));
}

#[test]
fn empty_persona_pool_is_rejected() {
    let err = YakBoxConfig::from_toml_str("personas = []").expect_err("empty pool");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn blank_persona_is_rejected() {
    let err = YakBoxConfig::from_toml_str(r#"personas = ["A", " "]"#).expect_err("blank");
    assert!(err.to_string().contains("blank"));
}

#[test]
fn zero_poll_interval_is_rejected() {
    assert!(YakBoxConfig::from_toml_str("kill_poll_interval_ms = 0").is_err());
}

#[test]
fn bad_timeout_is_rejected() {
    let err = YakBoxConfig::from_toml_str(r#"default_stop_timeout = "soon""#)
        .expect_err("bad timeout");
    assert!(err.to_string().contains("default_stop_timeout"));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = YakBoxConfig::from_toml_str("personas = [").expect_err("malformed");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn missing_file_in_dir_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = YakBoxConfig::load_from_dir(dir.path()).expect("defaults");
    assert_eq!(config, YakBoxConfig::default());
}

#[test]
fn file_in_dir_is_loaded() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("config.toml"), "wait_retries = 5\n").expect("write");
    let config = YakBoxConfig::load_from_dir(dir.path()).expect("loaded");
    assert_eq!(config.wait_retries, 5);
}

#[test]
fn persona_that_escapes_homes_is_rejected() {
    for personas in [r#"["Yakriel", "../x"]"#, r#"["a/b"]"#, r#"[".."]"#] {
        let err = YakBoxConfig::from_toml_str(&format!("personas = {personas}"))
            .expect_err("path-like persona");
        assert!(matches!(err, AppError::Config(_)), "{personas}: {err}");
    }
}
