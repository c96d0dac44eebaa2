//! Isolation checks over a devcontainer configuration.
//!
//! Findings are advisory: the configuration is still used.

use std::path::Path;

use super::DevcontainerConfig;
use crate::path_safety::normalize;

/// Capabilities that let a container escape its isolation.
pub const DANGEROUS_CAPABILITIES: [&str; 8] = [
    "SYS_ADMIN",
    "SYS_PTRACE",
    "SYS_MODULE",
    "SYS_RAWIO",
    "NET_ADMIN",
    "SYS_TIME",
    "SYS_BOOT",
    "SYS_RESOURCE",
];

/// Security options that disable confinement.
pub const UNCONFINED_OPTIONS: [&str; 3] =
    ["seccomp=unconfined", "apparmor=unconfined", "label=disable"];

/// Host paths whose mounting exposes the host.
pub const SENSITIVE_HOST_PATHS: [&str; 9] = [
    "/",
    "/etc",
    "/root",
    "/proc",
    "/sys",
    "/dev",
    "/boot",
    "/var/run/docker.sock",
    "/run/docker.sock",
];

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Weakens isolation.
    Warning,
    /// Disables isolation.
    Critical,
}

/// One security finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityFinding {
    /// How bad it is.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
}

/// Check `config` for privileged mode, dangerous capabilities, unconfined
/// security options, and mounts of sensitive host paths.
#[must_use]
pub fn audit(config: &DevcontainerConfig) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();

    if config.privileged == Some(true) {
        findings.push(SecurityFinding {
            severity: Severity::Critical,
            message: "container runs in privileged mode, which disables most isolation".into(),
        });
    }

    for cap in &config.cap_add {
        let bare = cap.trim_start_matches("CAP_");
        if DANGEROUS_CAPABILITIES.contains(&bare) {
            findings.push(SecurityFinding {
                severity: Severity::Critical,
                message: format!("dangerous capability requested: {cap}"),
            });
        }
    }

    for opt in &config.security_opt {
        if UNCONFINED_OPTIONS.contains(&opt.as_str()) {
            findings.push(SecurityFinding {
                severity: Severity::Critical,
                message: format!("security option {opt} weakens isolation"),
            });
        }
    }

    for mount in &config.mounts {
        if let Some(source) = mount_source(mount) {
            if is_sensitive(&source) {
                findings.push(SecurityFinding {
                    severity: Severity::Warning,
                    message: format!("mount exposes sensitive host path {source}"),
                });
            }
        }
    }

    findings
}

/// Host source of a mount in `source=...,target=...` or `src:dst[:mode]`
/// form.
#[must_use]
pub fn mount_source(mount: &str) -> Option<String> {
    if mount.contains('=') {
        return mount.split(',').find_map(|part| {
            part.strip_prefix("source=")
                .or_else(|| part.strip_prefix("src="))
                .map(str::to_owned)
        });
    }
    mount.split(':').next().filter(|s| !s.is_empty()).map(str::to_owned)
}

fn is_sensitive(source: &str) -> bool {
    let path = Path::new(source);
    if !path.is_absolute() {
        return false;
    }
    let Some(normalized) = normalize(path) else {
        return true;
    };
    SENSITIVE_HOST_PATHS.iter().any(|sensitive| {
        let sensitive = Path::new(sensitive);
        if sensitive == Path::new("/") {
            normalized == sensitive
        } else {
            normalized.starts_with(sensitive)
        }
    })
}
