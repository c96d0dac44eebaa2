//! Named resource profiles for sandboxed workers.

use std::collections::BTreeMap;

use serde::Serialize;

/// Container resource limits applied to a sandboxed worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceProfile {
    /// Profile name (`light`, `default`, `heavy`, `ram`).
    pub name: &'static str,
    /// CPU share passed to `--cpus`; `0` means unlimited.
    pub cpus: &'static str,
    /// Memory limit passed to `--memory`.
    pub memory: &'static str,
    /// Optional swap limit passed to `--memory-swap`.
    pub swap: Option<&'static str>,
    /// Process-count limit passed to `--pids-limit`.
    pub pids: u32,
    /// Mount point to tmpfs option string.
    pub tmpfs: BTreeMap<&'static str, &'static str>,
}

/// Names accepted by [`resolve`] without falling back.
pub const PROFILE_NAMES: [&str; 4] = ["light", "default", "heavy", "ram"];

const HOME: &str = "/home/yak-shaver";
const HOME_CACHE: &str = "/home/yak-shaver/.cache";

fn tmpfs(tmp: &'static str, home: &'static str) -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([("/tmp", tmp), (HOME, home), (HOME_CACHE, home)])
}

/// Resolve a profile by name.
///
/// Unrecognised names silently map to the `default` profile.
#[must_use]
pub fn resolve(name: &str) -> ResourceProfile {
    match name {
        "light" => ResourceProfile {
            name: "light",
            cpus: "0.5",
            memory: "1g",
            swap: None,
            pids: 256,
            tmpfs: tmpfs(
                "size=1g,exec,uid=1000,gid=1000",
                "size=512m,exec,uid=1000,gid=1000",
            ),
        },
        "heavy" => ResourceProfile {
            name: "heavy",
            cpus: "2.0",
            memory: "4g",
            swap: None,
            pids: 1024,
            tmpfs: tmpfs(
                "size=2g,exec,uid=1000,gid=1000",
                "size=1g,exec,uid=1000,gid=1000",
            ),
        },
        "ram" => ResourceProfile {
            name: "ram",
            cpus: "0",
            memory: "8g",
            swap: Some("16g"),
            pids: 2048,
            tmpfs: tmpfs(
                "size=4g,exec,uid=1000,gid=1000",
                "size=2g,exec,uid=1000,gid=1000",
            ),
        },
        _ => ResourceProfile {
            name: "default",
            cpus: "1.0",
            memory: "2g",
            swap: None,
            pids: 512,
            tmpfs: tmpfs(
                "size=1g,exec,uid=1000,gid=1000",
                "size=512m,exec,uid=1000,gid=1000",
            ),
        },
    }
}

/// Parse a docker-style memory size (`512m`, `2g`) into bytes.
#[must_use]
pub fn memory_bytes(spec: &str) -> Option<u64> {
    let spec = spec.trim().to_ascii_lowercase();
    let (digits, multiplier) = match spec.chars().last()? {
        'k' => (&spec[..spec.len() - 1], 1u64 << 10),
        'm' => (&spec[..spec.len() - 1], 1 << 20),
        'g' => (&spec[..spec.len() - 1], 1 << 30),
        c if c.is_ascii_digit() => (spec.as_str(), 1),
        _ => return None,
    };
    digits.parse::<u64>().ok().map(|n| n * multiplier)
}

impl ResourceProfile {
    /// CPU share as a number; `0.0` means unlimited.
    #[must_use]
    pub fn cpu_share(&self) -> f64 {
        self.cpus.parse().unwrap_or(0.0)
    }

    /// Memory limit in bytes.
    #[must_use]
    pub fn memory_limit_bytes(&self) -> u64 {
        memory_bytes(self.memory).unwrap_or(0)
    }
}
