//! `${type:name:default}` substitution for devcontainer values.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

use crate::{AppError, Result};

const VARIABLE_PATTERN: &str = r"\$\{([^}]+)\}";

/// Nested `${containerWorkspaceFolder}` references are resolved at most
/// this deep.
const MAX_DEPTH: usize = 8;

const DEVCONTAINER_ID_LEN: usize = 52;

/// Values available to substitution.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    /// Workspace path on the host.
    pub local_workspace_folder: PathBuf,
    /// Workspace path inside the container; may itself contain variables.
    pub container_workspace_folder: String,
    /// Host environment.
    pub local_env: HashMap<String, String>,
    /// Container environment resolved so far.
    pub container_env: BTreeMap<String, String>,
    /// Labels hashed into `${devcontainerId}`.
    pub labels: BTreeMap<String, String>,
}

impl SubstitutionContext {
    /// Context for a workspace mounted at the same path inside the
    /// container, with the current process environment as `localEnv`.
    #[must_use]
    pub fn from_host(workspace: &Path) -> Self {
        Self {
            local_workspace_folder: workspace.to_path_buf(),
            container_workspace_folder: workspace.to_string_lossy().into_owned(),
            local_env: std::env::vars().collect(),
            container_env: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }
}

/// Substitution engine over a [`SubstitutionContext`].
#[derive(Debug)]
pub struct Substituter {
    pattern: Regex,
    /// Context consulted for every lookup.
    pub context: SubstitutionContext,
}

impl Substituter {
    /// Engine over `context`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Devcontainer` if the variable pattern fails to
    /// compile.
    pub fn new(context: SubstitutionContext) -> Result<Self> {
        let pattern = Regex::new(VARIABLE_PATTERN)
            .map_err(|err| AppError::Devcontainer(format!("invalid variable pattern: {err}")))?;
        Ok(Self { pattern, context })
    }

    /// Replace every `${...}` in `value`. Unknown variable types are left
    /// as written.
    #[must_use]
    pub fn substitute(&self, value: &str) -> String {
        self.substitute_at(value, 0)
    }

    fn substitute_at(&self, value: &str, depth: usize) -> String {
        self.pattern
            .replace_all(value, |caps: &Captures<'_>| {
                self.lookup(&caps[1], depth)
                    .unwrap_or_else(|| caps[0].to_owned())
            })
            .into_owned()
    }

    fn lookup(&self, inner: &str, depth: usize) -> Option<String> {
        let mut parts = inner.splitn(3, ':');
        let kind = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        let default = parts.next().unwrap_or_default();
        let ctx = &self.context;

        let value = match kind {
            "env" | "localEnv" => ctx
                .local_env
                .get(name)
                .cloned()
                .unwrap_or_else(|| default.to_owned()),
            "containerEnv" => ctx
                .container_env
                .get(name)
                .cloned()
                .unwrap_or_else(|| default.to_owned()),
            "localWorkspaceFolder" => ctx.local_workspace_folder.to_string_lossy().into_owned(),
            "localWorkspaceFolderBasename" => basename(&ctx.local_workspace_folder),
            "containerWorkspaceFolder" => self.container_folder(depth)?,
            "containerWorkspaceFolderBasename" => {
                basename(Path::new(&self.container_folder(depth)?))
            }
            "devcontainerId" => devcontainer_id(&ctx.labels),
            _ => return None,
        };
        Some(value)
    }

    fn container_folder(&self, depth: usize) -> Option<String> {
        (depth < MAX_DEPTH)
            .then(|| self.substitute_at(&self.context.container_workspace_folder, depth + 1))
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Deterministic 52-character id derived from `labels`: lowercase base32
/// of the SHA-256 of sorted `key=value\n` lines.
#[must_use]
pub fn devcontainer_id(labels: &BTreeMap<String, String>) -> String {
    let mut canonical = String::new();
    for (key, value) in labels {
        let _ = writeln!(canonical, "{key}={value}");
    }
    let digest = Sha256::digest(canonical.as_bytes());
    let mut encoded = base32_lower(&digest);
    encoded.truncate(DEVCONTAINER_ID_LEN);
    encoded
}

/// RFC 4648 base32, lowercase, without padding.
fn base32_lower(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(char::from(ALPHABET[((buffer >> bits) & 0x1f) as usize]));
        }
    }
    if bits > 0 {
        out.push(char::from(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize]));
    }
    out
}
