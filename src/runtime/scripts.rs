//! Shell artifacts interpreted inside a container or a multiplexer pane.
//!
//! Only artifacts that must be run by a shell are generated as text. Values
//! interpolated into them are POSIX-quoted.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use crate::{AppError, Result};

/// Mount point of the prompt file inside the container.
pub const CONTAINER_PROMPT_PATH: &str = "/opt/worker/prompt.txt";
/// Mount point of the init script inside the container.
pub const CONTAINER_INIT_PATH: &str = "/opt/worker/start.sh";
/// Home directory of the synthetic in-container account.
pub const CONTAINER_HOME: &str = "/home/yak-shaver";

const SHEBANG: &str = "#!/usr/bin/env bash\n";

/// POSIX-quote `value` for a shell script. NUL bytes are dropped.
#[must_use]
pub fn quote(value: &str) -> String {
    match shlex::try_quote(value) {
        Ok(quoted) => quoted.into_owned(),
        Err(_) => {
            let cleaned: String = value.chars().filter(|c| *c != '\0').collect();
            shlex::try_quote(&cleaned)
                .map(Cow::into_owned)
                .unwrap_or_default()
        }
    }
}

/// Quote a path argument.
#[must_use]
pub fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// In-container entrypoint: runs the agent, then exports cost telemetry
/// best-effort and exits with the agent's status.
#[must_use]
pub fn init_script() -> String {
    format!(
        r#"{SHEBANG}WORKSPACE_ROOT="${{WORKSPACE_ROOT:-$PWD}}"
COST_DIR="${{WORKSPACE_ROOT}}/.worker-costs"
mkdir -p "$COST_DIR" 2>/dev/null || true

PROMPT="$(cat {CONTAINER_PROMPT_PATH})"
opencode --prompt "$PROMPT" --agent "$1"
EXIT_CODE=$?

WORKER="${{WORKER_NAME:-unknown}}"
TS="$(date -u +%Y%m%dT%H%M%SZ)"
SID="$(opencode session list 2>/dev/null | tail -1 | awk '{{print $1}}')"
if [[ -n "$SID" && "$SID" != "Session" ]]; then
  opencode export "$SID" > "${{COST_DIR}}/${{WORKER}}-${{TS}}.json" 2>/dev/null || true
fi
opencode stats --models > "${{COST_DIR}}/${{WORKER}}-${{TS}}.stats.txt" 2>/dev/null || true
exit $EXIT_CODE
"#
    )
}

/// Shell-pane helper: waits for the container to run, then attaches a
/// shell. Fails after `retries` one-second attempts.
#[must_use]
pub fn wait_script(engine: &str, retries: u32) -> String {
    let engine = quote(engine);
    format!(
        r#"{SHEBANG}set -euo pipefail
CONTAINER_NAME="$1"
MAX_RETRIES={retries}
RETRY_DELAY=1

for i in $(seq 1 $MAX_RETRIES); do
    if {engine} inspect --format='{{{{.State.Status}}}}' "$CONTAINER_NAME" 2>/dev/null | grep -q "running"; then
        exec {engine} exec -it "$CONTAINER_NAME" bash
    fi
    if [[ $i -eq 1 ]]; then
        echo "Waiting for container to start..."
    fi
    sleep $RETRY_DELAY
done

echo "ERROR: Container did not start within $MAX_RETRIES seconds"
exit 1
"#
    )
}

/// `/etc/passwd` mapping the host UID/GID to the `yakshaver` account.
#[must_use]
pub fn passwd_entries(uid: u32, gid: u32) -> String {
    format!(
        "root:x:0:0:root:/root:/bin/bash\n\
         yakshaver:x:{uid}:{gid}:Yak Shaver:{CONTAINER_HOME}:/bin/bash\n"
    )
}

/// `/etc/group` for the `yakshaver` account.
#[must_use]
pub fn group_entries(gid: u32) -> String {
    format!("root:x:0:\nyakshaver:x:{gid}:\n")
}

/// Script that `exec`s `argv`, one argument per continuation line.
///
/// `preamble` lines run before the `exec`.
#[must_use]
pub fn exec_script(preamble: &[String], argv: &[String]) -> String {
    let mut script = String::from(SHEBANG);
    for line in preamble {
        script.push_str(line);
        script.push('\n');
    }

    let quoted: Vec<String> = argv.iter().map(|arg| quote(arg)).collect();
    script.push_str("exec ");
    script.push_str(&quoted.join(" \\\n\t"));
    script.push('\n');
    script
}

/// Write a generated artifact, optionally marking it executable.
///
/// # Errors
///
/// Returns `AppError::Io` with a remediation hint on failure.
pub fn write_artifact(path: &Path, content: &str, executable: bool) -> Result<()> {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    fs::write(path, content).map_err(|err| {
        AppError::Io(format!(
            "failed to write {name}: {err}. Suggestion: check that the .yak-boxes directory \
             is writable and has free space"
        ))
    })?;

    if executable {
        set_executable(path).map_err(|err| {
            AppError::Io(format!("failed to mark {name} executable: {err}"))
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
