//! Multiplexer tab layouts (KDL).

use std::fmt::Write as _;
use std::path::Path;

/// Agent pane title for sandboxed workers.
pub const SANDBOXED_AGENT_PANE: &str = "opencode (build) [docker]";
/// Shell pane title for sandboxed workers.
pub const SANDBOXED_SHELL_PANE: &str = "shell: container";

/// Quote `value` as a KDL string literal.
#[must_use]
pub fn kdl_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn path_string(path: &Path) -> String {
    kdl_string(&path.to_string_lossy())
}

/// Shell pane of a tab.
#[derive(Debug, Clone, Copy)]
pub enum ShellPane<'a> {
    /// Plain shell in the tab's working directory.
    Host {
        /// Directory shown in the pane title.
        cwd: &'a Path,
    },
    /// Shell attached to a container through the wait script.
    Container {
        /// Wait script path.
        wait_script: &'a Path,
        /// Container to attach to.
        container: &'a str,
    },
}

/// Two-pane tab: the agent pane on top, a shell below.
#[derive(Debug, Clone, Copy)]
pub struct TabLayout<'a> {
    /// Tab title.
    pub tab_name: &'a str,
    /// Working directory attribute of the tab, if any.
    pub cwd: Option<&'a Path>,
    /// Agent pane title.
    pub agent_pane: &'a str,
    /// Script run in the agent pane.
    pub agent_script: &'a Path,
    /// Shell pane variant.
    pub shell: ShellPane<'a>,
}

impl TabLayout<'_> {
    /// Render the layout document.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("layout {\n");

        let _ = write!(out, "    tab name={}", kdl_string(self.tab_name));
        if let Some(cwd) = self.cwd {
            let _ = write!(out, " cwd={}", path_string(cwd));
        }
        out.push_str(" {\n");

        out.push_str("        pane size=1 borderless=true {\n");
        out.push_str("            plugin location=\"compact-bar\"\n");
        out.push_str("        }\n");

        let _ = writeln!(
            out,
            "        pane size=\"67%\" name={} focus=true {{",
            kdl_string(self.agent_pane)
        );
        out.push_str("            command \"bash\"\n");
        let _ = writeln!(out, "            args {}", path_string(self.agent_script));
        out.push_str("        }\n");

        match self.shell {
            ShellPane::Host { cwd } => {
                let _ = writeln!(
                    out,
                    "        pane size=\"33%\" name={}",
                    kdl_string(&format!("shell: {}", cwd.display()))
                );
            }
            ShellPane::Container {
                wait_script,
                container,
            } => {
                let _ = writeln!(
                    out,
                    "        pane size=\"33%\" name={} {{",
                    kdl_string(SANDBOXED_SHELL_PANE)
                );
                out.push_str("            command \"bash\"\n");
                let _ = writeln!(
                    out,
                    "            args {} {}",
                    path_string(wait_script),
                    kdl_string(container)
                );
                out.push_str("        }\n");
            }
        }

        out.push_str("        pane size=2 borderless=true {\n");
        out.push_str("            plugin location=\"status-bar\"\n");
        out.push_str("        }\n");
        out.push_str("    }\n}\n");
        out
    }
}
