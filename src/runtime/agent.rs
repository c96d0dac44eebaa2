//! Per-tool launch strategies for native workers.

use std::path::{Path, PathBuf};

use crate::models::worker::AgentTool;
use crate::runtime::scripts::{quote, quote_path};

/// Inputs shared by every wrapper script.
#[derive(Debug, Clone, Copy)]
pub struct WrapperContext<'a> {
    /// Task-tracker root exported as `YAK_PATH`.
    pub yak_path: &'a Path,
    /// Prompt file written next to the wrapper.
    pub prompt_file: &'a Path,
    /// File the wrapper records its PID in before `exec`.
    pub pid_file: &'a Path,
    /// Worker working directory.
    pub cwd: &'a Path,
    /// Resolved model.
    pub model: Option<&'a str>,
    /// Named agent profile.
    pub agent_name: Option<&'a str>,
}

/// How one agent CLI is launched on the host.
pub trait AgentLauncher: Send + Sync {
    /// Tool this launcher handles.
    fn tool(&self) -> AgentTool;

    /// Executable name.
    fn binary(&self) -> &'static str;

    /// Title of the agent pane.
    fn pane_label(&self) -> String {
        format!("{} (build)", self.tool())
    }

    /// Model used when none is given; `None` when the tool takes no model.
    fn default_model(&self) -> Option<&'static str>;

    /// Whether a model override is honoured.
    fn accepts_model(&self) -> bool {
        true
    }

    /// Wrapper script run in the agent pane.
    ///
    /// The script writes `$$` to the PID file immediately before `exec`,
    /// so the file names the agent process itself.
    fn wrapper_script(&self, ctx: &WrapperContext<'_>) -> String;
}

/// Claude Code: prompt passed as an `@file` reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeLauncher;

/// Cursor agent: prompt passed inline with an explicit workspace.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorLauncher;

/// OpenCode: prompt passed inline, fixed build agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpencodeLauncher;

fn preamble(ctx: &WrapperContext<'_>) -> String {
    format!(
        "#!/usr/bin/env bash\nexport YAK_PATH={}\n",
        quote_path(ctx.yak_path)
    )
}

fn record_pid(ctx: &WrapperContext<'_>) -> String {
    format!("echo $$ > {}\n", quote_path(ctx.pid_file))
}

fn join(args: &[String]) -> String {
    args.iter().map(|a| quote(a)).collect::<Vec<_>>().join(" ")
}

impl AgentLauncher for ClaudeLauncher {
    fn tool(&self) -> AgentTool {
        AgentTool::Claude
    }

    fn binary(&self) -> &'static str {
        "claude"
    }

    fn default_model(&self) -> Option<&'static str> {
        Some("default")
    }

    fn wrapper_script(&self, ctx: &WrapperContext<'_>) -> String {
        let mut args = vec![self.binary().to_owned()];
        if let Some(agent) = ctx.agent_name {
            args.extend(["--agent".to_owned(), agent.to_owned()]);
        }
        args.push("--dangerously-skip-permissions".to_owned());
        if let Some(model) = ctx.model {
            args.extend(["--model".to_owned(), model.to_owned()]);
        }
        args.push(format!("@{}", ctx.prompt_file.display()));

        // A nested session marker makes claude refuse to start.
        format!(
            "{}unset CLAUDECODE\n{}exec {}\n",
            preamble(ctx),
            record_pid(ctx),
            join(&args)
        )
    }
}

impl AgentLauncher for CursorLauncher {
    fn tool(&self) -> AgentTool {
        AgentTool::Cursor
    }

    fn binary(&self) -> &'static str {
        "agent"
    }

    fn default_model(&self) -> Option<&'static str> {
        Some("auto")
    }

    fn wrapper_script(&self, ctx: &WrapperContext<'_>) -> String {
        let mut args = vec![self.binary().to_owned(), "--force".to_owned()];
        if let Some(model) = ctx.model {
            args.extend(["--model".to_owned(), model.to_owned()]);
        }
        args.extend([
            "--workspace".to_owned(),
            ctx.cwd.to_string_lossy().into_owned(),
        ]);

        format!(
            "{}PROMPT=\"$(cat {})\"\n{}exec {} \"$PROMPT\"\n",
            preamble(ctx),
            quote_path(ctx.prompt_file),
            record_pid(ctx),
            join(&args)
        )
    }
}

impl AgentLauncher for OpencodeLauncher {
    fn tool(&self) -> AgentTool {
        AgentTool::Opencode
    }

    fn binary(&self) -> &'static str {
        "opencode"
    }

    fn default_model(&self) -> Option<&'static str> {
        None
    }

    fn accepts_model(&self) -> bool {
        false
    }

    fn wrapper_script(&self, ctx: &WrapperContext<'_>) -> String {
        format!(
            "{}PROMPT=\"$(cat {})\"\n{}exec opencode --prompt \"$PROMPT\" --agent build\n",
            preamble(ctx),
            quote_path(ctx.prompt_file),
            record_pid(ctx),
        )
    }
}

/// Launcher for `tool`.
#[must_use]
pub fn launcher(tool: AgentTool) -> &'static dyn AgentLauncher {
    match tool {
        AgentTool::Claude => &ClaudeLauncher,
        AgentTool::Cursor => &CursorLauncher,
        AgentTool::Opencode => &OpencodeLauncher,
    }
}

/// Model selection outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    /// Model passed to the tool.
    pub model: Option<String>,
    /// Whether a supplied override was dropped.
    pub ignored_override: bool,
}

/// Resolve the model for `tool`: a non-blank override wins, otherwise the
/// tool's default. Tools that take no model drop the override.
#[must_use]
pub fn resolve_model(tool: AgentTool, requested: Option<&str>) -> ModelChoice {
    let launcher = launcher(tool);
    let requested = requested.map(str::trim).filter(|m| !m.is_empty());

    if !launcher.accepts_model() {
        return ModelChoice {
            model: None,
            ignored_override: requested.is_some(),
        };
    }

    ModelChoice {
        model: requested
            .map(str::to_owned)
            .or_else(|| launcher.default_model().map(str::to_owned)),
        ignored_override: false,
    }
}

/// Agent profile file for `persona`, if one exists under `cwd`.
///
/// Looks for `.claude/agents/<persona>-worker.md` (persona lowercased) and
/// returns the profile's logical name.
#[must_use]
pub fn discover_agent_profile(tool: AgentTool, cwd: &Path, persona: &str) -> Option<String> {
    if tool != AgentTool::Claude {
        return None;
    }
    let name = format!("{}-worker", persona.to_lowercase());
    let candidate: PathBuf = cwd.join(".claude").join("agents").join(format!("{name}.md"));
    candidate.is_file().then_some(name)
}
