//! Initial prompt handed to a worker's agent.

use std::fmt::Write as _;
use std::path::Path;

use crate::models::worker::AgentMode;

/// Instruction used when the caller gives none.
pub const DEFAULT_INSTRUCTION: &str = "Work on the assigned tasks.";

const PLAN_ROLE: &str = "Your supervisor is Yakob. The yaks are tasks — your job is to scout them \
and plan the shave. Do NOT pick up the clippers.";

const BUILD_ROLE: &str =
    "Your supervisor is Yakob. The yaks are tasks — your job is to shave them clean.";

const PLAN_WORKFLOW: &str = r#"Workflow:
1. Run 'yx ls' to see available tasks
2. Pick a task, read its context with 'yx context --show <name>'
3. Set it to wip: 'yx state <name> wip'
4. Report status: echo "wip: starting plan" | yx field <name> agent-status
5. Analyze the codebase, understand the problem, and write a detailed plan
6. Save the plan where it makes sense (e.g. a markdown file, or in yx context)
7. Report: echo "blocked: plan ready for review" | yx field <name> agent-status
8. STOP and wait — do NOT implement. Your job is to plan, not build.

Focus on the tasks assigned to you. Do not modify tasks outside your scope."#;

const BUILD_WORKFLOW: &str = r#"Workflow:
1. Run 'yx ls' to see available tasks
2. Pick a task, read its context with 'yx context --show <name>'
3. Set it to wip: 'yx state <name> wip'
4. Report status: echo "wip: starting" | yx field <name> agent-status
5. Do the work (update agent-status as you make progress)
6. When done: 'yx done <name>' then echo "done: <summary>" | yx field <name> agent-status
7. If blocked: echo "blocked: <reason>" | yx field <name> agent-status

Focus on the tasks assigned to you. Do not modify tasks outside your scope."#;

const TRACKER_HELP: &str = r#"Commands:
  yx ls                     Show all tasks and their states
  yx context --show <name>  Read the context/requirements for a task
  yx done <name>            Mark a task as complete
  yx state <name> wip       Mark a task as in-progress

Reporting status (IMPORTANT -- the orchestrator monitors these fields):
  echo "<status>" | yx field <name> agent-status

  Write agent-status at each transition:
  - When starting:  echo "wip: starting" | yx field <name> agent-status
  - Progress:       echo "wip: <what you're doing>" | yx field <name> agent-status
  - When blocked:   echo "blocked: <reason>" | yx field <name> agent-status
  - When done:      echo "done: <summary>" | yx field <name> agent-status"#;

/// Assemble the prompt for a worker.
///
/// `instruction` falls back to [`DEFAULT_INSTRUCTION`] when blank.
#[must_use]
pub fn build(mode: AgentMode, yak_path: &Path, instruction: &str, tasks: &[String]) -> String {
    let (role, workflow) = match mode {
        AgentMode::Plan => (PLAN_ROLE, PLAN_WORKFLOW),
        AgentMode::Build => (BUILD_ROLE, BUILD_WORKFLOW),
    };

    let instruction = if instruction.trim().is_empty() {
        DEFAULT_INSTRUCTION
    } else {
        instruction
    };

    format!(
        "{role}\n\n{instruction}\n\n{assignment}\n\nYou have access to a task tracker called yx. \
         The task state lives in {yak_path}.\n\n{TRACKER_HELP}\n\n{workflow}",
        assignment = assignment_block(tasks),
        yak_path = yak_path.display(),
    )
}

fn assignment_block(tasks: &[String]) -> String {
    match tasks {
        [] => "---\nTASK TRACKER (yx)".to_owned(),
        [task] => format!(
            "---\nASSIGNED TASK\n\nYou are assigned to work on: {task}\n\n\
             Read the task details: yx context --show {task}\n\
             Start working: yx state {task} wip\n\n---\nTASK TRACKER (yx)"
        ),
        many => {
            let mut list = String::new();
            for task in many {
                let _ = writeln!(list, "  - {task}");
            }
            format!(
                "---\nASSIGNED TASKS\n\nYou are assigned to work on:\n{list}\n\
                 Read each task's details: yx context --show <task>\n\
                 Start working: yx state <task> wip\n\n---\nTASK TRACKER (yx)"
            )
        }
    }
}
