//! Prompt text for every engine call.
//!
//! Each prompt opens with a fixed header line so logs (and test engines) can
//! tell the stages apart.

use crate::types::Task;
use std::time::Duration;

pub const PLAN_HEADER: &str = "## Shipyard: plan";
pub const TASK_HEADER: &str = "## Shipyard: task";
pub const REVIEW_HEADER: &str = "## Shipyard: review";
pub const REFINE_HEADER: &str = "## Shipyard: refine";
pub const REPLAN_HEADER: &str = "## Shipyard: replan";
pub const VALIDATE_HEADER: &str = "## Shipyard: validate";

/// Longest slice of a task result quoted back to the engine.
pub const RESULT_EXCERPT_CHARS: usize = 500;

pub fn plan_prompt(goal: &str) -> String {
    format!(
        "{PLAN_HEADER}

Read the design below and produce a one or two sentence project summary plus
the list of coding tasks needed to build it.

<design>
{goal}
</design>

Answer with this XML and nothing else:

<project>
<context>What is being built, in which language and framework</context>
<tasks>
<task>Create the crate manifest with its dependencies</task>
<task>Implement the HTTP server with a health endpoint</task>
</tasks>
</project>

Task rules:
- one concrete, finishable coding action per task
- start every task with a verb (Create, Add, Implement, Write, Fix)
- leave out explanations and examples
- merge closely related items"
    )
}

pub fn task_prompt(project_context: &str, description: &str, timeout: Duration) -> String {
    let mut parts = Vec::new();
    if !project_context.is_empty() {
        parts.push(format!("Project: {project_context}"));
    }
    parts.push(format!(
        "You have {} minutes for this task. Stay focused and finish within that time.",
        timeout.as_secs().div_ceil(60).max(1)
    ));
    parts.push(format!("Task: {description}"));
    format!("{TASK_HEADER}\n\n{}", parts.join("\n\n"))
}

pub fn review_prompt(task: &Task) -> String {
    let result = task.result.as_deref().unwrap_or_default();
    let excerpt: String = result.chars().take(RESULT_EXCERPT_CHARS).collect();
    format!(
        "{REVIEW_HEADER}

Check whether this task was actually carried out. Look at the files it should
have touched and answer PASS or FAIL with one sentence of reasoning.

Task: {}

Reported result:
{excerpt}",
        task.description
    )
}

fn done_lines(completed: &[Task]) -> String {
    if completed.is_empty() {
        return "None".to_string();
    }
    completed
        .iter()
        .map(|t| format!("- [DONE] {}", t.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn failed_lines(failed: &[Task]) -> String {
    if failed.is_empty() {
        return "None".to_string();
    }
    failed
        .iter()
        .map(|t| {
            format!(
                "- [FAILED] {}: {}",
                t.description,
                t.error.as_deref().unwrap_or("unknown error")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn refine_prompt(project_context: &str, completed: &[Task], failed: &[Task]) -> String {
    format!(
        "{REFINE_HEADER}

Project: {project_context}

Recently completed:
{}

Failed:
{}

Decide whether follow-up work is needed: missing tests, fixes, integration
glue, a different approach for something that failed. List only work that is
clearly needed. If nothing is, return an empty list.

<tasks>
<task>Add unit tests for the new HTTP handlers</task>
</tasks>

or, when the work is complete:

<tasks>
</tasks>",
        done_lines(completed),
        failed_lines(failed)
    )
}

pub fn replan_prompt(
    project_context: &str,
    goal: &str,
    completed: &[Task],
    failed: &[Task],
) -> String {
    format!(
        "{REPLAN_HEADER}

Step back and compare the original goal with what has been done so far.

Project: {project_context}

Goal:
{goal}

Completed:
{}

Failed:
{}

If the goal is not met, list the tasks that would close the gap, replacing
approaches that keep failing. If it is met, return an empty list.

<tasks>
<task>Implement X to replace failed approach Y</task>
</tasks>

or, when the goal is met:

<tasks>
</tasks>",
        done_lines(completed),
        failed_lines(failed)
    )
}

pub fn validate_prompt(design: &str) -> String {
    format!(
        "{VALIDATE_HEADER}

Review this design before it is split into tasks. It must be specific enough
that a planner can derive concrete tasks and a reviewer can tell when the work
is done.

Design:
{design}

Answer with this XML and nothing else:

<validation>
<decision>accept|reject</decision>
<gaps>
<gap>No target language or framework given</gap>
</gaps>
<project>
PROJECT.md content when accepted
</project>
</validation>

Rules:
- reject when language, runtime, interfaces, scope or constraints are missing
- reject when the end state cannot be observed or tested
- when accepting, leave <gaps> empty and write a short PROJECT.md covering
  goal, stack, interfaces, constraints and success criteria
- when rejecting, leave <project> empty"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskOrigin, TaskStatus};

    #[test]
    fn test_headers_lead_each_prompt() {
        assert!(plan_prompt("g").starts_with(PLAN_HEADER));
        assert!(task_prompt("", "d", Duration::from_secs(600)).starts_with(TASK_HEADER));
        assert!(refine_prompt("", &[], &[]).starts_with(REFINE_HEADER));
        assert!(replan_prompt("", "g", &[], &[]).starts_with(REPLAN_HEADER));
        assert!(validate_prompt("d").starts_with(VALIDATE_HEADER));
    }

    #[test]
    fn test_task_prompt_includes_context_and_budget() {
        let prompt = task_prompt("Rust API", "Add a health endpoint", Duration::from_secs(600));
        assert!(prompt.contains("Project: Rust API"));
        assert!(prompt.contains("10 minutes"));
        assert!(prompt.ends_with("Task: Add a health endpoint"));

        let bare = task_prompt("", "Add a health endpoint", Duration::from_secs(30));
        assert!(!bare.contains("Project:"));
        assert!(bare.contains("1 minutes"));
    }

    #[test]
    fn test_history_lines() {
        let mut done = Task::new("Create server", TaskOrigin::Planner);
        done.status = TaskStatus::Completed;
        let mut failed = Task::new("Add TLS", TaskOrigin::Planner);
        failed.status = TaskStatus::Failed;
        failed.error = Some("timeout after 600s".into());

        let prompt = refine_prompt("ctx", &[done], &[failed]);
        assert!(prompt.contains("- [DONE] Create server"));
        assert!(prompt.contains("- [FAILED] Add TLS: timeout after 600s"));

        let empty = replan_prompt("ctx", "the goal", &[], &[]);
        assert!(empty.contains("Completed:\nNone"));
        assert!(empty.contains("the goal"));
    }

    #[test]
    fn test_review_prompt_truncates_result() {
        let mut task = Task::new("Write docs", TaskOrigin::Planner);
        task.result = Some("x".repeat(2000));
        let prompt = review_prompt(&task);
        assert!(prompt.contains(&"x".repeat(RESULT_EXCERPT_CHARS)));
        assert!(!prompt.contains(&"x".repeat(RESULT_EXCERPT_CHARS + 1)));
    }
}
