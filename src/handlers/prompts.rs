//! Prompt templates handed to the Claude CLI.

use crate::config::ProjectConfig;
use crate::store::models::{AutomationTag, Task};

fn or_none<'a>(value: &'a Option<String>, fallback: &'a str) -> &'a str {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(fallback)
}

pub fn research_prompt(task: &Task) -> String {
    format!(
        r#"Research the following topic and provide a comprehensive summary:

**Topic:** {}
**Context:** {}
**Description:** {}

Please:
1. Search for relevant information
2. Summarize key findings
3. List useful resources/links
4. Suggest next steps

Format your response as markdown."#,
        task.title,
        or_none(&task.context, "None provided"),
        or_none(&task.description, "None"),
    )
}

fn task_block(task: &Task) -> String {
    format!(
        "**Task:** {}\n**Description:** {}\n**Context:** {}",
        task.title,
        or_none(&task.description, "No description provided"),
        or_none(&task.context, "None"),
    )
}

fn next_actions_block(task: &Task) -> String {
    if task.next_actions.is_empty() {
        return String::new();
    }
    let items: Vec<String> = task
        .next_actions
        .iter()
        .map(|a| format!("- {}", a))
        .collect();
    format!("\n**Next actions:**\n{}\n", items.join("\n"))
}

pub fn project_prompt(task: &Task, project: &ProjectConfig) -> String {
    format!(
        r#"Implement the following task in the {} codebase:

{}
{}
Requirements:
1. Make the necessary code changes
2. Run tests: {}
3. Create a git branch and commit
4. Report what was done

Do NOT push or create PRs automatically."#,
        project.stack,
        task_block(task),
        next_actions_block(task),
        project.test_command,
    )
}

pub fn refactor_prompt(task: &Task, project: &ProjectConfig) -> String {
    format!(
        r#"Refactor the following in the {} codebase:

{}
{}
Requirements:
1. Analyze the current implementation
2. Make refactoring changes while preserving behavior
3. Run tests to ensure nothing breaks: {}
4. Create a git branch and commit with a clear message
5. Report what was refactored and why

Do NOT push or create PRs automatically."#,
        project.stack,
        task_block(task),
        next_actions_block(task),
        project.test_command,
    )
}

pub fn infra_prompt(task: &Task, project: &ProjectConfig) -> String {
    format!(
        r#"Handle the following infrastructure/DevOps task:

{}
**Stack:** {}
{}
Requirements:
1. Make the necessary configuration/infrastructure changes
2. Verify changes work correctly
3. Document any environment variables or setup needed
4. Create a git branch and commit
5. Report what was done

Do NOT push or create PRs automatically.
Be careful with any destructive operations."#,
        task_block(task),
        project.stack,
        next_actions_block(task),
    )
}

/// Pick the template for a project-class tag. Anything else gets the plain
/// project template.
pub fn for_project_tag(tag: &AutomationTag, task: &Task, project: &ProjectConfig) -> String {
    match tag {
        AutomationTag::Refactor => refactor_prompt(task, project),
        AutomationTag::Infra => infra_prompt(task, project),
        _ => project_prompt(task, project),
    }
}
