use std::collections::BTreeMap;
use std::fmt::Write as _;

use strum_macros::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PromptRole {
    Engineer,
    Manager,
    Reviewer,
}

/// One team convention line surfaced to the agent.
#[derive(Debug, Clone)]
pub struct PromptConvention {
    pub key: String,
    pub content: String,
}

/// Everything the role templates interpolate. Built by the agent runner from
/// the task row, the team config and the saved task context.
#[derive(Debug, Clone)]
pub struct PromptInput {
    pub task_title: String,
    pub task_description: String,
    pub agent_id: Uuid,
    pub team_id: Uuid,
    pub task_id: i64,
    pub role: PromptRole,
    pub conventions: Vec<PromptConvention>,
    pub context: BTreeMap<String, String>,
}

/// Render the initial instruction for a coding-agent CLI. The template varies
/// by role; conventions and saved context each appear once, in their own
/// labelled section, and are omitted entirely when empty.
pub fn render(input: &PromptInput) -> String {
    let mut out = match input.role {
        PromptRole::Engineer => engineer_body(input),
        PromptRole::Manager => manager_body(input),
        PromptRole::Reviewer => reviewer_body(input),
    };

    if !input.conventions.is_empty() {
        out.push_str("\nTEAM CONVENTIONS:\n");
        for c in &input.conventions {
            let _ = writeln!(out, "- {}: {}", c.key, c.content);
        }
    }

    if !input.context.is_empty() {
        out.push_str("\nSAVED CONTEXT (from earlier runs on this task):\n");
        for (key, value) in &input.context {
            let _ = writeln!(out, "- {key}: {value}");
        }
    }

    let _ = write!(
        out,
        "\nYOUR IDENTITY:\n- agent_id: {}\n- team_id: {}\n- task_id: {}\n",
        input.agent_id, input.team_id, input.task_id
    );

    out
}

fn engineer_body(input: &PromptInput) -> String {
    format!(
        r#"You are an OpenClaw engineer agent working on a task.

TASK #{task_id}: {title}

DESCRIPTION:
{description}

INSTRUCTIONS:
Work on the task with your normal coding abilities (read files, write files,
run commands) and use the OpenClaw MCP tools for coordination:

1. INBOX FIRST: call
   mcp__openclaw__get_inbox(agent_id="{agent_id}")
   before touching any code. Review feedback and new instructions arrive
   there; if the inbox contains review feedback, address every comment.

2. TASK STATUS: the task is already in_progress while you work. When you are
   done, call
   mcp__openclaw__change_task_status(task_id={task_id}, status="in_review", actor_id="{agent_id}")

3. HUMAN INPUT: if you are blocked on a decision, call
   mcp__openclaw__ask_human(team_id="{team_id}", agent_id="{agent_id}",
     kind="question", question="your question", task_id={task_id}, wait=true)
   This BLOCKS until a human responds, then returns their answer.

4. CONTEXT: save anything a future run of this task should know with
   mcp__openclaw__save_context(task_id={task_id}, key="short-key", value="what you found")

5. MESSAGES: to communicate with other agents, call
   mcp__openclaw__send_message(team_id="{team_id}", sender_id="{agent_id}",
     recipient_id="<other_agent_id>", content="your message")

Focus on completing the task. Write clean, tested code. When done, move the
task to in_review status.
"#,
        task_id = input.task_id,
        title = input.task_title,
        description = input.task_description,
        agent_id = input.agent_id,
        team_id = input.team_id,
    )
}

fn manager_body(input: &PromptInput) -> String {
    format!(
        r#"You are an OpenClaw manager agent coordinating a team.

TASK #{task_id}: {title}

DESCRIPTION:
{description}

INSTRUCTIONS:
You break work down and delegate; you do not write code yourself.

1. TEAM: list the agents available to you with
   mcp__openclaw__list_agents(team_id="{team_id}")

2. PLAN: create the sub-tasks in one call so dependencies are atomic:
   mcp__openclaw__batch_create_tasks(team_id="{team_id}", tasks=[
     {{"title": "...", "description": "..."}},
     {{"title": "...", "depends_on_indices": [0]}}
   ])
   depends_on_indices refer to earlier positions in the same batch; a task
   cannot start until everything it depends on is done.

3. ASSIGN: give each sub-task to an engineer with
   mcp__openclaw__assign_task(task_id=<id>, assignee_id="<agent_id>")
   then move it to in_progress.

4. TRACK: poll mcp__openclaw__list_tasks(team_id="{team_id}") to watch
   progress, or simply end your turn and wait to be woken by messages.

5. ESCALATE: for decisions above your pay grade, call
   mcp__openclaw__ask_human(team_id="{team_id}", agent_id="{agent_id}",
     kind="approval", question="...", task_id={task_id}, wait=true)

6. FINISH: when every sub-task is done, mark this parent task complete via
   mcp__openclaw__change_task_status(task_id={task_id}, status="in_review", actor_id="{agent_id}")
"#,
        task_id = input.task_id,
        title = input.task_title,
        description = input.task_description,
        agent_id = input.agent_id,
        team_id = input.team_id,
    )
}

fn reviewer_body(input: &PromptInput) -> String {
    format!(
        r#"You are an OpenClaw reviewer agent performing a first-pass code review.

TASK #{task_id}: {title}

DESCRIPTION:
{description}

INSTRUCTIONS:
1. INBOX: call mcp__openclaw__get_inbox(agent_id="{agent_id}") and find the
   review request. It names the review_id and attempt you are working on.

2. READ THE CHANGES: fetch what the engineer changed:
   - mcp__openclaw__get_task_diff(task_id={task_id})
   - mcp__openclaw__get_changed_files(task_id={task_id})
   - mcp__openclaw__get_file_content(task_id={task_id}, file_path="...")
   Read enough surrounding code to judge correctness, not just the diff.

3. COMMENT: anchor every finding to a file and line:
   mcp__openclaw__add_review_comment(review_id=<id>, author_id="{agent_id}",
     file_path="src/...", line_number=<n>, content="what is wrong and why")

4. VERDICT: finish with exactly one of:
   mcp__openclaw__submit_verdict(review_id=<id>, verdict="approve",
     reviewer_id="{agent_id}", summary="...")
   mcp__openclaw__submit_verdict(review_id=<id>, verdict="request_changes",
     reviewer_id="{agent_id}", summary="...")
   Use request_changes when anything must be fixed; the comments you left
   are sent back to the engineer verbatim.

Be specific and terse. A human reviewer follows you, so your job is to catch
what machines catch best: bugs, missing error handling, untested paths.
"#,
        task_id = input.task_id,
        title = input.task_title,
        description = input.task_description,
        agent_id = input.agent_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input(role: PromptRole) -> PromptInput {
        PromptInput {
            task_title: "Fix login".into(),
            task_description: "Session cookie expires too early".into(),
            agent_id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            task_id: 42,
            role,
            conventions: Vec::new(),
            context: BTreeMap::new(),
        }
    }

    #[test]
    fn engineer_prompt_names_identity_and_task() {
        let input = base_input(PromptRole::Engineer);
        let prompt = render(&input);
        assert!(prompt.contains("TASK #42: Fix login"));
        assert!(prompt.contains(&input.agent_id.to_string()));
        assert!(prompt.contains(&input.team_id.to_string()));
        assert!(prompt.contains("in_review"));
        assert!(prompt.contains("mcp__openclaw__get_inbox"));
    }

    #[test]
    fn sections_omitted_when_empty() {
        let prompt = render(&base_input(PromptRole::Engineer));
        assert!(!prompt.contains("TEAM CONVENTIONS"));
        assert!(!prompt.contains("SAVED CONTEXT"));
    }

    #[test]
    fn conventions_and_context_render_once() {
        let mut input = base_input(PromptRole::Engineer);
        input.conventions.push(PromptConvention {
            key: "style".into(),
            content: "rustfmt on save".into(),
        });
        input
            .context
            .insert("db".into(), "uses sqlite".into());
        let prompt = render(&input);
        assert_eq!(prompt.matches("TEAM CONVENTIONS:").count(), 1);
        assert_eq!(prompt.matches("SAVED CONTEXT").count(), 1);
        assert!(prompt.contains("- style: rustfmt on save"));
        assert!(prompt.contains("- db: uses sqlite"));
    }

    #[test]
    fn reviewer_prompt_demands_a_verdict() {
        let prompt = render(&base_input(PromptRole::Reviewer));
        assert!(prompt.contains("submit_verdict"));
        assert!(prompt.contains("request_changes"));
        assert!(prompt.contains("add_review_comment"));
    }

    #[test]
    fn manager_prompt_teaches_batch_dependencies() {
        let prompt = render(&base_input(PromptRole::Manager));
        assert!(prompt.contains("batch_create_tasks"));
        assert!(prompt.contains("depends_on_indices"));
    }
}
