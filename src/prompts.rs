//! Prompt templates — file-backed with inline fallbacks.

use std::path::Path;

use tracing::debug;

use crate::store::task::Task;

/// Template file for the execution prompt.
pub const EXECUTOR_TEMPLATE: &str = "task-executor.md";
/// Template file for the analysis prompt.
pub const ANALYZER_TEMPLATE: &str = "task-analyzer.md";

/// Inline fallback used when `prompts/task-executor.md` is missing.
const DEFAULT_EXECUTOR_PROMPT: &str = "\
You are executing task {{TASK_ID}}: {{TASK_TITLE}}.

Type: {{TASK_TYPE}}
Target: {{TASK_TARGET}}

{{TASK_DESCRIPTION}}

Do the work described above. Leave the repository in a working state.
";

/// Inline fallback used when `prompts/task-analyzer.md` is missing.
const DEFAULT_ANALYZER_PROMPT: &str = "\
Analyze task {{TASK_ID}} ({{TASK_TITLE}}, type {{TASK_TYPE}}, target {{TASK_TARGET}}):

{{TASK_DESCRIPTION}}

Estimate impact (1-10), urgency (critical|high|medium|low), success_prob
(0.0-1.0), resource_cost (minimal|moderate|heavy), and cooldown_hours, and
write them into the task document's priority block.
";

/// Render a template for a task: load the named file from the prompts
/// directory (inline fallback when absent) and substitute the task
/// placeholders.
pub async fn render(prompts_dir: &Path, template: &str, task: &Task) -> String {
    let raw = match tokio::fs::read_to_string(prompts_dir.join(template)).await {
        Ok(raw) => raw,
        Err(_) => {
            debug!(template, "Prompt template missing, using inline fallback");
            builtin(template).to_string()
        }
    };
    substitute(&raw, task)
}

fn builtin(template: &str) -> &'static str {
    match template {
        ANALYZER_TEMPLATE => DEFAULT_ANALYZER_PROMPT,
        _ => DEFAULT_EXECUTOR_PROMPT,
    }
}

fn substitute(template: &str, task: &Task) -> String {
    template
        .replace("{{TASK_ID}}", &task.id)
        .replace("{{TASK_TITLE}}", &task.title)
        .replace("{{TASK_DESCRIPTION}}", &task.description)
        .replace("{{TASK_TYPE}}", &task.task_type)
        .replace("{{TASK_TARGET}}", task.target.as_deref().unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_file_template_when_present() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(EXECUTOR_TEMPLATE),
            "Run {{TASK_ID}} / {{TASK_TITLE}} on {{TASK_TARGET}}",
        )
        .await
        .unwrap();

        let task = Task::new("Ship it", "api").with_target("svc-a");
        let rendered = render(dir.path(), EXECUTOR_TEMPLATE, &task).await;
        assert_eq!(rendered, format!("Run {} / Ship it on svc-a", task.id));
    }

    #[tokio::test]
    async fn falls_back_to_inline_template() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::new("Ship it", "api").with_type("feature");
        let rendered = render(dir.path(), ANALYZER_TEMPLATE, &task).await;
        assert!(rendered.contains(&task.id));
        assert!(rendered.contains("Ship it"));
        assert!(rendered.contains("feature"));
        assert!(!rendered.contains("{{TASK_"));
    }

    #[test]
    fn absent_target_substitutes_empty() {
        let task = Task::new("T", "api");
        let rendered = substitute("[{{TASK_TARGET}}]", &task);
        assert_eq!(rendered, "[]");
    }
}
