//! Deterministic task prompt rendering.
//!
//! Section order is fixed: executor hint, task description, steps, parent
//! outputs, prior progress, artifact injections. Empty sections are omitted.

use std::sync::LazyLock;

use minijinja::Environment;
use regex::Regex;

use crate::core::context::TaskContext;

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank-run regex should be valid"));

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("task", TASK_TEMPLATE)?;
        Ok(Self { env })
    }

    fn render(&self, context: &TaskContext) -> Result<String, minijinja::Error> {
        self.env.get_template("task")?.render(context)
    }
}

/// Render the prompt for an assembled task context.
pub fn render_task_prompt(context: &TaskContext) -> Result<String, minijinja::Error> {
    let rendered = PromptEngine::new()?.render(context)?;
    let mut normalized = BLANK_RUNS.replace_all(rendered.trim(), "\n\n").into_owned();
    normalized.push('\n');
    Ok(normalized)
}
