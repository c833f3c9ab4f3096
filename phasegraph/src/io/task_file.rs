//! Task files accepted by `phasegraph add-task --file`.
//!
//! A file holds one task object or an array of them. It is checked against
//! the workspace's JSON Schema before deserialization so authors get schema
//! messages instead of serde errors.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::task::Task;

/// Schema written by `phasegraph init`.
pub const TASK_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/task/v1.schema.json"
));

/// Load and validate a task file against the schema at `schema_path`.
pub fn load_task_file(schema_path: &Path, file: &Path) -> Result<Vec<Task>> {
    let schema_contents = fs::read_to_string(schema_path)
        .with_context(|| format!("read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_contents)
        .with_context(|| format!("parse schema {}", schema_path.display()))?;
    let raw =
        fs::read_to_string(file).with_context(|| format!("read task file {}", file.display()))?;
    parse_tasks(&schema, &raw).with_context(|| format!("task file {}", file.display()))
}

/// Validate `raw` against `schema` and normalize to a list of tasks.
pub fn parse_tasks(schema: &Value, raw: &str) -> Result<Vec<Task>> {
    let instance: Value = serde_json::from_str(raw).context("parse task json")?;
    let compiled = validator_for(schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    let messages: Vec<String> = compiled
        .iter_errors(&instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "task schema validation failed:\n- {}",
            messages.join("\n- ")
        ));
    }
    let mut tasks: Vec<Task> = match instance {
        Value::Array(_) => serde_json::from_value(instance).context("deserialize tasks")?,
        other => vec![serde_json::from_value(other).context("deserialize task")?],
    };
    for task in &mut tasks {
        task.dedup_parents();
    }
    Ok(tasks)
}
