//! Semantic invariants of an iteration not expressible via JSON Schema.

use std::collections::{HashMap, HashSet};

use crate::core::graph::find_cycle;
use crate::task::{Task, TaskRecord, TaskStatus};

/// Check semantic invariants of one iteration:
/// - No duplicate or empty ids
/// - Every parent exists and the graph is acyclic
/// - Every status record belongs to a declared task
/// - In-progress or done tasks have all parents done
/// - Confidence scores lie in 1..=5
pub fn validate_iteration(tasks: &[Task], records: &HashMap<String, TaskRecord>) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for task in tasks {
        if task.id.trim().is_empty() {
            errors.push("task id must be non-empty".to_string());
        }
        if !seen.insert(task.id.as_str()) {
            errors.push(format!("duplicate id '{}'", task.id));
        }
    }

    for task in tasks {
        for parent in &task.parents {
            if !seen.contains(parent.as_str()) {
                errors.push(format!("{}: unknown parent '{}'", task.id, parent));
            }
        }
    }

    if let Some(path) = find_cycle(tasks) {
        errors.push(format!("dependency cycle: {}", path.join(" -> ")));
    }

    let mut orphans: Vec<&String> = records
        .keys()
        .filter(|id| !seen.contains(id.as_str()))
        .collect();
    orphans.sort();
    for id in orphans {
        errors.push(format!("status record '{}' has no task", id));
    }

    let status = |id: &str| {
        records
            .get(id)
            .map(|record| record.status)
            .unwrap_or_default()
    };
    for task in tasks {
        let started = matches!(
            status(task.id.as_str()),
            TaskStatus::InProgress | TaskStatus::Done
        );
        if started {
            for parent in &task.parents {
                if seen.contains(parent.as_str()) && status(parent.as_str()) != TaskStatus::Done {
                    errors.push(format!(
                        "{}: is {} but parent '{}' is {}",
                        task.id,
                        status(task.id.as_str()),
                        parent,
                        status(parent.as_str())
                    ));
                }
            }
        }
        if let Some(confidence) = records.get(&task.id).and_then(|r| r.confidence.as_ref()) {
            if !(1..=5).contains(&confidence.score) {
                errors.push(format!(
                    "{}: confidence {} outside 1..=5",
                    task.id, confidence.score
                ));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Confidence;
    use crate::test_support::task;

    fn record(id: &str, status: TaskStatus) -> (String, TaskRecord) {
        let mut record = TaskRecord::fresh(id);
        record.status = status;
        (id.to_string(), record)
    }

    #[test]
    fn clean_iteration_has_no_errors() {
        let tasks = vec![task("a", &[]), task("b", &["a"])];
        let records = HashMap::from([
            record("a", TaskStatus::Done),
            record("b", TaskStatus::InProgress),
        ]);
        assert!(validate_iteration(&tasks, &records).is_empty());
    }

    #[test]
    fn reports_structure_and_status_violations() {
        let tasks = vec![task("a", &["b"]), task("b", &["a"]), task("c", &["ghost"])];
        let mut records = HashMap::from([
            record("a", TaskStatus::Done),
            record("zombie", TaskStatus::Todo),
        ]);
        let (id, mut low) = record("c", TaskStatus::Todo);
        low.confidence = Some(Confidence {
            score: 9,
            rationale: String::new(),
        });
        records.insert(id, low);

        let errors = validate_iteration(&tasks, &records);
        assert!(errors.iter().any(|e| e.contains("unknown parent 'ghost'")));
        assert!(errors.iter().any(|e| e.starts_with("dependency cycle")));
        assert!(errors.iter().any(|e| e.contains("'zombie' has no task")));
        assert!(errors.iter().any(|e| e.contains("a: is done but parent 'b' is todo")));
        assert!(errors.iter().any(|e| e.contains("confidence 9")));
    }
}
