//! Task, wave, and validation records consumed by the resolver.

use serde::{Deserialize, Serialize};

/// A unit of work produced by upstream decomposition.
///
/// `depends_on` may reference ids outside the current scheduling run;
/// external ids are treated as already satisfied, not as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Estimated duration in minutes.
    pub estimated_duration: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Task {
    pub fn new(id: &str, estimated_duration: u32, depends_on: Vec<&str>) -> Self {
        Self {
            id: id.to_string(),
            estimated_duration,
            depends_on: depends_on.into_iter().map(String::from).collect(),
        }
    }
}

/// A group of tasks whose dependencies are all satisfied by earlier waves.
///
/// Tasks within a wave are eligible to run fully in parallel, so the wave
/// estimate is the maximum of its members' durations, not the sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    pub sequence_number: usize,
    pub tasks: Vec<Task>,
    pub estimated_duration: u32,
}

impl Wave {
    pub fn new(sequence_number: usize, tasks: Vec<Task>) -> Self {
        let estimated_duration = tasks.iter().map(|t| t.estimated_duration).max().unwrap_or(0);
        Self {
            sequence_number,
            tasks,
            estimated_duration,
        }
    }

    /// Ids of the wave's tasks, in placement order.
    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }
}

/// A dependency path that returns to its own start.
///
/// A self-dependency is a one-element cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    pub task_ids: Vec<String>,
}

impl Cycle {
    pub fn contains(&self, task_id: &str) -> bool {
        self.task_ids.iter().any(|id| id == task_id)
    }
}

/// Result of [`validate`](super::validate): human-readable issues found in
/// a task list. Unresolved external dependencies are not issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wave_duration_is_max_of_members() {
        let wave = Wave::new(
            0,
            vec![Task::new("a", 10, vec![]), Task::new("b", 25, vec![])],
        );
        assert_eq!(wave.estimated_duration, 25);
    }

    #[test]
    fn empty_wave_has_zero_duration() {
        let wave = Wave::new(0, vec![]);
        assert_eq!(wave.estimated_duration, 0);
    }

    #[test]
    fn task_serde_defaults_missing_dependencies() {
        let task: Task = serde_json::from_str(r#"{"id":"t1","estimated_duration":5}"#).unwrap();
        assert!(task.depends_on.is_empty());
    }
}
