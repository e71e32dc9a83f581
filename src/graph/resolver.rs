//! Pure resolution algorithms over a task list.
//!
//! All functions restrict dependency edges to ids present in the given
//! task set; dependencies on outside ids are treated as already satisfied.

use crate::errors::GraphError;
use crate::graph::task::{Cycle, Task, ValidationReport, Wave};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::warn;

/// Map each task id to its index in the input slice.
fn index_of(tasks: &[Task]) -> HashMap<&str, usize> {
    tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect()
}

/// Order tasks so every task appears after all its in-set dependencies.
///
/// Kahn's algorithm over the in-set edges. Deterministic subject to input
/// order for ties. Fails with [`GraphError::CycleDetected`] naming the
/// unresolved task ids when a cycle prevents a complete ordering.
pub fn topological_sort(tasks: &[Task]) -> Result<Vec<Task>, GraphError> {
    let index = index_of(tasks);

    let mut in_degree = vec![0usize; tasks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, task) in tasks.iter().enumerate() {
        for dep in &task.depends_on {
            if let Some(&dep_idx) = index.get(dep.as_str()) {
                in_degree[i] += 1;
                dependents[dep_idx].push(i);
            }
        }
    }

    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(i, _)| i)
        .collect();

    let mut ordered = Vec::with_capacity(tasks.len());
    while let Some(i) = queue.pop_front() {
        ordered.push(tasks[i].clone());
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if ordered.len() != tasks.len() {
        let task_ids = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg > 0)
            .map(|(i, _)| tasks[i].id.clone())
            .collect();
        return Err(GraphError::CycleDetected { task_ids });
    }

    Ok(ordered)
}

/// Whether the task set contains at least one dependency cycle.
pub fn has_circular_dependency(tasks: &[Task]) -> bool {
    topological_sort(tasks).is_err()
}

/// Find every dependency cycle via depth-first search.
///
/// Each back-edge into a node still on the recursion stack yields one
/// cycle containing the stack slice from that node onward; a
/// self-dependency is a one-element cycle. The search continues from
/// unvisited nodes after a cycle is recorded, so independent cycles are
/// all reported.
pub fn detect_cycles(tasks: &[Task]) -> Vec<Cycle> {
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    struct Dfs<'a> {
        tasks: &'a [Task],
        index: HashMap<&'a str, usize>,
        color: Vec<u8>,
        path: Vec<usize>,
        cycles: Vec<Cycle>,
    }

    impl Dfs<'_> {
        fn visit(&mut self, i: usize) {
            self.color[i] = GRAY;
            self.path.push(i);

            let deps = self.tasks[i].depends_on.clone();
            for dep in &deps {
                let Some(&dep_idx) = self.index.get(dep.as_str()) else {
                    continue;
                };
                match self.color[dep_idx] {
                    WHITE => self.visit(dep_idx),
                    GRAY => {
                        // Back-edge: the cycle is the stack slice starting
                        // at the revisited node.
                        let start = self
                            .path
                            .iter()
                            .position(|&p| p == dep_idx)
                            .expect("gray node must be on the path");
                        let task_ids = self.path[start..]
                            .iter()
                            .map(|&p| self.tasks[p].id.clone())
                            .collect();
                        self.cycles.push(Cycle { task_ids });
                    }
                    _ => {}
                }
            }

            self.path.pop();
            self.color[i] = BLACK;
        }
    }

    let mut dfs = Dfs {
        tasks,
        index: index_of(tasks),
        color: vec![WHITE; tasks.len()],
        path: Vec::new(),
        cycles: Vec::new(),
    };

    for i in 0..tasks.len() {
        if dfs.color[i] == WHITE {
            dfs.visit(i);
        }
    }

    dfs.cycles
}

/// Partition tasks into waves of fully-parallel work.
///
/// Greedy leveling: each round collects every not-yet-placed task whose
/// dependencies are all placed or external. Unlike [`topological_sort`],
/// a cycle is not a hard failure here: a round that would otherwise be
/// empty force-places one remaining task (logged loudly) so scheduling
/// always terminates.
pub fn calculate_waves(tasks: &[Task]) -> Vec<Wave> {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<usize> = (0..tasks.len()).collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
        let mut ready: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| {
                tasks[i]
                    .depends_on
                    .iter()
                    .all(|dep| placed.contains(dep.as_str()) || !ids.contains(dep.as_str()))
            })
            .collect();

        if ready.is_empty() {
            // Only reachable under a cycle. Break the deadlock rather than
            // fail the whole schedule.
            let forced = remaining[0];
            warn!(
                task_id = %tasks[forced].id,
                wave = waves.len(),
                "dependency deadlock: force-placing task into current wave"
            );
            ready.push(forced);
        }

        for &i in &ready {
            placed.insert(tasks[i].id.as_str());
        }
        remaining.retain(|i| !ready.contains(i));

        let wave_tasks = ready.iter().map(|&i| tasks[i].clone()).collect();
        waves.push(Wave::new(waves.len(), wave_tasks));
    }

    waves
}

/// Transitive closure of a task's dependencies, restricted to ids present
/// in the task set.
pub fn get_all_dependencies(task_id: &str, tasks: &[Task]) -> HashSet<String> {
    let index = index_of(tasks);
    let mut seen = HashSet::new();
    let mut stack: Vec<&str> = Vec::new();

    if let Some(&start) = index.get(task_id) {
        stack.extend(tasks[start].depends_on.iter().map(String::as_str));
    }

    while let Some(dep) = stack.pop() {
        let Some(&dep_idx) = index.get(dep) else {
            continue;
        };
        if seen.insert(dep.to_string()) {
            stack.extend(tasks[dep_idx].depends_on.iter().map(String::as_str));
        }
    }

    seen
}

/// Tasks whose `depends_on` directly contains `task_id`.
pub fn get_dependents(task_id: &str, tasks: &[Task]) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| t.depends_on.iter().any(|dep| dep == task_id))
        .cloned()
        .collect()
}

/// The dependency chain with the greatest summed duration.
///
/// Dynamic programming over the DAG, memoized per task. Ties are broken
/// by the natural task order encountered. On cyclic input the in-progress
/// nodes contribute nothing, keeping the computation total.
pub fn get_critical_path(tasks: &[Task]) -> Vec<Task> {
    let index = index_of(tasks);

    // memo[i] = (summed duration, chain of indices ending at i)
    fn chain(
        i: usize,
        tasks: &[Task],
        index: &HashMap<&str, usize>,
        memo: &mut HashMap<usize, (u64, Vec<usize>)>,
        visiting: &mut HashSet<usize>,
    ) -> (u64, Vec<usize>) {
        if let Some(cached) = memo.get(&i) {
            return cached.clone();
        }
        if !visiting.insert(i) {
            return (0, Vec::new());
        }

        let mut best: (u64, Vec<usize>) = (0, Vec::new());
        for dep in &tasks[i].depends_on {
            if let Some(&dep_idx) = index.get(dep.as_str()) {
                let candidate = chain(dep_idx, tasks, index, memo, visiting);
                if candidate.0 > best.0 {
                    best = candidate;
                }
            }
        }

        let mut path = best.1;
        path.push(i);
        let result = (best.0 + u64::from(tasks[i].estimated_duration), path);
        visiting.remove(&i);
        memo.insert(i, result.clone());
        result
    }

    let mut memo = HashMap::new();
    let mut visiting = HashSet::new();
    let mut best: (u64, Vec<usize>) = (0, Vec::new());
    for i in 0..tasks.len() {
        let candidate = chain(i, tasks, &index, &mut memo, &mut visiting);
        if candidate.0 > best.0 {
            best = candidate;
        }
    }

    best.1.into_iter().map(|i| tasks[i].clone()).collect()
}

/// Tasks not yet completed whose every dependency is completed or external.
pub fn get_next_available(tasks: &[Task], completed: &HashSet<String>) -> Vec<Task> {
    let index = index_of(tasks);
    tasks
        .iter()
        .filter(|t| !completed.contains(&t.id))
        .filter(|t| {
            t.depends_on
                .iter()
                .all(|dep| completed.contains(dep) || !index.contains_key(dep.as_str()))
        })
        .cloned()
        .collect()
}

/// Report self-dependencies and cycles as human-readable issues.
///
/// Unresolved external dependencies are deliberately not issues.
pub fn validate(tasks: &[Task]) -> ValidationReport {
    let mut issues = Vec::new();

    for task in tasks {
        if task.depends_on.iter().any(|dep| dep == &task.id) {
            issues.push(format!("Task '{}' depends on itself", task.id));
        }
    }

    for cycle in detect_cycles(tasks) {
        if cycle.task_ids.len() > 1 {
            let mut path = cycle.task_ids.clone();
            path.push(cycle.task_ids[0].clone());
            issues.push(format!("Circular dependency: {}", path.join(" -> ")));
        }
    }

    ValidationReport {
        valid: issues.is_empty(),
        issues,
    }
}

/// Lower bound on total completion time: the sum of per-wave maxima.
pub fn total_estimate(waves: &[Wave]) -> u64 {
    waves.iter().map(|w| u64::from(w.estimated_duration)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, duration: u32, deps: Vec<&str>) -> Task {
        Task::new(id, duration, deps)
    }

    #[test]
    fn sort_orders_dependencies_first() {
        let tasks = vec![
            task("d", 1, vec!["b", "c"]),
            task("b", 1, vec!["a"]),
            task("c", 1, vec!["a"]),
            task("a", 1, vec![]),
        ];

        let sorted = topological_sort(&tasks).unwrap();
        assert_eq!(sorted.len(), 4);
        let pos = |id: &str| sorted.iter().position(|t| t.id == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn sort_fails_on_cycle_naming_tasks() {
        let tasks = vec![
            task("a", 1, vec!["b"]),
            task("b", 1, vec!["a"]),
            task("c", 1, vec![]),
        ];

        let err = topological_sort(&tasks).unwrap_err();
        let GraphError::CycleDetected { task_ids } = err;
        assert!(task_ids.contains(&"a".to_string()));
        assert!(task_ids.contains(&"b".to_string()));
        assert!(!task_ids.contains(&"c".to_string()));
    }

    #[test]
    fn sort_treats_external_dependencies_as_satisfied() {
        let tasks = vec![task("a", 1, vec!["not-in-this-run"])];
        let sorted = topological_sort(&tasks).unwrap();
        assert_eq!(sorted[0].id, "a");
    }

    #[test]
    fn has_circular_dependency_does_not_panic() {
        assert!(has_circular_dependency(&[task("a", 1, vec!["a"])]));
        assert!(!has_circular_dependency(&[task("a", 1, vec![])]));
    }

    #[test]
    fn detect_cycles_two_node() {
        let tasks = vec![task("a", 1, vec!["b"]), task("b", 1, vec!["a"])];
        let cycles = detect_cycles(&tasks);
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].contains("a"));
        assert!(cycles[0].contains("b"));
    }

    #[test]
    fn detect_cycles_self_dependency() {
        let tasks = vec![task("a", 1, vec!["a"])];
        let cycles = detect_cycles(&tasks);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].task_ids, vec!["a".to_string()]);
    }

    #[test]
    fn detect_cycles_reports_independent_cycles() {
        let tasks = vec![
            task("a", 1, vec!["b"]),
            task("b", 1, vec!["a"]),
            task("c", 1, vec!["d"]),
            task("d", 1, vec!["c"]),
        ];
        let cycles = detect_cycles(&tasks);
        assert_eq!(cycles.len(), 2);
    }

    #[test]
    fn detect_cycles_clean_graph_is_empty() {
        let tasks = vec![task("a", 1, vec![]), task("b", 1, vec!["a"])];
        assert!(detect_cycles(&tasks).is_empty());
    }

    #[test]
    fn waves_use_max_duration_not_sum() {
        let tasks = vec![
            task("a", 5, vec![]),
            task("b", 10, vec!["a"]),
            task("c", 30, vec!["a"]),
        ];
        let waves = calculate_waves(&tasks);
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[1].estimated_duration, 30);
        assert_eq!(total_estimate(&waves), 35);
    }

    #[test]
    fn waves_break_cycle_by_forced_placement() {
        let tasks = vec![
            task("a", 1, vec!["b"]),
            task("b", 1, vec!["a"]),
            task("c", 1, vec![]),
        ];
        let waves = calculate_waves(&tasks);
        // Every task ends up placed despite the a<->b cycle.
        let placed: usize = waves.iter().map(|w| w.tasks.len()).sum();
        assert_eq!(placed, 3);
    }

    #[test]
    fn waves_sequence_numbers_are_contiguous() {
        let tasks = vec![task("a", 1, vec![]), task("b", 1, vec!["a"])];
        let waves = calculate_waves(&tasks);
        assert_eq!(waves[0].sequence_number, 0);
        assert_eq!(waves[1].sequence_number, 1);
    }

    #[test]
    fn all_dependencies_is_transitive() {
        let tasks = vec![
            task("a", 1, vec![]),
            task("b", 1, vec!["a"]),
            task("c", 1, vec!["b", "external"]),
        ];
        let deps = get_all_dependencies("c", &tasks);
        assert_eq!(
            deps,
            HashSet::from(["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn all_dependencies_of_unknown_task_is_empty() {
        let tasks = vec![task("a", 1, vec![])];
        assert!(get_all_dependencies("zz", &tasks).is_empty());
    }

    #[test]
    fn dependents_are_direct_only() {
        let tasks = vec![
            task("a", 1, vec![]),
            task("b", 1, vec!["a"]),
            task("c", 1, vec!["b"]),
        ];
        let dependents = get_dependents("a", &tasks);
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].id, "b");
    }

    #[test]
    fn critical_path_prefers_longer_summed_chain() {
        let tasks = vec![
            task("a", 10, vec![]),
            task("b", 10, vec!["a"]),
            task("c", 10, vec!["b"]),
            task("d", 20, vec![]),
        ];
        let path = get_critical_path(&tasks);
        let ids: Vec<_> = path.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn critical_path_single_task() {
        let tasks = vec![task("only", 7, vec![])];
        let path = get_critical_path(&tasks);
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].id, "only");
    }

    #[test]
    fn critical_path_empty_input() {
        assert!(get_critical_path(&[]).is_empty());
    }

    #[test]
    fn next_available_respects_completed_set() {
        let tasks = vec![
            task("a", 1, vec![]),
            task("b", 1, vec!["a"]),
            task("c", 1, vec!["b"]),
        ];

        let none_done = get_next_available(&tasks, &HashSet::new());
        assert_eq!(none_done.len(), 1);
        assert_eq!(none_done[0].id, "a");

        let a_done = get_next_available(&tasks, &HashSet::from(["a".to_string()]));
        assert_eq!(a_done.len(), 1);
        assert_eq!(a_done[0].id, "b");
    }

    #[test]
    fn next_available_treats_external_as_satisfied() {
        let tasks = vec![task("a", 1, vec!["upstream"])];
        let available = get_next_available(&tasks, &HashSet::new());
        assert_eq!(available.len(), 1);
    }

    #[test]
    fn validate_reports_self_dependency_and_cycles() {
        let tasks = vec![
            task("a", 1, vec!["a"]),
            task("b", 1, vec!["c"]),
            task("c", 1, vec!["b"]),
        ];
        let report = validate(&tasks);
        assert!(!report.valid);
        assert!(report.issues.iter().any(|i| i.contains("depends on itself")));
        assert!(report.issues.iter().any(|i| i.contains("Circular dependency")));
    }

    #[test]
    fn validate_ignores_external_dependencies() {
        let tasks = vec![task("a", 1, vec!["elsewhere"])];
        let report = validate(&tasks);
        assert!(report.valid);
        assert!(report.issues.is_empty());
    }
}
