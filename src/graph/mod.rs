//! Dependency graph algorithms for wave-based parallel scheduling.
//!
//! Every function here is pure: it takes the full task list explicitly,
//! holds no state between calls, and performs no I/O. Results are
//! deterministic given the same input order.
//!
//! ## Cycle policy
//!
//! [`topological_sort`] treats a cycle as a hard failure
//! ([`GraphError::CycleDetected`]), while [`calculate_waves`] breaks a
//! deadlocked round by force-placing one remaining task and logging a
//! warning. Both behaviours are intentional; see the function docs.
//!
//! ## Example
//!
//! ```
//! use taskhelm::graph::{self, Task};
//!
//! let tasks = vec![
//!     Task::new("a", 10, vec![]),
//!     Task::new("b", 20, vec!["a"]),
//!     Task::new("c", 5, vec!["a"]),
//!     Task::new("d", 15, vec!["b", "c"]),
//! ];
//!
//! let waves = graph::calculate_waves(&tasks);
//! assert_eq!(waves.len(), 3);
//! // Wave 0: [a], Wave 1: [b, c] (runs in parallel), Wave 2: [d]
//! assert_eq!(waves[1].estimated_duration, 20); // max, not sum
//! ```

mod resolver;
mod task;

pub use resolver::{
    calculate_waves, detect_cycles, get_all_dependencies, get_critical_path, get_dependents,
    get_next_available, has_circular_dependency, topological_sort, total_estimate, validate,
};
pub use task::{Cycle, Task, ValidationReport, Wave};

pub use crate::errors::GraphError;
