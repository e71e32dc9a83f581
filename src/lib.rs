//! Orchestration core for running many coding agents in parallel against
//! one repository.
//!
//! Four subsystems cooperate:
//!
//! - [`graph`]: dependency resolution. Orders tasks topologically,
//!   partitions them into parallel waves, and finds the critical path.
//! - [`worktree`]: execution isolation. Gives each task its own git
//!   worktree and branch, tracked in a lock-guarded registry.
//! - [`checkpoint`]: recovery. Durable snapshots of orchestration state
//!   with best-effort git commit references, created on a timer and on
//!   orchestration events.
//! - [`review`]: the human gate. Parks escalated tasks behind durable
//!   approve/reject requests.
//!
//! They communicate through the [`events`] bus and share the durable
//! stores in [`store`]. [`git`] hides the source-control backend behind
//! a trait so tests can substitute a fake.

pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod events;
pub mod git;
pub mod graph;
pub mod review;
pub mod store;
pub mod telemetry;
pub mod worktree;
