//! Runs the task graph.
//!
//! The scheduler walks the selected part of the [`TaskGraph`](crate::graph::TaskGraph)
//! and starts every task whose prerequisites all succeeded. A task that fails
//! takes its dependents down with it, which are then marked as skipped, while
//! unrelated chains keep going.

mod reload;
mod runner;

use std::fmt::{Display, Formatter};
use std::time::Duration;

use console::style;

pub use crate::engine::reload::{Reload, ReloadEvent};
#[cfg(feature = "live")]
pub(crate) use crate::engine::reload::serve;
pub(crate) use crate::engine::runner::run_tasks_parallel;
#[cfg(feature = "live")]
pub(crate) use crate::engine::runner::{WatchGroup, watch};

/// Lifecycle of a single task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// A prerequisite failed or was skipped itself.
    Skipped,
}

impl TaskState {
    pub fn is_final(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Legal moves: pending to running or skipped, running to a verdict.
    pub fn can_become(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Skipped)
                | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub name: &'static str,
    pub state: TaskState,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Final state of every task selected for a run, in graph declaration order.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub outcomes: Vec<Outcome>,
}

impl Report {
    /// A run succeeds only when every selected task did.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.state == TaskState::Succeeded)
    }

    pub fn get(&self, name: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.get(name).map(|o| o.state)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.state == TaskState::Failed)
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for outcome in &self.outcomes {
            match outcome.state {
                TaskState::Succeeded => writeln!(
                    f,
                    "{} {} {}",
                    style("✓").green(),
                    outcome.name,
                    style(format!("({}ms)", outcome.duration.as_millis())).blue()
                )?,
                TaskState::Failed => writeln!(
                    f,
                    "{} {}: {}",
                    style("✗").red(),
                    outcome.name,
                    outcome.error.as_deref().unwrap_or("failed")
                )?,
                TaskState::Skipped => {
                    writeln!(f, "{} {} skipped", style("-").yellow(), outcome.name)?
                }
                TaskState::Pending | TaskState::Running => {
                    writeln!(f, "{} {} did not finish", style("?").dim(), outcome.name)?
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &'static str, state: TaskState) -> Outcome {
        Outcome {
            name,
            state,
            duration: Duration::ZERO,
            error: None,
        }
    }

    #[test]
    fn test_report_verdict() {
        let ok = Report {
            outcomes: vec![outcome("a", TaskState::Succeeded)],
        };
        assert!(ok.is_success());

        let skipped = Report {
            outcomes: vec![outcome("a", TaskState::Succeeded), outcome("b", TaskState::Skipped)],
        };
        assert!(!skipped.is_success());
        assert_eq!(skipped.state("b"), Some(TaskState::Skipped));
        assert_eq!(skipped.failed().count(), 0);
    }

    #[test]
    fn test_skipped_tasks_never_run() {
        use TaskState::*;

        assert!(Pending.can_become(Skipped));
        assert!(Pending.can_become(Running));
        assert!(Running.can_become(Failed));
        assert!(!Running.can_become(Skipped));
        assert!(!Pending.can_become(Succeeded));
        assert!(!Skipped.can_become(Running));
    }
}
