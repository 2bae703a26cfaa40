#[cfg(feature = "live")]
mod watch;

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use indicatif::ProgressStyle;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use rayon::Scope;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::Context;
use crate::engine::{Outcome, Report, TaskState};
use crate::graph::TaskGraph;

#[cfg(feature = "live")]
pub(crate) use watch::{WatchGroup, watch};

/// How a dispatched node came back to the scheduler.
enum Done {
    Ran(anyhow::Result<()>, Duration),
    Skipped,
}

/// This function executes the selected part of the task graph on the rayon
/// pool. Tasks are started as soon as their dependencies are met.
///
/// 1. Every selected node gets a count of its selected prerequisites.
/// 2. Nodes whose count is zero are spawned on the pool.
/// 3. The calling thread waits on a result channel. When a node finishes, the
///    count of each dependent is decremented.
/// 4. A dependent whose count reaches zero is spawned, unless one of its
///    prerequisites did not succeed. Then it is reported as skipped right
///    away, which cascades down the chain.
/// 5. The loop ends when every selected node has reported back.
///
/// The waiting loop runs on the calling thread, never on a pool worker, so a
/// pool with a single thread still makes progress.
pub(crate) fn run_tasks_parallel(
    graph: &TaskGraph,
    ctx: &Context,
    nodes_to_run: &HashSet<NodeIndex>,
) -> Report {
    rayon::in_place_scope(|s| schedule(s, graph, ctx, nodes_to_run))
}

fn schedule<'scope>(
    s: &Scope<'scope>,
    graph: &'scope TaskGraph,
    ctx: &'scope Context,
    nodes_to_run: &HashSet<NodeIndex>,
) -> Report {
    let graph = graph.inner();

    let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for edge in graph.raw_edges() {
        dependents
            .entry(edge.source())
            .or_default()
            .push(edge.target());
    }

    // A dependency only counts if it's also in the set of nodes to run.
    let mut dependency_counts: HashMap<NodeIndex, usize> = nodes_to_run
        .iter()
        .map(|&i| {
            (
                i,
                graph
                    .neighbors_directed(i, Direction::Incoming)
                    .filter(|dep| nodes_to_run.contains(dep))
                    .count(),
            )
        })
        .collect();

    let mut states: HashMap<NodeIndex, TaskState> = nodes_to_run
        .iter()
        .map(|&i| (i, TaskState::Pending))
        .collect();
    let mut outcomes: HashMap<NodeIndex, Outcome> = HashMap::new();
    let mut blocked: HashSet<NodeIndex> = HashSet::new();

    let total_tasks = nodes_to_run.len() as u64;
    let mut completed_tasks = 0;

    if total_tasks == 0 {
        return Report::default();
    }

    let root_span = tracing::span!(Level::INFO, "running_tasks");
    root_span.pb_set_length(total_tasks);
    root_span.pb_set_style(
        &ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    root_span.pb_set_message("Running tasks...");
    let _enter = root_span.enter();

    let pb_style = ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]);

    {
        let (result_sender, result_receiver) = channel::<(NodeIndex, Done)>();

        // Returns whether the task was actually started.
        let spawn_task = |index: NodeIndex, blocked: &HashSet<NodeIndex>| -> bool {
            let sender = result_sender.clone();

            if blocked.contains(&index) {
                // A prerequisite did not succeed, nothing to run.
                let _ = sender.send((index, Done::Skipped));
                return false;
            }

            let task = graph[index].clone();
            let pb_style = pb_style.clone();

            s.spawn(move |_| {
                let span = tracing::span!(Level::INFO, "task", name = task.name);
                span.pb_set_style(&pb_style);
                span.pb_set_message(&format!("Running {}", task.name));
                let _enter = span.enter();

                let start_time = Instant::now();

                // The task only sees the shared read-only context, so a panic
                // cannot leave anything half-updated behind.
                let output = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    (task.run)(ctx)
                })) {
                    Ok(result) => result,
                    Err(panic) => {
                        let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                            format!("Task panicked: {s}")
                        } else if let Some(s) = panic.downcast_ref::<String>() {
                            format!("Task panicked: {s}")
                        } else {
                            String::from("Task panicked with unknown payload")
                        };

                        Err(anyhow::anyhow!(msg))
                    }
                };

                let _ = sender.send((index, Done::Ran(output, start_time.elapsed())));
            });

            true
        };

        for &node_index in nodes_to_run {
            if dependency_counts.get(&node_index).copied().unwrap_or(0) == 0
                && spawn_task(node_index, &blocked)
            {
                advance(&mut states, node_index, TaskState::Running);
            }
        }

        // The calling thread sits here while rayon workers execute tasks.
        while completed_tasks < total_tasks {
            let Ok((completed_index, done)) = result_receiver.recv() else {
                break;
            };

            let name = graph[completed_index].name;
            let outcome = match done {
                Done::Ran(Ok(()), duration) => Outcome {
                    name,
                    state: TaskState::Succeeded,
                    duration,
                    error: None,
                },
                Done::Ran(Err(e), duration) => {
                    tracing::error!("task '{name}' failed: {e:#}");
                    Outcome {
                        name,
                        state: TaskState::Failed,
                        duration,
                        error: Some(format!("{e:#}")),
                    }
                }
                Done::Skipped => {
                    tracing::warn!("task '{name}' skipped");
                    Outcome {
                        name,
                        state: TaskState::Skipped,
                        duration: Duration::ZERO,
                        error: None,
                    }
                }
            };

            let succeeded = outcome.state == TaskState::Succeeded;
            advance(&mut states, completed_index, outcome.state);
            outcomes.insert(completed_index, outcome);
            completed_tasks += 1;
            root_span.pb_inc(1);

            // Unlock dependents
            if let Some(dependents_of_completed) = dependents.get(&completed_index) {
                for &index in dependents_of_completed {
                    if !succeeded {
                        blocked.insert(index);
                    }
                    if let Some(count) = dependency_counts.get_mut(&index) {
                        *count -= 1;
                        if *count == 0 && spawn_task(index, &blocked) {
                            advance(&mut states, index, TaskState::Running);
                        }
                    }
                }
            }
        }
    }

    debug_assert!(states.values().all(|state| state.is_final()));

    let mut report: Vec<_> = outcomes.into_iter().collect();
    report.sort_by_key(|(index, _)| *index);

    Report {
        outcomes: report.into_iter().map(|(_, outcome)| outcome).collect(),
    }
}

fn advance(states: &mut HashMap<NodeIndex, TaskState>, index: NodeIndex, next: TaskState) {
    if let Some(state) = states.get_mut(&index) {
        debug_assert!(state.can_become(next), "{state:?} -> {next:?}");
        *state = next;
    }
}
