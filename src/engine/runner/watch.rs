//! Watch mode.
//!
//! 1. **File watcher**: `notify` monitors the static roots of every watch
//!    glob recursively. Bursts of events within the debounce period collapse
//!    into one batch.
//! 2. **Groups**: each watch glob list is tied to the tasks it re-runs. A
//!    changed path that matches a group (and none of its `!` exclusions)
//!    schedules the prerequisite closure of those tasks.
//! 3. **Reload**: writers publish changed outputs on the reload channel on
//!    their own. Groups that ask for it additionally publish a full reload
//!    once their tasks succeed.

use std::collections::HashSet;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use notify::RecursiveMode;
use notify_debouncer_full::new_debouncer;

use crate::Context;
use crate::engine::{ReloadEvent, run_tasks_parallel};
use crate::error::WatchError;
use crate::graph::TaskGraph;
use crate::sources::SourceSet;

/// Paths to watch and the tasks a change to them re-runs.
#[derive(Debug)]
pub(crate) struct WatchGroup {
    pub patterns: Vec<String>,
    pub targets: &'static [&'static str],
    /// Publish a full-page reload after the tasks succeed.
    pub full_reload: bool,
}

pub(crate) fn watch(
    graph: &TaskGraph,
    ctx: &Context,
    groups: &[WatchGroup],
    debounce: Duration,
) -> Result<(), WatchError> {
    let root = &ctx.root;

    let mut sets = Vec::with_capacity(groups.len());
    let mut watched = HashSet::new();

    for group in groups {
        let set = match SourceSet::new(&group.patterns) {
            Ok(set) => set,
            Err(e) => {
                tracing::error!("invalid watch pattern: {e}");
                continue;
            }
        };

        for pattern in group.patterns.iter().filter(|p| !p.starts_with('!')) {
            match resolve_watch_path(root, pattern) {
                Ok(path) => {
                    watched.insert(path);
                }
                Err(e) => tracing::error!("failed to resolve path {pattern}: {e}"),
            }
        }

        sets.push((group, set));
    }

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(debounce, None, tx)?;

    // Collapse watched paths to reduce the number of watches
    for path in collapse_watch_paths(watched) {
        tracing::info!("watching {}", path);
        debouncer.watch(&path, RecursiveMode::Recursive)?;
    }

    tracing::info!("waiting for changes...");

    loop {
        match rx.recv()? {
            Ok(events) => {
                let changed = events
                    .iter()
                    .filter(|de| !de.event.kind.is_access())
                    .flat_map(|de| de.event.paths.iter())
                    .filter_map(|path| Utf8Path::from_path(path));
                let (targets, full_reload) = affected(root, &sets, changed);

                if targets.is_empty() {
                    continue;
                }

                tracing::info!("change detected, re-running {}", targets.join(", "));

                let nodes = match graph.closure(&targets) {
                    Ok(nodes) => nodes,
                    Err(e) => {
                        tracing::error!("{e}");
                        continue;
                    }
                };

                let report = run_tasks_parallel(graph, ctx, &nodes);
                if report.is_success() {
                    if full_reload {
                        ctx.reload.publish(ReloadEvent::full());
                    }
                    tracing::info!("rebuild complete, watching for changes...");
                } else {
                    eprint!("{report}");
                }
            }
            Err(errors) => {
                for e in errors {
                    tracing::error!("watch error: {e:?}");
                }
            }
        }
    }
}

/// Collects the tasks one batch of changed paths re-runs, sorted and without
/// duplicates, and whether any matching group wants a full reload. Paths
/// outside `root` are ignored.
fn affected<'a>(
    root: &Utf8Path,
    sets: &[(&WatchGroup, SourceSet)],
    changed: impl IntoIterator<Item = &'a Utf8Path>,
) -> (Vec<&'static str>, bool) {
    let mut targets = Vec::new();
    let mut full_reload = false;

    for path in changed {
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };

        for (group, set) in sets {
            if set.matches(relative) {
                tracing::debug!("{relative} changed");
                targets.extend(group.targets.iter().copied());
                full_reload |= group.full_reload;
            }
        }
    }

    targets.sort_unstable();
    targets.dedup();
    (targets, full_reload)
}

/// Finds the directory to watch for a glob below `root`: the canonicalized
/// static part of the pattern. A concrete file is watched through its parent
/// so that atomic replacements are caught.
fn resolve_watch_path(root: &Utf8Path, glob: &str) -> std::io::Result<Utf8PathBuf> {
    let path = crate::io::normalize_path(Utf8Path::new(glob));

    let static_part: Utf8PathBuf = path
        .components()
        .take_while(|c| !c.as_str().contains(['*', '?', '[']))
        .collect();

    let absolute = root.join(static_part).canonicalize_utf8()?;

    if absolute.is_file() {
        Ok(absolute.parent().unwrap_or(&absolute).to_path_buf())
    } else {
        Ok(absolute)
    }
}

/// Drops every path that lies below another one. Watches are recursive.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}
