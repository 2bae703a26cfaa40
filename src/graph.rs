//! The task graph.
//!
//! Tasks are organized into a Directed Acyclic Graph (DAG). Every edge points
//! from a prerequisite to the task that waits for it. The graph is checked
//! once when it is built: duplicate names, references to unknown tasks and
//! cycles are all rejected before anything runs.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::Context;
use crate::error::GraphError;

pub(crate) type TaskFn = Arc<dyn Fn(&Context) -> anyhow::Result<()> + Send + Sync>;

/// A named unit of work with zero or more prerequisites.
#[derive(Clone)]
pub struct TaskDef {
    pub name: &'static str,
    pub after: Vec<&'static str>,
    pub(crate) run: TaskFn,
}

impl TaskDef {
    pub fn new<F>(name: &'static str, after: &[&'static str], run: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name,
            after: after.to_vec(),
            run: Arc::new(run),
        }
    }
}

impl Debug for TaskDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDef")
            .field("name", &self.name)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<TaskDef, ()>,
    index: HashMap<&'static str, NodeIndex>,
}

impl TaskGraph {
    pub fn new(tasks: Vec<TaskDef>) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for task in tasks {
            let name = task.name;
            if index.contains_key(name) {
                return Err(GraphError::Duplicate(name.into()));
            }
            index.insert(name, graph.add_node(task));
        }

        let mut edges = Vec::new();
        for (&name, &node) in &index {
            for &dep in &graph[node].after {
                let Some(&from) = index.get(dep) else {
                    return Err(GraphError::Missing {
                        task: name.into(),
                        missing: dep.into(),
                    });
                };
                edges.push((from, node));
            }
        }

        for (from, to) in edges {
            graph.add_edge(from, to, ());
        }

        // We run toposort primarily to detect any cycles in the graph.
        petgraph::algo::toposort(&graph, None)
            .map_err(|cycle| GraphError::Cycle(graph[cycle.node_id()].name.into()))?;

        Ok(Self { graph, index })
    }

    pub fn get(&self, name: &str) -> Option<&TaskDef> {
        self.index.get(name).map(|&i| &self.graph[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.graph.node_weights().map(|task| task.name)
    }

    /// The targets together with everything they transitively wait for.
    pub fn closure(&self, targets: &[&str]) -> Result<HashSet<NodeIndex>, GraphError> {
        let mut selected = HashSet::new();
        let mut stack = Vec::new();

        for &target in targets {
            let &node = self
                .index
                .get(target)
                .ok_or_else(|| GraphError::Unknown(target.into()))?;
            stack.push(node);
        }

        while let Some(node) = stack.pop() {
            if selected.insert(node) {
                stack.extend(self.graph.neighbors_directed(node, Direction::Incoming));
            }
        }

        Ok(selected)
    }

    pub(crate) fn inner(&self) -> &DiGraph<TaskDef, ()> {
        &self.graph
    }
}
