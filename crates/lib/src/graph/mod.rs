//! Task graph of build work items.
//!
//! Work items (compile one file, link one binary, generate code for one module) are
//! added in planning order. [`TaskGraph::setup`] then discovers predecessor edges
//! from file usage: an item reading a file another item produces depends on that
//! item. The graph is sorted by a priority heuristic, checked against the
//! work-item cache and finally drained by a pool of worker threads.

pub mod cache;
pub mod executor;
pub mod types;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

pub use cache::TaskCache;
pub use executor::{ExecutorConfig, worker_count};
pub use types::{CommandSpec, FailedTask, GraphResult, Task, TaskAction, TaskError, TaskId, TaskState};

/// All work items of one build invocation.
#[derive(Debug, Default)]
pub struct TaskGraph {
  root: PathBuf,
  tasks: Vec<Task>,
  /// Dispatch order.
  order: Vec<TaskId>,
}

impl TaskGraph {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      tasks: Vec::new(),
      order: Vec::new(),
    }
  }

  /// Workspace root the graph was created for.
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Add a work item, returning its id.
  pub fn add(&mut self, mut task: Task) -> TaskId {
    let id = TaskId(self.tasks.len());
    task.id = id;
    self.tasks.push(task);
    self.order.push(id);
    id
  }

  /// Declare an explicit predecessor edge.
  pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) {
    let deps = &mut self.tasks[task.0].dependencies;
    if task != depends_on && !deps.contains(&depends_on) {
      deps.push(depends_on);
    }
  }

  pub fn tasks(&self) -> &[Task] {
    &self.tasks
  }

  pub fn task(&self, id: TaskId) -> &Task {
    &self.tasks[id.0]
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  /// Current dispatch order.
  pub fn order(&self) -> &[TaskId] {
    &self.order
  }

  /// Link items through the files they produce and consume, then validate.
  ///
  /// # Errors
  ///
  /// Returns `DuplicateOutput` if two items produce the same file and
  /// `CycleDetected` if the resulting relation is not acyclic.
  pub fn setup(&mut self) -> Result<(), TaskError> {
    let mut producers: HashMap<&Path, TaskId> = HashMap::new();
    for task in &self.tasks {
      for file in &task.produced_files {
        if let Some(&first) = producers.get(file.as_path()) {
          return Err(TaskError::DuplicateOutput {
            path: file.clone(),
            first: self.tasks[first.0].info_message.clone(),
            second: task.info_message.clone(),
          });
        }
        producers.insert(file.as_path(), task.id);
      }
    }

    let mut edges = Vec::new();
    for task in &self.tasks {
      for file in &task.prerequisite_files {
        if let Some(&producer) = producers.get(file.as_path()) {
          edges.push((task.id, producer));
        }
      }
    }
    for (task, producer) in edges {
      self.add_dependency(task, producer);
    }

    self.topological_order()?;
    debug!(tasks = self.tasks.len(), "task graph ready");
    Ok(())
  }

  /// Dispatch items that unblock the most other items first.
  ///
  /// Ties keep the higher cost first, then insertion order. Only affects latency,
  /// never correctness.
  pub fn sort_tasks(&mut self) {
    let mut dependents = vec![0usize; self.tasks.len()];
    for task in &self.tasks {
      for dep in &task.dependencies {
        dependents[dep.0] += 1;
      }
    }
    let tasks = &self.tasks;
    self.order.sort_by(|a, b| {
      dependents[b.0]
        .cmp(&dependents[a.0])
        .then(tasks[b.0].cost.cmp(&tasks[a.0].cost))
        .then(a.cmp(b))
    });
  }

  /// Mark items whose outputs are current as [`TaskState::UpToDate`].
  ///
  /// An item is only up to date if every predecessor is too. Returns the number of
  /// items marked.
  pub fn load_cache(&mut self, cache: &TaskCache) -> Result<usize, TaskError> {
    let mut marked = 0;
    for id in self.topological_order()? {
      let task = &self.tasks[id.0];
      let up_to_date = task.state == TaskState::Pending
        && task
          .dependencies
          .iter()
          .all(|d| self.tasks[d.0].state == TaskState::UpToDate)
        && cache.is_up_to_date(task);
      if up_to_date {
        self.tasks[id.0].state = TaskState::UpToDate;
        marked += 1;
      }
    }
    debug!(up_to_date = marked, total = self.tasks.len(), "applied work-item cache");
    Ok(marked)
  }

  /// Run every pending item on a worker pool.
  pub fn execute(&mut self, config: &ExecutorConfig) -> GraphResult {
    executor::execute(&mut self.tasks, &self.order, config)
  }

  /// Fold the outcome of the last execution into `cache`.
  pub fn update_cache(&self, cache: &mut TaskCache) {
    cache.update(&self.tasks);
  }

  fn topological_order(&self) -> Result<Vec<TaskId>, TaskError> {
    let mut graph: DiGraph<TaskId, ()> = DiGraph::with_capacity(self.tasks.len(), 0);
    let nodes: Vec<NodeIndex> = self.tasks.iter().map(|t| graph.add_node(t.id)).collect();
    for task in &self.tasks {
      for dep in &task.dependencies {
        // Edge from dependency to dependent
        graph.add_edge(nodes[dep.0], nodes[task.id.0], ());
      }
    }
    toposort(&graph, None)
      .map(|sorted| sorted.into_iter().map(|n| graph[n]).collect())
      .map_err(|cycle| TaskError::CycleDetected(self.tasks[graph[cycle.node_id()].0].info_message.clone()))
  }
}
