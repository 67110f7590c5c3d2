//! Worker pool draining a task graph.
//!
//! A fixed number of OS threads share one scheduler guarded by a mutex. A worker
//! claims the first pending item whose predecessors all succeeded, runs it outside
//! the lock and reports back, waking the other workers through a condition variable.
//! Items with a failed predecessor are failed during the scan without ever being
//! claimed.

use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::process::Command;
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::SystemTime;

use tracing::{debug, error, info, warn};

use super::types::{CommandSpec, FailedTask, GraphResult, Task, TaskAction, TaskError, TaskId, TaskState};

/// Configuration for graph execution.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
  /// Maximum number of work items running at once.
  pub max_concurrency: usize,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      max_concurrency: std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4),
    }
  }
}

/// Number of workers to spawn for `pending` items.
///
/// Never more than the configured limit, the available cores or the number of
/// items, and at least one unless there is nothing to do.
pub fn worker_count(max_concurrency: usize, pending: usize) -> usize {
  let cores = std::thread::available_parallelism().map(|p| p.get()).unwrap_or(1);
  max_concurrency.min(cores).max(1).min(pending)
}

#[derive(Debug, Default, Clone)]
struct Record {
  started_at: Option<SystemTime>,
  finished_at: Option<SystemTime>,
  exit_code: Option<i32>,
  error: Option<String>,
}

enum Claim {
  Run(TaskId),
  Wait,
  Done,
}

struct Scheduler {
  pending: Vec<TaskId>,
  states: Vec<TaskState>,
  records: Vec<Record>,
  running: usize,
  executed: usize,
  failed: Vec<FailedTask>,
}

impl Scheduler {
  fn claim(&mut self, tasks: &[Task]) -> Claim {
    loop {
      let mut progressed = false;
      let mut index = 0;
      while index < self.pending.len() {
        let task = &tasks[self.pending[index].0];

        if let Some(&failed) = task.dependencies.iter().find(|d| self.states[d.0] == TaskState::Failed) {
          self.pending.remove(index);
          let reason = TaskError::DependencyFailed(tasks[failed.0].info_message.clone()).to_string();
          warn!(task = %task.info_message, failed_dep = %tasks[failed.0].info_message, "skipping work item due to failed dependency");
          self.fail(task, reason, None, false);
          progressed = true;
          continue;
        }

        if task.dependencies.iter().all(|d| self.states[d.0].is_satisfied()) {
          self.pending.remove(index);
          self.states[task.id.0] = TaskState::Running;
          self.running += 1;
          return Claim::Run(task.id);
        }

        index += 1;
      }
      if !progressed {
        break;
      }
    }

    if self.pending.is_empty() {
      return Claim::Done;
    }
    if self.running == 0 {
      // Remaining items wait on predecessors that can never finish.
      for id in std::mem::take(&mut self.pending) {
        let task = &tasks[id.0];
        error!(task = %task.info_message, "work item has unreachable predecessors");
        self.fail(task, "unreachable predecessor".to_string(), None, false);
      }
      return Claim::Done;
    }
    Claim::Wait
  }

  fn finish(&mut self, task: &Task, result: Result<(), TaskError>, started_at: SystemTime, finished_at: SystemTime) {
    self.running -= 1;
    self.executed += 1;
    let record = &mut self.records[task.id.0];
    record.started_at = Some(started_at);
    record.finished_at = Some(finished_at);

    match result {
      Ok(()) => {
        self.states[task.id.0] = TaskState::Succeeded;
      }
      Err(err) => {
        let code = match &err {
          TaskError::CmdFailed { code, .. } => *code,
          _ => None,
        };
        error!(
          task = %task.info_message,
          command = %task.action.describe(),
          code = ?code,
          error = %err,
          "work item failed"
        );
        self.fail(task, err.to_string(), code, true);
      }
    }
  }

  fn fail(&mut self, task: &Task, reason: String, exit_code: Option<i32>, executed: bool) {
    self.states[task.id.0] = TaskState::Failed;
    let record = &mut self.records[task.id.0];
    record.exit_code = exit_code;
    record.error = Some(reason.clone());
    self.failed.push(FailedTask {
      id: task.id,
      info_message: task.info_message.clone(),
      command: task.action.describe(),
      exit_code,
      reason,
      executed,
    });
  }
}

/// Execute every pending item of `tasks`, dispatching in `order`.
///
/// Items already marked [`TaskState::UpToDate`] are not run and count as satisfied
/// predecessors. Task states, timestamps and failures are written back into
/// `tasks`.
pub fn execute(tasks: &mut [Task], order: &[TaskId], config: &ExecutorConfig) -> GraphResult {
  let pending: Vec<TaskId> = order
    .iter()
    .copied()
    .filter(|id| tasks[id.0].state == TaskState::Pending)
    .collect();
  let up_to_date = tasks.iter().filter(|t| t.state == TaskState::UpToDate).count();
  let workers = worker_count(config.max_concurrency, pending.len());
  debug!(pending = pending.len(), up_to_date, workers, "executing task graph");

  let scheduler = Scheduler {
    pending,
    states: tasks.iter().map(|t| t.state).collect(),
    records: vec![Record::default(); tasks.len()],
    running: 0,
    executed: 0,
    failed: Vec::new(),
  };
  let shared = (Mutex::new(scheduler), Condvar::new());

  {
    let tasks: &[Task] = tasks;
    let shared = &shared;
    thread::scope(|scope| {
      let mut spawned = 0;
      for index in 0..workers {
        let spawn = thread::Builder::new()
          .name(format!("kiln-worker-{}", index))
          .spawn_scoped(scope, move || work(tasks, shared));
        match spawn {
          Ok(_) => spawned += 1,
          Err(err) => warn!(error = %err, "failed to spawn worker thread"),
        }
      }
      if spawned == 0 && workers > 0 {
        work(tasks, shared);
      }
    });
  }

  let (lock, _) = shared;
  let scheduler = lock.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
  for (task, (state, record)) in tasks.iter_mut().zip(scheduler.states.into_iter().zip(scheduler.records)) {
    task.state = state;
    if record.started_at.is_some() {
      task.started_at = record.started_at;
      task.finished_at = record.finished_at;
    }
    task.exit_code = record.exit_code;
    task.error = record.error;
  }

  GraphResult {
    executed: scheduler.executed,
    up_to_date,
    failed: scheduler.failed,
    workers,
  }
}

fn work(tasks: &[Task], shared: &(Mutex<Scheduler>, Condvar)) {
  let (lock, ready) = shared;
  loop {
    let id = {
      let Ok(mut scheduler) = lock.lock() else {
        return;
      };
      loop {
        match scheduler.claim(tasks) {
          Claim::Run(id) => break id,
          Claim::Done => {
            ready.notify_all();
            return;
          }
          Claim::Wait => match ready.wait(scheduler) {
            Ok(guard) => scheduler = guard,
            Err(_) => return,
          },
        }
      }
    };

    let task = &tasks[id.0];
    let started_at = SystemTime::now();
    let result = catch_unwind(AssertUnwindSafe(|| run_task(task)))
      .unwrap_or_else(|_| Err(TaskError::Action("work item panicked".to_string())));
    let finished_at = SystemTime::now();

    if let Ok(mut scheduler) = lock.lock() {
      scheduler.finish(task, result, started_at, finished_at);
    }
    ready.notify_all();
  }
}

fn run_task(task: &Task) -> Result<(), TaskError> {
  info!("{}", task.info_message);
  for output in &task.produced_files {
    if let Some(parent) = output.parent() {
      fs::create_dir_all(parent)?;
    }
  }
  match &task.action {
    TaskAction::Command(cmd) => run_command(cmd, &task.working_directory),
    TaskAction::Callback { run, .. } => run(task),
  }
}

fn run_command(cmd: &CommandSpec, working_directory: &Path) -> Result<(), TaskError> {
  debug!(cmd = %cmd.display(), cwd = %working_directory.display(), "running command");
  let output = Command::new(&cmd.program)
    .args(&cmd.args)
    .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    .current_dir(working_directory)
    .output()
    .map_err(|source| TaskError::Spawn {
      cmd: cmd.display(),
      source,
    })?;

  for line in String::from_utf8_lossy(&output.stdout).lines() {
    info!("{}", line);
  }
  for line in String::from_utf8_lossy(&output.stderr).lines() {
    warn!("{}", line);
  }

  if !output.status.success() {
    return Err(TaskError::CmdFailed {
      cmd: cmd.display(),
      code: output.status.code(),
    });
  }
  Ok(())
}
