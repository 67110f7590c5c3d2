use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kiln_lib::graph::{ExecutorConfig, Task, TaskAction, TaskError, TaskGraph, TaskId, TaskState};

/// Small deterministic generator so the random graphs are reproducible.
struct Lcg(u64);

impl Lcg {
  fn next(&mut self) -> u64 {
    self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    self.0 >> 33
  }
}

fn recording_task(name: String, log: Arc<Mutex<Vec<String>>>) -> Task {
  let key = name.clone();
  Task::new(
    name,
    ".",
    TaskAction::callback(key.clone(), move |_| {
      log.lock().unwrap().push(key.clone());
      Ok(())
    }),
  )
}

#[test]
fn random_graphs_run_in_dependency_order() {
  for seed in 1..=20 {
    let mut rng = Lcg(seed);
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut graph = TaskGraph::new("/ws");
    let count = 5 + (rng.next() % 20) as usize;
    let ids: Vec<TaskId> = (0..count)
      .map(|i| graph.add(recording_task(format!("t{i}"), log.clone())))
      .collect();

    // Edges only point to lower indices, so the graph is acyclic.
    let mut edges = Vec::new();
    for i in 1..count {
      for j in 0..i {
        if rng.next() % 4 == 0 {
          graph.add_dependency(ids[i], ids[j]);
          edges.push((i, j));
        }
      }
    }
    graph.setup().unwrap();
    graph.sort_tasks();

    let result = graph.execute(&ExecutorConfig { max_concurrency: 4 });
    assert!(result.is_success());
    assert_eq!(result.executed, count);

    let log = log.lock().unwrap();
    let position = |i: usize| log.iter().position(|n| *n == format!("t{i}")).unwrap();
    for (dependent, dependency) in edges {
      assert!(
        position(dependency) < position(dependent),
        "seed {seed}: t{dependency} must finish before t{dependent}"
      );
    }
  }
}

#[test]
fn failure_never_runs_transitive_dependents() {
  let ran = Arc::new(Mutex::new(Vec::new()));
  let mut graph = TaskGraph::new("/ws");
  let failing = graph.add(Task::new(
    "broken.cpp",
    ".",
    TaskAction::callback("broken", |_| Err(TaskError::Action("syntax error".into()))),
  ));
  let link = graph.add(recording_task("link".into(), ran.clone()));
  let package = graph.add(recording_task("package".into(), ran.clone()));
  let sibling = graph.add(recording_task("other.cpp".into(), ran.clone()));
  graph.add_dependency(link, failing);
  graph.add_dependency(package, link);
  graph.setup().unwrap();

  let result = graph.execute(&ExecutorConfig { max_concurrency: 2 });

  assert_eq!(*ran.lock().unwrap(), vec!["other.cpp"]);
  assert_eq!(result.executed, 2);
  assert_eq!(result.failed_count(), 3);
  assert_eq!(result.failed_commands().count(), 1);
  assert_eq!(graph.task(package).state, TaskState::Failed);
  assert_eq!(graph.task(sibling).state, TaskState::Succeeded);
}

#[test]
fn concurrency_never_exceeds_the_limit() {
  let running = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));
  let mut graph = TaskGraph::new("/ws");
  for i in 0..8 {
    let (running, peak) = (running.clone(), peak.clone());
    graph.add(Task::new(
      format!("t{i}"),
      ".",
      TaskAction::callback(format!("t{i}"), move |_| {
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
      }),
    ));
  }
  graph.setup().unwrap();

  let result = graph.execute(&ExecutorConfig { max_concurrency: 3 });

  assert!(result.is_success());
  assert_eq!(result.executed, 8);
  assert!(result.workers <= 3);
  assert!(peak.load(Ordering::SeqCst) <= 3);
}

#[test]
fn produced_files_become_edges() {
  let noop = |name: &str| Task::new(name, ".", TaskAction::callback(name, |_| Ok(())));
  let object = PathBuf::from("/ws/obj/a.o");
  let library = PathBuf::from("/ws/bin/libA.so");

  let mut graph = TaskGraph::new("/ws");
  let app = graph.add(
    noop("app")
      .with_prerequisites([library.clone()])
      .with_outputs([PathBuf::from("/ws/bin/app")]),
  );
  let lib = graph.add(noop("libA.so").with_prerequisites([object.clone()]).with_outputs([library]));
  let compile = graph.add(noop("a.cpp").with_outputs([object]));
  graph.setup().unwrap();
  graph.sort_tasks();

  assert_eq!(graph.task(app).dependencies, vec![lib]);
  assert_eq!(graph.task(lib).dependencies, vec![compile]);
  assert!(graph.task(compile).dependencies.is_empty());
  assert_eq!(graph.order()[0], lib);
}
