use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_lib::build::{BuildStage, BuildTargetInfo, Builder};
use kiln_lib::options::LinkerOutput;
use kiln_lib::platform::{BuildTuple, TargetPlatform};
use kiln_lib::rules::{
  Module, ProjectInfo, RulesRegistry, Target, TargetHooks, TargetKind, TargetLinkType, TargetOutputType,
};
use tracing_test::traced_test;

use crate::common::{COMPILE_ERROR, EXPORT, IMPORT, RecordingToolchain, Workspace, linux_tuple};

/// Module `name` in `Source/<name>` with one source including one header.
fn module(ws: &Workspace, name: &str, group: &str) -> Module {
  module_in(ws, "Source", name, group)
}

fn module_in(ws: &Workspace, source_root: &str, name: &str, group: &str) -> Module {
  ws.write(
    &format!("{source_root}/{name}/{name}.cpp"),
    &format!("#include \"{name}.h\"\nint {name}Entry() {{ return 0; }}\n"),
  );
  ws.write(&format!("{source_root}/{name}/{name}.h"), "#pragma once\n");
  Module::new(name, ws.path(&format!("{source_root}/{name}"))).with_binary_module(group)
}

fn intermediate(ws: &Workspace, target: &str, module: &str) -> PathBuf {
  ws.config()
    .target_intermediate_folder(target, &linux_tuple())
    .join(module)
}

fn output(ws: &Workspace, target: &str) -> PathBuf {
  ws.config().target_output_folder(target, &linux_tuple())
}

fn sorted(mut items: Vec<String>) -> Vec<String> {
  items.sort();
  items
}

/// Core <- Render, both in the `Core` group of a modular `App`.
fn two_module_app(ws: &Workspace) -> RulesRegistry {
  let mut registry = RulesRegistry::new();
  registry.register_module(module(ws, "Core", "Core"));
  registry.register_module(module(ws, "Render", "Core").with_public_dependency("Core"));
  registry.register_target(Target::new("App", ws.root()).with_module("Render"));
  registry
}

#[test]
fn unchanged_workspace_rebuilds_nothing() {
  let ws = Workspace::new();
  let registry = two_module_app(&ws);
  let toolchain = RecordingToolchain::default();

  let first = Builder::new(&registry, &toolchain, ws.config()).build();
  assert!(first.is_success(), "{:?}", first.reports);
  assert_eq!(first.executed(), 3);
  assert_eq!(
    sorted(toolchain.executed()),
    vec!["Core.cpp", "Render.cpp", "libCore.so"]
  );

  toolchain.reset();
  let second = Builder::new(&registry, &toolchain, ws.config()).build();
  assert!(second.is_success());
  assert_eq!(second.executed(), 0);
  assert_eq!(second.up_to_date(), 3);
  assert!(toolchain.executed().is_empty());
}

#[test]
fn touched_header_reruns_its_compile_and_the_link() {
  let ws = Workspace::new();
  let registry = two_module_app(&ws);
  let toolchain = RecordingToolchain::default();
  assert!(Builder::new(&registry, &toolchain, ws.config()).build().is_success());

  ws.touch("Source/Core/Core.h");
  toolchain.reset();
  let summary = Builder::new(&registry, &toolchain, ws.config()).build();

  assert!(summary.is_success());
  assert_eq!(summary.executed(), 2);
  assert_eq!(summary.up_to_date(), 1);
  // The compile finishes before the link starts.
  assert_eq!(toolchain.executed(), vec!["Core.cpp", "libCore.so"]);
}

#[test]
fn rebuild_ignores_the_work_item_cache() {
  let ws = Workspace::new();
  let registry = two_module_app(&ws);
  let toolchain = RecordingToolchain::default();
  assert!(Builder::new(&registry, &toolchain, ws.config()).build().is_success());

  let stale = intermediate(&ws, "App", "Core").join("leftover.tmp");
  std::fs::write(&stale, "x").unwrap();

  let mut config = ws.config();
  config.rebuild = true;
  toolchain.reset();
  let summary = Builder::new(&registry, &toolchain, config).build();

  assert!(summary.is_success());
  assert_eq!(summary.executed(), 3);
  assert!(!stale.exists());
}

#[test]
fn include_paths_follow_dependency_visibility() {
  let ws = Workspace::new();
  let public_dir = |name: &str| {
    let dir = ws.path(&format!("Source/{name}/Public"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  };

  let mut registry = RulesRegistry::new();
  registry.register_module(module(&ws, "A", "Core").with_public_include_path(public_dir("A")));
  registry.register_module(
    module(&ws, "B", "Core")
      .with_public_include_path(public_dir("B"))
      .with_public_dependency("A"),
  );
  registry.register_module(
    module(&ws, "C", "Core")
      .with_public_include_path(public_dir("C"))
      .with_private_dependency("B"),
  );
  registry.register_module(module(&ws, "D", "Core").with_public_dependency("C"));
  registry.register_target(
    Target::new("App", ws.root())
      .with_link_type(TargetLinkType::Monolithic)
      .with_module("D"),
  );

  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, ws.config()).build();
  assert!(summary.is_success(), "{:?}", summary.reports);

  let include = |name: &str| public_dir(name).to_string_lossy().into_owned();
  let b = toolchain.compile_of("B.cpp");
  assert!(b.include_paths.contains(&include("A")));

  let c = toolchain.compile_of("C.cpp");
  assert!(c.include_paths.contains(&include("A")));
  assert!(c.include_paths.contains(&include("B")));

  let d = toolchain.compile_of("D.cpp");
  assert!(d.include_paths.contains(&include("C")));
  assert!(!d.include_paths.contains(&include("B")));
  assert!(!d.include_paths.contains(&include("A")));
}

/// M1, M2 in `Core`; M3 in `Gfx`; M1 depends on M3.
fn grouped_registry(ws: &Workspace, link_type: TargetLinkType) -> RulesRegistry {
  let mut registry = RulesRegistry::new();
  registry.register_module(module(ws, "M1", "Core").with_public_dependency("M3"));
  registry.register_module(module(ws, "M2", "Core"));
  registry.register_module(module(ws, "M3", "Gfx"));
  registry.register_target(
    Target::new("App", ws.root())
      .with_link_type(link_type)
      .with_module("M1")
      .with_module("M2"),
  );
  registry
}

#[test]
fn modular_target_links_one_library_per_group() {
  let ws = Workspace::new();
  let registry = grouped_registry(&ws, TargetLinkType::Modular);
  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, ws.config()).build();
  assert!(summary.is_success(), "{:?}", summary.reports);

  let links = toolchain.links();
  assert_eq!(links.len(), 2);
  let out = output(&ws, "App");
  let core = links.iter().find(|l| l.output == out.join("libCore.so")).unwrap();
  let gfx = links.iter().find(|l| l.output == out.join("libGfx.so")).unwrap();
  assert_eq!(core.kind, LinkerOutput::SharedLibrary);

  assert_eq!(gfx.inputs, vec![intermediate(&ws, "App", "M3").join("M3.o")]);
  assert!(core.inputs.contains(&intermediate(&ws, "App", "M1").join("M1.o")));
  assert!(core.inputs.contains(&intermediate(&ws, "App", "M2").join("M2.o")));
  assert!(core.inputs.contains(&out.join("libGfx.so")));
  assert!(!core.inputs.contains(&out.join("libCore.so")));

  let m1 = toolchain.compile_of("M1.cpp");
  assert!(m1.defines.contains(&format!("CORE_API={EXPORT}")));
  assert!(m1.defines.contains(&format!("GFX_API={IMPORT}")));
  let m2 = toolchain.compile_of("M2.cpp");
  assert!(m2.defines.contains(&format!("CORE_API={EXPORT}")));
  assert!(!m2.defines.iter().any(|d| d.starts_with("GFX_API=")));
  let m3 = toolchain.compile_of("M3.cpp");
  assert!(m3.defines.contains(&format!("GFX_API={EXPORT}")));
  assert!(!m3.defines.iter().any(|d| d.starts_with("CORE_API=")));
}

#[test]
fn monolithic_target_links_everything_once() {
  let ws = Workspace::new();
  let registry = grouped_registry(&ws, TargetLinkType::Monolithic);
  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, ws.config()).build();
  assert!(summary.is_success(), "{:?}", summary.reports);

  let links = toolchain.links();
  assert_eq!(links.len(), 1);
  let link = &links[0];
  assert_eq!(link.output, output(&ws, "App").join("App"));
  assert_eq!(link.kind, LinkerOutput::Executable);
  for module in ["M1", "M2", "M3"] {
    assert!(link.inputs.contains(&intermediate(&ws, "App", module).join(format!("{module}.o"))));
  }

  for source in ["M1.cpp", "M2.cpp", "M3.cpp"] {
    let compile = toolchain.compile_of(source);
    assert!(compile.defines.contains(&format!("CORE_API={EXPORT}")));
    assert!(compile.defines.contains(&format!("GFX_API={EXPORT}")));
    assert!(!compile.defines.iter().any(|d| d.ends_with(IMPORT)));
  }
}

#[test]
fn build_info_lists_binary_modules() {
  let ws = Workspace::new();
  let registry = grouped_registry(&ws, TargetLinkType::Modular);
  let toolchain = RecordingToolchain::default();
  assert!(Builder::new(&registry, &toolchain, ws.config()).build().is_success());

  let path = BuildTargetInfo::file_path(&output(&ws, "App"), "App");
  let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
  assert_eq!(json["Name"], "App");
  assert_eq!(json["Platform"], "Linux");
  assert_eq!(json["Configuration"], "Debug");
  let names: Vec<&str> = json["BinaryModules"]
    .as_array()
    .unwrap()
    .iter()
    .map(|b| b["Name"].as_str().unwrap())
    .collect();
  assert_eq!(sorted(names.iter().map(|n| n.to_string()).collect()), vec!["Core", "Gfx"]);
}

#[test]
fn failed_compile_skips_its_link_but_not_siblings() {
  let ws = Workspace::new();
  let mut registry = RulesRegistry::new();
  registry.register_module(module(&ws, "Core", "Core"));
  ws.write("Source/Core/Broken.cpp", &format!("{COMPILE_ERROR}\n"));
  registry.register_module(module(&ws, "Tools", "Tools"));
  registry.register_target(
    Target::new("App", ws.root())
      .with_module("Core")
      .with_module("Tools"),
  );

  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, ws.config()).build();

  assert!(!summary.is_success());
  let executed = toolchain.executed();
  assert!(executed.contains(&"Broken.cpp".to_string()));
  assert!(executed.contains(&"libTools.so".to_string()));
  assert!(!executed.contains(&"libCore.so".to_string()));

  let failed: Vec<_> = summary.failed_commands().collect();
  assert_eq!(failed.len(), 1);
  assert_eq!(failed[0].info_message, "Broken.cpp");
  assert_eq!(failed[0].exit_code, Some(1));
  assert_eq!(summary.failed_count(), 2);

  let report = &summary.reports[0];
  assert_eq!(report.stage, BuildStage::Failed);
  assert_eq!(report.failed_at, Some(BuildStage::Linking));
}

#[test]
fn failed_compile_runs_again_next_build() {
  let ws = Workspace::new();
  let mut registry = RulesRegistry::new();
  registry.register_module(module(&ws, "Core", "Core"));
  ws.write("Source/Core/Broken.cpp", &format!("{COMPILE_ERROR}\n"));
  registry.register_target(Target::new("App", ws.root()).with_module("Core"));

  let toolchain = RecordingToolchain::default();
  assert!(!Builder::new(&registry, &toolchain, ws.config()).build().is_success());

  ws.write("Source/Core/Broken.cpp", "int fixed() { return 1; }\n");
  toolchain.reset();
  let summary = Builder::new(&registry, &toolchain, ws.config()).build();

  assert!(summary.is_success());
  assert_eq!(sorted(toolchain.executed()), vec!["Broken.cpp", "libCore.so"]);
}

#[derive(Default)]
struct CountingHooks {
  pre: Arc<AtomicUsize>,
  post: Arc<AtomicUsize>,
}

impl TargetHooks for CountingHooks {
  fn pre_build(&self, _target: &Target, _tuple: &BuildTuple) {
    self.pre.fetch_add(1, Ordering::SeqCst);
  }

  fn post_build(&self, _target: &Target, _tuple: &BuildTuple) {
    self.post.fetch_add(1, Ordering::SeqCst);
  }
}

#[test]
#[traced_test]
fn target_without_modules_only_runs_hooks() {
  let ws = Workspace::new();
  let hooks = CountingHooks::default();
  let (pre, post) = (hooks.pre.clone(), hooks.post.clone());
  let mut registry = RulesRegistry::new();
  registry.register_target(Target::new("Empty", ws.root()).with_hooks(hooks));

  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, ws.config()).build();

  assert!(summary.is_success());
  assert!(summary.reports[0].skipped);
  assert_eq!(summary.executed(), 0);
  assert_eq!(pre.load(Ordering::SeqCst), 1);
  assert_eq!(post.load(Ordering::SeqCst), 1);
  assert!(!output(&ws, "Empty").exists());
  assert!(logs_contain("target has no modules to build"));
}

#[test]
fn missing_module_fails_only_its_target() {
  let ws = Workspace::new();
  let mut registry = RulesRegistry::new();
  registry.register_module(module(&ws, "Core", "Core").with_private_dependency("Nope"));
  registry.register_module(module(&ws, "Tools", "Tools"));
  registry.register_target(Target::new("Broken", ws.root()).with_module("Core"));
  registry.register_target(Target::new("Good", ws.root()).with_module("Tools"));

  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, ws.config()).build();

  assert!(!summary.is_success());
  let errors: Vec<_> = summary.errors().collect();
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].0, "Broken");
  assert!(errors[0].1.contains("Nope"));
  let broken = summary.reports.iter().find(|r| r.target == "Broken").unwrap();
  assert_eq!(broken.failed_at, Some(BuildStage::ResolvingModules));

  let good = summary.reports.iter().find(|r| r.target == "Good").unwrap();
  assert!(good.is_success());
  assert!(toolchain.executed().contains(&"libTools.so".to_string()));
}

#[test]
fn circular_modules_are_reported() {
  let ws = Workspace::new();
  let mut registry = RulesRegistry::new();
  registry.register_module(module(&ws, "A", "Core").with_public_dependency("B"));
  registry.register_module(module(&ws, "B", "Core").with_private_dependency("A"));
  registry.register_target(Target::new("App", ws.root()).with_module("A"));

  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, ws.config()).build();

  let errors: Vec<_> = summary.errors().collect();
  assert_eq!(errors.len(), 1);
  assert!(errors[0].1.contains("circular module dependency"));
  assert!(toolchain.executed().is_empty());
}

#[test]
fn same_named_sources_in_one_module_build_side_by_side() {
  let ws = Workspace::new();
  ws.write("Source/Platform/Linux/File.cpp", "int LinuxFile() { return 0; }\n");
  ws.write("Source/Platform/Windows/File.cpp", "int WindowsFile() { return 0; }\n");
  ws.write("Source/Platform/Foo.c", "int foo_c(void) { return 0; }\n");
  ws.write("Source/Platform/Foo.cpp", "int FooCpp() { return 0; }\n");
  let mut registry = RulesRegistry::new();
  registry.register_module(Module::new("Platform", ws.path("Source/Platform")).with_binary_module("Platform"));
  registry.register_target(Target::new("App", ws.root()).with_module("Platform"));

  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, ws.config()).build();
  assert!(summary.is_success(), "{:?}", summary.reports);
  assert_eq!(summary.executed(), 5);

  let mut objects: Vec<PathBuf> = toolchain
    .compiles
    .lock()
    .unwrap()
    .iter()
    .map(|c| c.object.clone())
    .collect();
  objects.sort();
  objects.dedup();
  assert_eq!(objects.len(), 4);
  let link = toolchain.links().into_iter().next().unwrap();
  assert!(objects.iter().all(|o| link.inputs.contains(o)));

  toolchain.reset();
  let second = Builder::new(&registry, &toolchain, ws.config()).build();
  assert_eq!(second.executed(), 0);
  assert_eq!(second.up_to_date(), 5);
}

#[test]
fn unsupported_tuple_is_a_configuration_error() {
  let ws = Workspace::new();
  let mut registry = RulesRegistry::new();
  registry.register_module(module(&ws, "Core", "Core"));
  let mut target = Target::new("WinOnly", ws.root()).with_module("Core");
  target.platforms = vec![TargetPlatform::Windows];
  registry.register_target(target);

  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, ws.config()).build();

  assert!(!summary.is_success());
  let errors: Vec<_> = summary.errors().collect();
  assert!(errors[0].1.contains("does not support Linux x64 Debug"));
  assert!(toolchain.compiles.lock().unwrap().is_empty());
}

#[test]
fn unknown_target_is_reported() {
  let ws = Workspace::new();
  let registry = two_module_app(&ws);
  let mut config = ws.config();
  config.targets = vec!["Ghost".to_string()];

  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, config).build();

  assert!(!summary.is_success());
  assert_eq!(summary.reports.len(), 1);
  assert!(summary.reports[0].tuple.is_none());
}

fn engine_and_games(ws: &Workspace) -> RulesRegistry {
  let mut registry = RulesRegistry::new();
  registry.register_module(module(ws, "EngineCore", "Engine"));
  registry.register_target(
    Target::new("Engine", ws.root())
      .with_kind(TargetKind::Engine {
        project: ProjectInfo::new("Engine", ws.root()),
      })
      .with_module("EngineCore"),
  );

  for game in ["Shooter", "Racer"] {
    let logic = format!("{game}Logic");
    registry.register_module(module_in(ws, &format!("{game}/Source"), &logic, game));
    let mut project = ProjectInfo::new(game, ws.path(game));
    project.references.push(ProjectInfo::new("Engine", ws.root()));
    registry.register_target(
      Target::new(game, ws.path(game))
        .with_kind(TargetKind::Game {
          project,
          engine_target: Some("Engine".to_string()),
        })
        .with_module(logic),
    );
  }
  registry
}

#[test]
fn referenced_engine_is_built_once_per_invocation() {
  let ws = Workspace::new();
  let registry = engine_and_games(&ws);
  let mut config = ws.config();
  config.targets = vec!["Shooter".to_string(), "Racer".to_string()];

  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, config).build();
  assert!(summary.is_success(), "{:?}", summary.reports);

  let engine_builds = summary.reports.iter().filter(|r| r.target == "Engine").count();
  assert_eq!(engine_builds, 1);
  let engine_links = toolchain
    .executed()
    .iter()
    .filter(|e| e.as_str() == "libEngine.so")
    .count();
  assert_eq!(engine_links, 1);

  let engine_library = output(&ws, "Engine").join("libEngine.so");
  let engine_link = toolchain
    .links()
    .into_iter()
    .find(|l| l.output == engine_library)
    .unwrap();
  assert_eq!(engine_link.kind, LinkerOutput::SharedLibrary);

  let shooter = toolchain
    .links()
    .into_iter()
    .find(|l| l.output == output(&ws, "Shooter").join("Shooter"))
    .unwrap();
  assert_eq!(shooter.kind, LinkerOutput::Executable);
  assert!(shooter.inputs.contains(&engine_library));

  let logic = toolchain.compile_of("ShooterLogic.cpp");
  assert!(logic.defines.contains(&format!("ENGINE_API={IMPORT}")));
  assert!(logic.defines.contains(&format!("SHOOTER_API={EXPORT}")));
}

#[test]
fn game_cannot_reference_an_executable_engine() {
  let ws = Workspace::new();
  let mut registry = engine_and_games(&ws);
  registry.register_target(
    Target::new("Engine", ws.root())
      .with_kind(TargetKind::Engine {
        project: ProjectInfo::new("Engine", ws.root()),
      })
      .with_output_type(TargetOutputType::Executable)
      .with_module("EngineCore"),
  );
  let mut config = ws.config();
  config.targets = vec!["Shooter".to_string()];

  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, config).build();

  assert!(!summary.is_success());
  let shooter = summary.reports.iter().find(|r| r.target == "Shooter").unwrap();
  assert!(shooter.error.as_deref().unwrap().contains("outputs an executable"));
  assert!(toolchain.executed().is_empty());
}

#[test]
fn failed_engine_fails_the_game() {
  let ws = Workspace::new();
  let registry = engine_and_games(&ws);
  ws.write("Source/EngineCore/Broken.cpp", &format!("{COMPILE_ERROR}\n"));
  let mut config = ws.config();
  config.targets = vec!["Shooter".to_string()];

  let toolchain = RecordingToolchain::default();
  let summary = Builder::new(&registry, &toolchain, config).build();

  assert!(!summary.is_success());
  let shooter = summary.reports.iter().find(|r| r.target == "Shooter").unwrap();
  assert!(shooter.error.as_deref().unwrap().contains("referenced target Engine failed"));
  assert!(!toolchain.executed().contains(&"ShooterLogic.cpp".to_string()));
}

#[test]
fn clean_removes_target_folders() {
  let ws = Workspace::new();
  let registry = two_module_app(&ws);
  let toolchain = RecordingToolchain::default();
  assert!(Builder::new(&registry, &toolchain, ws.config()).build().is_success());
  assert!(output(&ws, "App").exists());

  let removed = Builder::new(&registry, &toolchain, ws.config()).clean().unwrap();
  assert_eq!(removed.len(), 2);
  assert!(!output(&ws, "App").exists());
  assert!(!intermediate(&ws, "App", "Core").exists());
}
