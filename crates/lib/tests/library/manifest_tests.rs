use kiln_lib::build::{BuildSummary, Builder};
use kiln_lib::config::BuildConfig;
use kiln_lib::rules::manifest::RulesManifest;

use crate::common::{EXPORT, IMPORT, RecordingToolchain, Workspace, linux_tuple};

const MANIFEST: &str = r#"
[build]
platforms = ["linux"]
architectures = ["x64"]
configurations = ["debug"]
max_concurrency = 2

[[project]]
name = "Engine"

[[target]]
name = "Editor"
kind = "engine"
project = "Engine"
output_type = "executable"
modules = ["Editor"]

[[module]]
name = "Core"
binary = "Core"
folder = "Source/Core"
public_include_paths = ["Public"]
public_definitions = ["CORE_STATS=1"]

[[module]]
name = "Editor"
binary = "Editor"
folder = "Source/Editor"
private_dependencies = ["Core"]
private_definitions = ["WITH_EDITOR=1"]
"#;

fn manifest_workspace() -> Workspace {
  let ws = Workspace::new();
  ws.write("Kiln.toml", MANIFEST);
  ws.write("Source/Core/Public/Core.h", "#pragma once\n");
  ws.write("Source/Core/Core.cpp", "#include \"Public/Core.h\"\n");
  ws.write("Source/Editor/Main.cpp", "#include \"Core/Public/Core.h\"\nint main() {}\n");
  ws
}

fn build(ws: &Workspace, toolchain: &RecordingToolchain) -> BuildSummary {
  let manifest = RulesManifest::load(&ws.path("Kiln.toml")).unwrap();
  let registry = manifest.to_registry(ws.root()).unwrap();
  let mut config = BuildConfig::new(ws.root());
  config.apply_settings(&manifest.build);
  Builder::new(&registry, toolchain, config).build()
}

#[test]
fn manifest_rules_build_end_to_end() {
  let ws = manifest_workspace();
  let toolchain = RecordingToolchain::default();
  let summary = build(&ws, &toolchain);
  assert!(summary.is_success(), "{:?}", summary.reports);

  let out = ws.config().target_output_folder("Editor", &linux_tuple());
  let links = toolchain.links();
  assert_eq!(links.len(), 2);
  let editor = links.iter().find(|l| l.output == out.join("Editor")).unwrap();
  assert!(editor.inputs.contains(&out.join("libCore.so")));

  let main = toolchain.compile_of("Main.cpp");
  let core_public = ws.path("Source/Core/Public").to_string_lossy().into_owned();
  assert!(main.include_paths.contains(&core_public));
  assert!(main.defines.contains(&"CORE_STATS=1".to_string()));
  assert!(main.defines.contains(&"WITH_EDITOR=1".to_string()));
  assert!(main.defines.contains(&"_DEBUG".to_string()));
  assert!(main.defines.contains(&format!("EDITOR_API={EXPORT}")));
  assert!(main.defines.contains(&format!("CORE_API={IMPORT}")));

  let core = toolchain.compile_of("Core.cpp");
  assert!(!core.defines.contains(&"WITH_EDITOR=1".to_string()));
}

#[test]
fn engine_headers_are_prerequisites() {
  let ws = manifest_workspace();
  let toolchain = RecordingToolchain::default();
  assert!(build(&ws, &toolchain).is_success());

  ws.touch("Source/Core/Public/Core.h");
  toolchain.reset();
  let summary = build(&ws, &toolchain);

  assert!(summary.is_success());
  let mut executed = toolchain.executed();
  executed.sort();
  // Both sources include the header; both links see a new object.
  assert_eq!(executed, vec!["Core.cpp", "Editor", "Main.cpp", "libCore.so"]);
}
