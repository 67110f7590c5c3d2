//! Binary-module grouping.
//!
//! A binary module is the set of modules sharing one `binary_module_name`. Groups
//! name the symbol-visibility macros and, for modular targets, the link units.

use std::path::Path;
use std::sync::Arc;

use crate::options::LinkerOutput;
use crate::rules::{Module, Target, TargetLinkType, TargetOutputType};

/// Modules sharing one binary-module name.
#[derive(Debug, Clone)]
pub struct BinaryModule {
  pub name: String,
  pub modules: Vec<Arc<Module>>,
}

impl BinaryModule {
  pub fn contains(&self, module: &str) -> bool {
    self.modules.iter().any(|m| m.name == module)
  }
}

/// One link step of a target.
#[derive(Debug, Clone)]
pub struct LinkUnit {
  /// Base name of the produced binary.
  pub name: String,
  pub output: LinkerOutput,
  pub modules: Vec<Arc<Module>>,
}

/// Group modules by binary-module name, keeping first-seen order.
///
/// Names compare case-sensitively. Modules without a name belong to no group.
pub fn group_binary_modules(modules: &[Arc<Module>]) -> Vec<BinaryModule> {
  let mut groups: Vec<BinaryModule> = Vec::new();
  for module in modules {
    let Some(name) = module.binary_module() else {
      continue;
    };
    match groups.iter_mut().find(|g| g.name == name) {
      Some(group) => group.modules.push(module.clone()),
      None => groups.push(BinaryModule {
        name: name.to_string(),
        modules: vec![module.clone()],
      }),
    }
  }
  groups
}

/// Name of the group holding `module`, if any.
pub fn group_of<'a>(groups: &'a [BinaryModule], module: &str) -> Option<&'a BinaryModule> {
  groups.iter().find(|g| g.contains(module))
}

/// Split a target into link steps.
///
/// Monolithic targets link every resolved module into the target binary. Modular
/// targets link one shared library per group; when the target is an executable,
/// the group named like the target's output becomes the executable instead.
pub fn link_units(target: &Target, groups: &[BinaryModule], modules: &[Arc<Module>]) -> Vec<LinkUnit> {
  match target.link_type {
    TargetLinkType::Monolithic => vec![LinkUnit {
      name: target.output_name.clone(),
      output: target.output_type.linker_output(),
      modules: modules.to_vec(),
    }],
    TargetLinkType::Modular => groups
      .iter()
      .map(|group| {
        let output = if target.output_type == TargetOutputType::Executable && group.name == target.output_name {
          LinkerOutput::Executable
        } else {
          LinkerOutput::SharedLibrary
        };
        LinkUnit {
          name: group.name.clone(),
          output,
          modules: group.modules.clone(),
        }
      })
      .collect(),
  }
}

/// Groups restricted to modules living under `root`, for presentation.
///
/// Groups left empty are dropped. The build itself never applies this filter.
pub fn workspace_groups(groups: &[BinaryModule], root: &Path) -> Vec<BinaryModule> {
  groups
    .iter()
    .filter_map(|group| {
      let modules: Vec<_> = group.modules.iter().filter(|m| m.is_under(root)).cloned().collect();
      (!modules.is_empty()).then(|| BinaryModule {
        name: group.name.clone(),
        modules,
      })
    })
    .collect()
}
