//! Symbol-visibility defines for binary-module groups.
//!
//! Every group `Core` is announced to the preprocessor as `CORE_API=<macro>`, where
//! the macro exports symbols when the compiled code ends up in the same binary and
//! imports them otherwise.

use crate::binary::BinaryModule;
use crate::options::append_unique;
use crate::rules::TargetLinkType;

use super::ResolvedModules;

/// Preprocessor define announcing `group`'s API macro.
pub fn api_define(group: &str, value: &str) -> String {
  format!("{}_API={}", group.to_uppercase(), value)
}

/// Inject `<GROUP>_API` defines into every resolved module.
///
/// Modular: a module exports its own group and imports every other group it
/// depends on. Monolithic: everything shares one binary, so every group is
/// exported everywhere. Groups of a referenced target's build are imported when
/// modular and exported when monolithic.
pub fn apply_api_defines(
  link_type: TargetLinkType,
  groups: &[BinaryModule],
  resolved: &mut ResolvedModules,
  dll_export: &str,
  dll_import: &str,
  referenced_groups: &[String],
) {
  let modules: Vec<_> = resolved.order().to_vec();
  for module in modules {
    let mut defines = Vec::new();
    match link_type {
      TargetLinkType::Modular => {
        let own = module.binary_module();
        if let Some(own) = own {
          defines.push(api_define(own, dll_export));
        }
        for dep in resolved.dependencies_of(&module.name) {
          let Some(dep_group) = resolved.module(&dep).and_then(|m| m.binary_module()) else {
            continue;
          };
          if Some(dep_group) != own {
            append_unique(&mut defines, [api_define(dep_group, dll_import)]);
          }
        }
        for group in referenced_groups {
          append_unique(&mut defines, [api_define(group, dll_import)]);
        }
      }
      TargetLinkType::Monolithic => {
        for group in groups {
          append_unique(&mut defines, [api_define(&group.name, dll_export)]);
        }
        for group in referenced_groups {
          append_unique(&mut defines, [api_define(group, dll_export)]);
        }
      }
    }

    if let Some(options) = resolved.get_mut(&module.name) {
      append_unique(&mut options.compile_env.preprocessor_definitions, defines);
    }
  }
}
