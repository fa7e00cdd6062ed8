use std::path::{Component, Path, PathBuf};

use swc_core::ecma::ast::{ImportDecl, ImportNamedSpecifier, ImportSpecifier, ModuleExportName};
use tracing::debug;

use crate::types::TransformState;

/// Lexically resolve `.` and `..` segments so relative specifiers compare
/// equal to the configured origin they point at.
fn normalized_join(base: &Path, segment: &str) -> PathBuf {
  let mut normalized = PathBuf::new();

  for component in base.join(segment).components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        normalized.pop();
      }
      other => normalized.push(other.as_os_str()),
    }
  }

  normalized
}

/// Cheap pre-check before resolving a relative specifier: the configured
/// origin must end with the specifier's basename for a full path comparison
/// to be worth doing.
fn basename_could_match(specifier: &str, origin: &str) -> bool {
  Path::new(specifier)
    .file_name()
    .and_then(|name| name.to_str())
    .map(|name| origin.ends_with(name))
    .unwrap_or(false)
}

/// A module specifier is recognized iff it equals the default origin, equals
/// a configured origin exactly, or - when relative - resolves against the
/// importing file's directory to a configured origin.
pub fn is_recognized_module(specifier: &str, state: &TransformState) -> bool {
  if state.import_sources.iter().any(|origin| origin == specifier) {
    return true;
  }

  if !specifier.starts_with('.') {
    return false;
  }

  let Some(filename) = &state.filename else {
    return false;
  };

  let base_dir = Path::new(filename).parent().unwrap_or_else(|| Path::new(""));
  let resolved = normalized_join(base_dir, specifier);

  state
    .import_sources
    .iter()
    .filter(|origin| basename_could_match(specifier, origin))
    .any(|origin| normalized_join(Path::new(""), origin) == resolved)
}

fn imported_name(specifier: &ImportNamedSpecifier) -> &str {
  match &specifier.imported {
    Some(ModuleExportName::Ident(ident)) => ident.sym.as_ref(),
    Some(ModuleExportName::Str(value)) => value.value.as_ref(),
    None => specifier.local.sym.as_ref(),
  }
}

/// Record and strip compiled API specifiers from an import declaration.
///
/// Unrecognized module specifiers are left untouched. For recognized ones,
/// the (possibly empty) import record is created, each matched specifier is
/// recorded under its local alias and removed, and the return value reports
/// whether the declaration still has specifiers and should be kept.
pub fn process_import_decl(import: &mut ImportDecl, state: &mut TransformState) -> bool {
  let module_name = import.src.value.to_string();

  if !is_recognized_module(&module_name, state) {
    return true;
  }

  debug!(module = %module_name, "recognized compiled import origin");

  let compiled_imports = state.ensure_compiled_imports();
  let mut remaining = Vec::with_capacity(import.specifiers.len());

  for specifier in import.specifiers.drain(..) {
    match specifier {
      ImportSpecifier::Named(named) => {
        let imported = imported_name(&named).to_string();
        let local = named.local.sym.to_string();

        if compiled_imports.record(&imported, &local) {
          continue;
        }

        remaining.push(ImportSpecifier::Named(named));
      }
      other => remaining.push(other),
    }
  }

  import.specifiers = remaining;

  !import.specifiers.is_empty()
}
