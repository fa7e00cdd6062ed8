//! Orchestration core for a compiled CSS-in-JS source transformer.
//!
//! The crate owns the traversal, import bookkeeping, pragma handling and
//! finalization of a single file's transformation. All actual style
//! extraction is delegated through the [`ExtractionHandlers`] trait, so the
//! core can be reused by different extraction backends.

mod cache;
mod constants;
mod errors;
mod finalize;
mod handlers;
mod hash;
mod imports;
mod pragma;
mod transform;
mod types;

use std::cell::RefCell;
use std::panic;
use std::rc::Rc;

use swc_core::ecma::ast::Program;
use swc_core::ecma::visit::VisitMutWith;

pub use crate::cache::{Cache, CacheOptions};
pub use crate::constants::{COMPILED_API_NAMES, COMPILED_IMPORT, COMPILED_RUNTIME_MODULE};
pub use crate::errors::{init_panic_suppression, TransformError};
pub use crate::handlers::{ExtractionHandlers, NoopHandlers};
pub use crate::hash::hash;
pub use crate::transform::CompiledTransform;
pub use crate::types::{
  CacheBehavior, CompiledImports, IncludedFilesCallback, PluginOptions, ResolverOption,
  SharedTransformState, TransformFile, TransformFileOptions, TransformMetadata, TransformOutput,
  TransformState,
};

fn run_transform(
  mut program: Program,
  file: TransformFile,
  options: PluginOptions,
  handlers: &mut dyn ExtractionHandlers,
) -> Result<TransformOutput, Vec<TransformError>> {
  init_panic_suppression();

  let state: SharedTransformState = Rc::new(RefCell::new(TransformState::new(file, options)));

  let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
    let mut transform = CompiledTransform::new(state.clone(), handlers);
    program.visit_mut_with(&mut transform);
    program
  }));

  match result {
    Ok(program) => {
      let state = state.borrow();
      let metadata = TransformMetadata {
        included_files: state.included_files.clone(),
        style_rules: state.style_rules.iter().cloned().collect(),
        diagnostics: state.diagnostics.clone(),
      };

      Ok(TransformOutput { program, metadata })
    }
    Err(payload) => Err(vec![TransformError::from_panic(payload)]),
  }
}

/// Transform a program with the no-op handler set.
///
/// Failures inside the traversal are caught and reported as structured
/// diagnostics instead of aborting the process; the failing file is dropped
/// with whatever state it reached.
pub fn transform(
  program: Program,
  options: PluginOptions,
) -> Result<TransformOutput, Vec<TransformError>> {
  run_transform(program, TransformFile::default(), options, &mut NoopHandlers)
}

/// Transform a program with explicit file context (filename, roots, raw
/// source text for the xcss pre-scan, leading comments).
pub fn transform_with_file(
  program: Program,
  file: TransformFile,
  options: PluginOptions,
) -> Result<TransformOutput, Vec<TransformError>> {
  run_transform(program, file, options, &mut NoopHandlers)
}

/// Transform a program, routing classified style usages to the given
/// extraction handlers.
pub fn transform_with_handlers(
  program: Program,
  file: TransformFile,
  options: PluginOptions,
  handlers: &mut dyn ExtractionHandlers,
) -> Result<TransformOutput, Vec<TransformError>> {
  run_transform(program, file, options, handlers)
}

/// Cheap textual pre-check for whether a file can possibly need the
/// transform, intended to be run before parsing. A `true` result is not a
/// guarantee; the traversal still performs real recognition.
pub fn should_transform(code: &str, options: &PluginOptions) -> bool {
  if code.contains(COMPILED_IMPORT) {
    return true;
  }

  options
    .import_sources
    .iter()
    .any(|source| code.contains(source.as_str()))
}
