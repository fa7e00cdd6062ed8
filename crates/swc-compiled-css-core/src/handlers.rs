use swc_core::ecma::ast::{Expr, JSXElement, JSXOpeningElement};

use crate::types::SharedTransformState;

/// Seam between the orchestration core and the variant-specific extraction
/// logic. The dispatcher classifies nodes and routes them here; the
/// implementations own all CSS parsing, hashing and artifact generation.
///
/// Handlers observe and mutate the shared [`TransformState`]: they may
/// request runtime imports, record included files, push style rules, and
/// enqueue cleanup actions. Errors they raise are fatal for the current
/// file; the core does not catch or wrap them.
///
/// [`TransformState`]: crate::types::TransformState
pub trait ExtractionHandlers {
  /// A style-map builder (`cssMap`) call or tagged template at root context.
  fn visit_css_map(&mut self, expr: &mut Expr, state: &SharedTransformState) {
    let _ = (expr, state);
  }

  /// Pure rewrite of how a construct's body references surrounding component
  /// properties. Applied before styled extraction; no extraction side
  /// effects are permitted here.
  fn normalize_props_usage(&mut self, expr: &mut Expr) {
    let _ = expr;
  }

  /// A styled-component (`styled`) call or tagged template at root context.
  fn visit_styled(&mut self, expr: &mut Expr, state: &SharedTransformState) {
    let _ = (expr, state);
  }

  /// A JSX element in a file whose import record contains the class
  /// composition wrapper (`ClassNames`).
  fn visit_class_names(&mut self, element: &mut JSXElement, state: &SharedTransformState) {
    let _ = (element, state);
  }

  /// A JSX opening element in a file where the textual xcss pre-scan fired.
  fn visit_xcss_prop(&mut self, element: &mut JSXOpeningElement, state: &SharedTransformState) {
    let _ = (element, state);
  }

  /// A JSX opening element in a file whose import record exists.
  fn visit_css_prop(&mut self, element: &mut JSXOpeningElement, state: &SharedTransformState) {
    let _ = (element, state);
  }
}

/// Handler set that performs no extraction. The core still strips imports,
/// queues cleanups and finalizes the file, which is the behaviour exercised
/// by most of the orchestration tests.
#[derive(Debug, Default)]
pub struct NoopHandlers;

impl ExtractionHandlers for NoopHandlers {}
