use std::env;
use std::path::Path;

use indexmap::IndexSet;
use swc_core::common::comments::{Comment, CommentKind};
use swc_core::common::{Span, Spanned, SyntaxContext, DUMMY_SP};
use swc_core::ecma::ast::{
  ClassDecl, Decl, EmptyStmt, Expr, FnDecl, Ident, ImportDecl, ImportNamedSpecifier, ImportPhase,
  ImportSpecifier, ImportStarAsSpecifier, Lit, Module, ModuleDecl, ModuleItem, Null, Pat, Stmt,
  Str,
};
use swc_core::ecma::visit::{noop_visit_mut_type, VisitMut, VisitMutWith};
use tracing::debug;

use crate::constants::{COMPILED_RUNTIME_MODULE, PACKAGE_NAME, VERSION_OVERRIDE_ENV};
use crate::types::{CleanupAction, PathCleanup, TransformState};

/// Apply the deferred finalization steps once, at traversal exit.
///
/// Gated on the file being applicable (import record present or the xcss
/// flag set); otherwise the module is left exactly as parsed.
pub fn finalize(module: &mut Module, state: &mut TransformState) {
  if state.compiled_imports.is_none() && !state.uses_xcss {
    return;
  }

  debug!(
    runtime_imports = state.runtime_imports.len(),
    cleanups = state.paths_to_cleanup.len(),
    "finalizing module"
  );

  // Comments live in a flat list on the file rather than attached to
  // nodes, so traversal mutation cannot displace the leading region; the
  // provenance insert below owns index 0.
  append_runtime_imports(module, state);

  if !state.pragma.any()
    && state.opts.import_react.unwrap_or(true)
    && !module_has_binding(module, "React")
  {
    insert_react_import(module);
  }

  if state.uses_styled && !module_has_binding(module, "forwardRef") {
    insert_forward_ref_import(module);
  }

  insert_generated_comment(module, state);
  notify_included_files(state);

  let actions = std::mem::take(&mut state.paths_to_cleanup);
  apply_cleanups(module, actions);
}

fn create_named_specifier(name: &str) -> ImportSpecifier {
  ImportSpecifier::Named(ImportNamedSpecifier {
    span: DUMMY_SP,
    local: Ident::new(name.into(), DUMMY_SP, SyntaxContext::empty()),
    imported: None,
    is_type_only: false,
  })
}

fn create_import_decl(module_path: &str, specifiers: Vec<ImportSpecifier>) -> ModuleItem {
  ModuleItem::ModuleDecl(ModuleDecl::Import(ImportDecl {
    span: DUMMY_SP,
    specifiers,
    src: Box::new(Str {
      span: DUMMY_SP,
      value: module_path.into(),
      raw: None,
    }),
    type_only: false,
    with: None,
    phase: ImportPhase::Evaluation,
  }))
}

fn specifier_local_name(specifier: &ImportSpecifier) -> &str {
  match specifier {
    ImportSpecifier::Named(named) => named.local.sym.as_ref(),
    ImportSpecifier::Default(default) => default.local.sym.as_ref(),
    ImportSpecifier::Namespace(namespace) => namespace.local.sym.as_ref(),
  }
}

/// Append the runtime helper imports the fired handlers requested. An
/// existing runtime import is merged into rather than duplicated.
fn append_runtime_imports(module: &mut Module, state: &mut TransformState) {
  if state.runtime_imports.is_empty() {
    return;
  }

  let requested = std::mem::take(&mut state.runtime_imports);

  if let Some(existing) = module.body.iter_mut().find_map(|item| match item {
    ModuleItem::ModuleDecl(ModuleDecl::Import(import))
      if import.src.value.as_ref() == COMPILED_RUNTIME_MODULE =>
    {
      Some(import)
    }
    _ => None,
  }) {
    let mut locals: IndexSet<String> = existing
      .specifiers
      .iter()
      .map(|specifier| specifier_local_name(specifier).to_string())
      .collect();

    for name in requested {
      if locals.insert(name.clone()) {
        existing.specifiers.push(create_named_specifier(&name));
      }
    }

    return;
  }

  let specifiers = requested
    .iter()
    .map(|name| create_named_specifier(name))
    .collect();

  module
    .body
    .insert(0, create_import_decl(COMPILED_RUNTIME_MODULE, specifiers));
}

fn pattern_contains_ident(pat: &Pat, name: &str) -> bool {
  match pat {
    Pat::Ident(binding) => binding.id.sym.as_ref() == name,
    Pat::Array(array) => array
      .elems
      .iter()
      .flatten()
      .any(|elem| pattern_contains_ident(elem, name)),
    Pat::Object(object) => object.props.iter().any(|prop| match prop {
      swc_core::ecma::ast::ObjectPatProp::Assign(assign) => assign.key.sym.as_ref() == name,
      swc_core::ecma::ast::ObjectPatProp::KeyValue(kv) => pattern_contains_ident(&kv.value, name),
      swc_core::ecma::ast::ObjectPatProp::Rest(rest) => pattern_contains_ident(&rest.arg, name),
    }),
    Pat::Assign(assign) => pattern_contains_ident(&assign.left, name),
    Pat::Rest(rest) => pattern_contains_ident(&rest.arg, name),
    Pat::Expr(expr) => {
      matches!(expr.as_ref(), Expr::Ident(ident) if ident.sym.as_ref() == name)
    }
    _ => false,
  }
}

/// Whether the module already declares `name` through an import, variable,
/// function or class at the top level.
pub fn module_has_binding(module: &Module, name: &str) -> bool {
  for item in &module.body {
    match item {
      ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => {
        if import
          .specifiers
          .iter()
          .any(|specifier| specifier_local_name(specifier) == name)
        {
          return true;
        }
      }
      ModuleItem::Stmt(Stmt::Decl(decl)) => match decl {
        Decl::Var(var) => {
          if var
            .decls
            .iter()
            .any(|decl| pattern_contains_ident(&decl.name, name))
          {
            return true;
          }
        }
        Decl::Fn(FnDecl { ident, .. }) | Decl::Class(ClassDecl { ident, .. }) => {
          if ident.sym.as_ref() == name {
            return true;
          }
        }
        _ => {}
      },
      _ => {}
    }
  }

  false
}

fn insert_react_import(module: &mut Module) {
  let import = ImportDecl {
    span: DUMMY_SP,
    specifiers: vec![ImportSpecifier::Namespace(ImportStarAsSpecifier {
      span: DUMMY_SP,
      local: Ident::new("React".into(), DUMMY_SP, SyntaxContext::empty()),
    })],
    src: Box::new(Str {
      span: DUMMY_SP,
      value: "react".into(),
      raw: None,
    }),
    type_only: false,
    with: None,
    phase: ImportPhase::Evaluation,
  };

  module
    .body
    .insert(0, ModuleItem::ModuleDecl(ModuleDecl::Import(import)));
}

fn insert_forward_ref_import(module: &mut Module) {
  module.body.insert(
    0,
    create_import_decl("react", vec![create_named_specifier("forwardRef")]),
  );
}

fn generated_comment_text(state: &TransformState) -> String {
  let filename = state
    .filename
    .as_deref()
    .and_then(|value| Path::new(value).file_name())
    .and_then(|name| name.to_str())
    .filter(|value| !value.is_empty())
    .map(str::to_string)
    .unwrap_or_else(|| "File".to_string());

  let version = env::var(VERSION_OVERRIDE_ENV)
    .ok()
    .filter(|value| !value.is_empty())
    .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

  format!(" {filename} generated by {PACKAGE_NAME} v{version} ")
}

/// Stamp the provenance comment as the file's first leading comment, with a
/// synthetic empty statement acting as the blank separator it anchors to.
fn insert_generated_comment(module: &mut Module, state: &mut TransformState) {
  let text = generated_comment_text(state);

  module.body.insert(
    0,
    ModuleItem::Stmt(Stmt::Empty(EmptyStmt { span: DUMMY_SP })),
  );

  state.file.comments.insert(
    0,
    Comment {
      kind: CommentKind::Block,
      span: DUMMY_SP,
      text: text.into(),
    },
  );
}

/// Invoke the configured callback exactly once with the de-duplicated,
/// order-preserving list of included files, only when files were resolved.
fn notify_included_files(state: &mut TransformState) {
  let Some(callback) = state.opts.on_included_files.clone() else {
    return;
  };

  if state.included_files.is_empty() {
    return;
  }

  let deduplicated: IndexSet<String> = state.included_files.iter().cloned().collect();
  callback.call(deduplicated.into_iter().collect());
}

/// Apply every queued cleanup in original enqueue order. Each action runs
/// its own pass so queue position, not tree position, decides ordering.
fn apply_cleanups(module: &mut Module, actions: Vec<PathCleanup>) {
  for cleanup in actions {
    match cleanup.action {
      CleanupAction::Replace => {
        let mut applier = NullReplacer {
          target: cleanup.span,
        };
        module.visit_mut_with(&mut applier);
      }
      CleanupAction::Remove => {
        let mut applier = NodeRemover {
          target: cleanup.span,
        };
        module.visit_mut_with(&mut applier);
      }
    }
  }
}

struct NullReplacer {
  target: Span,
}

impl VisitMut for NullReplacer {
  noop_visit_mut_type!();

  fn visit_mut_expr(&mut self, expr: &mut Expr) {
    expr.visit_mut_children_with(self);

    if expr.span() == self.target {
      *expr = Expr::Lit(Lit::Null(Null { span: self.target }));
    }
  }
}

struct NodeRemover {
  target: Span,
}

impl VisitMut for NodeRemover {
  noop_visit_mut_type!();

  fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
    items.retain(|item| item.span() != self.target);
    items.visit_mut_children_with(self);
  }

  fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
    stmts.retain(|stmt| stmt.span() != self.target);
    stmts.visit_mut_children_with(self);
  }
}
