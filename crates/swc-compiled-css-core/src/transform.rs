use swc_core::common::Spanned;
use swc_core::ecma::ast::{
  Expr, Ident, JSXElement, JSXOpeningElement, Module, ModuleDecl, ModuleItem, Program,
};
use swc_core::ecma::visit::{noop_visit_mut_type, VisitMut, VisitMutWith};
use tracing::debug;

use crate::finalize::finalize;
use crate::handlers::ExtractionHandlers;
use crate::imports::process_import_decl;
use crate::pragma::process_pragmas;
use crate::types::{CleanupAction, SharedTransformState, TransformState};

/// What a root-context expression turned out to be, in classification
/// priority order. The style-map builder is checked first so its nested
/// style objects are never mistaken for plain style usages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompiledUsage {
  CssMap,
  Css,
  Keyframes,
  Styled,
}

/// Single-pass dispatcher. Walks the program once, strips recognized
/// imports, classifies style API usages and routes each to the matching
/// [`ExtractionHandlers`] hook, then runs finalization at traversal exit.
pub struct CompiledTransform<'a> {
  state: SharedTransformState,
  handlers: &'a mut dyn ExtractionHandlers,
}

impl<'a> CompiledTransform<'a> {
  pub fn new(state: SharedTransformState, handlers: &'a mut dyn ExtractionHandlers) -> Self {
    Self { state, handlers }
  }

  fn transform_module_program(&mut self, module: &mut Module) {
    {
      let mut state = self.state.borrow_mut();
      process_pragmas(&mut state);
    }

    {
      let mut state = self.state.borrow_mut();
      module.body.retain_mut(|item| match item {
        ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => {
          process_import_decl(import, &mut state)
        }
        _ => true,
      });
    }

    module.visit_mut_children_with(self);

    let mut state = self.state.borrow_mut();
    finalize(module, &mut state);
    state.transform_cache.clear();
  }

  fn classify(state: &TransformState, expr: &Expr) -> Option<CompiledUsage> {
    let imports = state.compiled_imports.as_ref()?;

    if let Some(ident) = direct_callee(expr) {
      let local = ident.sym.as_ref();

      if imports.is_css_map(local) {
        return Some(CompiledUsage::CssMap);
      }
      if imports.is_css(local) {
        return Some(CompiledUsage::Css);
      }
      if imports.is_keyframes(local) {
        return Some(CompiledUsage::Keyframes);
      }
    }

    if let Some(ident) = styled_target(expr) {
      if imports.is_styled(ident.sym.as_ref()) {
        return Some(CompiledUsage::Styled);
      }
    }

    None
  }

  fn dispatch_expr(&mut self, usage: CompiledUsage, expr: &mut Expr) {
    debug!(?usage, "dispatching compiled usage");

    match usage {
      CompiledUsage::CssMap => self.handlers.visit_css_map(expr, &self.state),
      CompiledUsage::Css => {
        self.handlers.normalize_props_usage(expr);
        self
          .state
          .borrow_mut()
          .enqueue_cleanup(CleanupAction::Replace, expr.span());
      }
      // Keyframes skip the props normalization rewrite.
      CompiledUsage::Keyframes => {
        self
          .state
          .borrow_mut()
          .enqueue_cleanup(CleanupAction::Replace, expr.span());
      }
      CompiledUsage::Styled => {
        self.handlers.normalize_props_usage(expr);
        self.state.borrow_mut().uses_styled = true;
        self.handlers.visit_styled(expr, &self.state);
      }
    }
  }
}

/// The identifier a call or tagged template is invoked through, when it is
/// invoked directly by name.
fn direct_callee(expr: &Expr) -> Option<&Ident> {
  match expr {
    Expr::Call(call) => call.callee.as_expr().and_then(|callee| callee.as_ident()),
    Expr::TaggedTpl(tagged) => tagged.tag.as_ident(),
    _ => None,
  }
}

/// The identifier at the root of a styled-component usage. Covers the bare
/// form, the member form (`styled.div`) and the composed form
/// (`styled(Base)`), each as either a call or a tagged template.
fn styled_target(expr: &Expr) -> Option<&Ident> {
  let target: &Expr = match expr {
    Expr::Call(call) => call.callee.as_expr()?.as_ref(),
    Expr::TaggedTpl(tagged) => tagged.tag.as_ref(),
    _ => return None,
  };

  match target {
    Expr::Ident(ident) => Some(ident),
    Expr::Member(member) => member.obj.as_ident(),
    Expr::Call(inner) => inner.callee.as_expr().and_then(|callee| callee.as_ident()),
    _ => None,
  }
}

impl VisitMut for CompiledTransform<'_> {
  noop_visit_mut_type!();

  fn visit_mut_program(&mut self, program: &mut Program) {
    match program {
      Program::Module(module) => self.transform_module_program(module),
      Program::Script(script) => {
        let body = std::mem::take(&mut script.body);
        let shebang = script.shebang.take();
        let mut module = Module {
          span: script.span,
          body: body.into_iter().map(ModuleItem::Stmt).collect(),
          shebang,
        };

        self.transform_module_program(&mut module);
        *program = Program::Module(module);
      }
    }
  }

  fn visit_mut_expr(&mut self, expr: &mut Expr) {
    let span = expr.span();

    let usage = {
      let state = self.state.borrow();
      if state.transform_cache.has(span) {
        return;
      }
      Self::classify(&state, expr)
    };

    let Some(usage) = usage else {
      expr.visit_mut_children_with(self);
      return;
    };

    self.state.borrow_mut().transform_cache.set(span);
    self.dispatch_expr(usage, expr);
  }

  fn visit_mut_jsx_element(&mut self, element: &mut JSXElement) {
    let has_class_names = self
      .state
      .borrow()
      .compiled_imports
      .as_ref()
      .map(|imports| imports.has_class_names())
      .unwrap_or(false);

    if has_class_names {
      self.handlers.visit_class_names(element, &self.state);
    }

    element.visit_mut_children_with(self);
  }

  fn visit_mut_jsx_opening_element(&mut self, element: &mut JSXOpeningElement) {
    let (uses_xcss, has_record) = {
      let state = self.state.borrow();
      (state.uses_xcss, state.compiled_imports.is_some())
    };

    // The two prop hooks fire independently: the xcss path needs no import
    // record, while the css prop path needs the record and nothing else.
    if uses_xcss {
      self.handlers.visit_xcss_prop(element, &self.state);
    }

    if has_record {
      self.handlers.visit_css_prop(element, &self.state);
    }

    element.visit_mut_children_with(self);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::handlers::NoopHandlers;
  use crate::types::{PluginOptions, TransformFile, TransformFileOptions};
  use std::cell::RefCell;
  use std::rc::Rc;
  use swc_core::common::comments::Comment;
  use swc_core::common::sync::Lrc;
  use swc_core::common::{FileName, SourceMap};
  use swc_core::ecma::ast::{Lit, Stmt};
  use swc_core::ecma::codegen::{text_writer::JsWriter, Config, Emitter};
  use swc_core::ecma::parser::lexer::Lexer;
  use swc_core::ecma::parser::{EsSyntax, Parser, StringInput, Syntax};

  fn parse_program(code: &str) -> (Program, Lrc<SourceMap>) {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(
      Lrc::new(FileName::Custom("test.tsx".into())),
      code.to_string(),
    );
    let lexer = Lexer::new(
      Syntax::Es(EsSyntax {
        jsx: true,
        ..Default::default()
      }),
      Default::default(),
      StringInput::from(&*fm),
      None,
    );
    let mut parser = Parser::new_from(lexer);
    let program = parser.parse_program().expect("failed to parse program");
    assert!(parser.take_errors().is_empty());

    (program, cm)
  }

  fn parse_script(code: &str) -> (Program, Lrc<SourceMap>) {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(
      Lrc::new(FileName::Custom("script.tsx".into())),
      code.to_string(),
    );
    let lexer = Lexer::new(
      Syntax::Es(EsSyntax {
        jsx: true,
        ..Default::default()
      }),
      Default::default(),
      StringInput::from(&*fm),
      None,
    );
    let mut parser = Parser::new_from(lexer);
    let script = parser.parse_script().expect("failed to parse script");
    assert!(parser.take_errors().is_empty());

    (Program::Script(script), cm)
  }

  fn print_module(cm: &Lrc<SourceMap>, module: &Module) -> String {
    let mut buf = Vec::new();
    {
      let writer = JsWriter::new(cm.clone(), "\n", &mut buf, None);
      let mut emitter = Emitter {
        cfg: Config::default(),
        comments: None,
        cm: cm.clone(),
        wr: writer,
      };
      emitter
        .emit_module(module)
        .expect("failed to emit transformed module");
    }

    String::from_utf8(buf).expect("module is not valid UTF-8")
  }

  fn shared_state(cm: Lrc<SourceMap>, comments: Vec<Comment>) -> SharedTransformState {
    let file = TransformFile::with_options(
      cm,
      comments,
      TransformFileOptions {
        filename: Some("test.tsx".into()),
        ..TransformFileOptions::default()
      },
    );
    Rc::new(RefCell::new(TransformState::new(
      file,
      PluginOptions::default(),
    )))
  }

  fn run(state: &SharedTransformState, program: &mut Program) {
    let mut handlers = NoopHandlers;
    let mut transform = CompiledTransform::new(state.clone(), &mut handlers);
    program.visit_mut_with(&mut transform);
  }

  fn module_items_without_noop(module: &Module) -> Vec<&ModuleItem> {
    module
      .body
      .iter()
      .filter(|item| !matches!(item, ModuleItem::Stmt(Stmt::Empty(_))))
      .collect()
  }

  #[derive(Default)]
  struct RecordingHandlers {
    css_map: usize,
    normalized: usize,
    styled: usize,
    class_names: usize,
    xcss_prop: usize,
    css_prop: usize,
  }

  impl ExtractionHandlers for RecordingHandlers {
    fn visit_css_map(&mut self, _expr: &mut Expr, _state: &SharedTransformState) {
      self.css_map += 1;
    }

    fn normalize_props_usage(&mut self, _expr: &mut Expr) {
      self.normalized += 1;
    }

    fn visit_styled(&mut self, _expr: &mut Expr, _state: &SharedTransformState) {
      self.styled += 1;
    }

    fn visit_class_names(&mut self, _element: &mut JSXElement, _state: &SharedTransformState) {
      self.class_names += 1;
    }

    fn visit_xcss_prop(&mut self, _element: &mut JSXOpeningElement, _state: &SharedTransformState) {
      self.xcss_prop += 1;
    }

    fn visit_css_prop(&mut self, _element: &mut JSXOpeningElement, _state: &SharedTransformState) {
      self.css_prop += 1;
    }
  }

  #[test]
  fn leaves_unrelated_files_untouched() {
    let code = "import { css } from '@emotion/react';\nconst styles = css({ color: 'red' });\n";
    let (mut program, cm) = parse_program(code);
    let before = print_module(&cm, program.as_module().expect("module program"));
    let state = shared_state(cm.clone(), Vec::new());

    run(&state, &mut program);

    let module = program.as_module().expect("module program");
    assert_eq!(print_module(&cm, module), before);
    assert!(state.borrow().compiled_imports.is_none());
    assert!(state.borrow().file.comments.is_empty());
  }

  #[test]
  fn strips_recognized_import_and_marks_file_applicable() {
    let code = "import { styled } from '@compiled/react';\nimport React from 'react';\n";
    let (mut program, cm) = parse_program(code);
    let state = shared_state(cm, Vec::new());

    run(&state, &mut program);

    let module = program.as_module().expect("module program");
    let items = module_items_without_noop(module);

    // The recognized import is fully consumed; the react import survives.
    assert_eq!(items.len(), 1);
    assert!(matches!(
      items[0],
      ModuleItem::ModuleDecl(ModuleDecl::Import(import))
        if import.src.value.as_ref() == "react"
    ));

    let state = state.borrow();
    let imports = state.compiled_imports.as_ref().expect("import record");
    assert_eq!(imports.styled, vec!["styled".to_string()]);
  }

  #[test]
  fn aliased_styled_usage_fires_handler_and_inserts_react_imports() {
    let code = "import { styled as s } from '@compiled/react';\n\
                const Button = s.div`color: red;`;\n";
    let (mut program, cm) = parse_program(code);
    let state = shared_state(cm, Vec::new());

    let mut handlers = RecordingHandlers::default();
    {
      let mut transform = CompiledTransform::new(state.clone(), &mut handlers);
      program.visit_mut_with(&mut transform);
    }

    assert_eq!(handlers.styled, 1);
    assert_eq!(handlers.normalized, 1);
    assert!(state.borrow().uses_styled);

    let module = program.as_module().expect("module program");
    let items = module_items_without_noop(module);

    let sources: Vec<&str> = items
      .iter()
      .filter_map(|item| match item {
        ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => Some(import.src.value.as_ref()),
        _ => None,
      })
      .collect();

    // forwardRef is inserted last so it lands first, before React.
    assert_eq!(sources, vec!["react", "react"]);
    assert!(matches!(
      items[0],
      ModuleItem::ModuleDecl(ModuleDecl::Import(import))
        if matches!(&import.specifiers[0], swc_core::ecma::ast::ImportSpecifier::Named(named)
          if named.local.sym.as_ref() == "forwardRef")
    ));
  }

  #[test]
  fn css_usage_is_replaced_with_null_at_finalization() {
    let code = "import { css } from '@compiled/react';\n\
                const styles = css({ color: 'red' });\n";
    let (mut program, cm) = parse_program(code);
    let state = shared_state(cm.clone(), Vec::new());

    run(&state, &mut program);

    let module = program.as_module().expect("module program");
    let declaration = module
      .body
      .iter()
      .find_map(|item| match item {
        ModuleItem::Stmt(Stmt::Decl(swc_core::ecma::ast::Decl::Var(var))) => {
          var.decls.first().and_then(|decl| decl.init.as_deref())
        }
        _ => None,
      })
      .expect("styles declaration");

    assert!(matches!(declaration, Expr::Lit(Lit::Null(_))));
    assert!(state.borrow().paths_to_cleanup.is_empty());
    assert!(print_module(&cm, module).contains("const styles = null;"));
  }

  #[test]
  fn keyframes_usage_is_also_queued_for_replacement() {
    let code = "import { keyframes } from '@compiled/react';\n\
                const fade = keyframes`from { opacity: 0; }`;\n";
    let (mut program, cm) = parse_program(code);
    let state = shared_state(cm, Vec::new());

    run(&state, &mut program);

    let module = program.as_module().expect("module program");
    let init = module
      .body
      .iter()
      .find_map(|item| match item {
        ModuleItem::Stmt(Stmt::Decl(swc_core::ecma::ast::Decl::Var(var))) => {
          var.decls.first().and_then(|decl| decl.init.as_deref())
        }
        _ => None,
      })
      .expect("keyframes declaration");

    assert!(matches!(init, Expr::Lit(Lit::Null(_))));
  }

  #[test]
  fn css_map_takes_priority_and_is_not_replaced() {
    let code = "import { cssMap } from '@compiled/react';\n\
                const styles = cssMap({ primary: { color: 'red' } });\n";
    let (mut program, cm) = parse_program(code);
    let state = shared_state(cm, Vec::new());

    let mut handlers = RecordingHandlers::default();
    {
      let mut transform = CompiledTransform::new(state.clone(), &mut handlers);
      program.visit_mut_with(&mut transform);
    }

    assert_eq!(handlers.css_map, 1);
    assert_eq!(handlers.normalized, 0);
    assert!(state.borrow().paths_to_cleanup.is_empty());
  }

  #[test]
  fn class_names_hook_fires_only_when_wrapper_imported() {
    let code = "import { ClassNames } from '@compiled/react';\n\
                const Component = () => (\n\
                  <ClassNames>{({ css }) => <div className={css({ color: 'red' })} />}</ClassNames>\n\
                );\n";
    let (mut program, cm) = parse_program(code);
    let state = shared_state(cm, Vec::new());

    let mut handlers = RecordingHandlers::default();
    {
      let mut transform = CompiledTransform::new(state.clone(), &mut handlers);
      program.visit_mut_with(&mut transform);
    }

    assert!(handlers.class_names >= 1);
    // Every opening element also flows through the css prop hook because the
    // import record exists.
    assert!(handlers.css_prop >= 1);
    assert_eq!(handlers.xcss_prop, 0);
  }

  #[test]
  fn xcss_hook_fires_without_any_compiled_import() {
    let code = "const Component = () => <Button xcss={{ color: 'red' }} />;\n";
    let (mut program, cm) = parse_program(code);

    let file = TransformFile::with_options(
      cm,
      Vec::new(),
      TransformFileOptions {
        filename: Some("test.tsx".into()),
        source_text: Some(code.into()),
        ..TransformFileOptions::default()
      },
    );
    let state: SharedTransformState = Rc::new(RefCell::new(TransformState::new(
      file,
      PluginOptions::default(),
    )));

    let mut handlers = RecordingHandlers::default();
    {
      let mut transform = CompiledTransform::new(state.clone(), &mut handlers);
      program.visit_mut_with(&mut transform);
    }

    assert_eq!(handlers.xcss_prop, 1);
    assert_eq!(handlers.css_prop, 0);
    assert!(state.borrow().uses_xcss);

    // The xcss flag alone makes the file applicable for finalization.
    let module = program.as_module().expect("module program");
    assert!(matches!(module.body[0], ModuleItem::Stmt(Stmt::Empty(_))));
  }

  #[test]
  fn scripts_are_promoted_to_modules() {
    let code = "const Component = () => <Button xcss={{ color: 'red' }} />;\n";
    let (mut program, cm) = parse_script(code);

    let file = TransformFile::with_options(
      cm,
      Vec::new(),
      TransformFileOptions {
        filename: Some("script.tsx".into()),
        source_text: Some(code.into()),
        ..TransformFileOptions::default()
      },
    );
    let state: SharedTransformState = Rc::new(RefCell::new(TransformState::new(
      file,
      PluginOptions::default(),
    )));

    run(&state, &mut program);

    assert!(matches!(program, Program::Module(_)));
  }

  #[test]
  fn each_usage_is_dispatched_exactly_once() {
    let code = "import { styled } from '@compiled/react';\n\
                const A = styled.div`color: red;`;\n\
                const B = styled.span`color: blue;`;\n";
    let (mut program, cm) = parse_program(code);
    let state = shared_state(cm, Vec::new());

    let mut handlers = RecordingHandlers::default();
    {
      let mut transform = CompiledTransform::new(state.clone(), &mut handlers);
      program.visit_mut_with(&mut transform);
    }

    assert_eq!(handlers.styled, 2);
  }

  #[test]
  fn composed_styled_call_is_recognized() {
    let code = "import { styled } from '@compiled/react';\n\
                const Base = (props) => <div {...props} />;\n\
                const Styled = styled(Base)`color: red;`;\n";
    let (mut program, cm) = parse_program(code);
    let state = shared_state(cm, Vec::new());

    let mut handlers = RecordingHandlers::default();
    {
      let mut transform = CompiledTransform::new(state.clone(), &mut handlers);
      program.visit_mut_with(&mut transform);
    }

    assert_eq!(handlers.styled, 1);
    assert!(state.borrow().uses_styled);
  }

  #[test]
  fn import_react_false_suppresses_react_namespace_import() {
    let code = "import { styled } from '@compiled/react';\n\
                const Button = styled.div`color: red;`;\n";
    let (mut program, cm) = parse_program(code);

    let file = TransformFile::with_options(
      cm,
      Vec::new(),
      TransformFileOptions {
        filename: Some("test.tsx".into()),
        ..TransformFileOptions::default()
      },
    );
    let state: SharedTransformState = Rc::new(RefCell::new(TransformState::new(
      file,
      PluginOptions {
        import_react: Some(false),
        ..PluginOptions::default()
      },
    )));

    run(&state, &mut program);

    let module = program.as_module().expect("module program");
    let has_react_namespace = module.body.iter().any(|item| {
      matches!(
        item,
        ModuleItem::ModuleDecl(ModuleDecl::Import(import))
          if import.specifiers.iter().any(|specifier| matches!(
            specifier,
            swc_core::ecma::ast::ImportSpecifier::Namespace(_)
          ))
      )
    });

    assert!(!has_react_namespace);

    // forwardRef insertion for styled usage is not affected by the option.
    let has_forward_ref = module.body.iter().any(|item| {
      matches!(
        item,
        ModuleItem::ModuleDecl(ModuleDecl::Import(import))
          if import.specifiers.iter().any(|specifier| matches!(
            specifier,
            swc_core::ecma::ast::ImportSpecifier::Named(named)
              if named.local.sym.as_ref() == "forwardRef"
          ))
      )
    });
    assert!(has_forward_ref);
  }
}
