use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::constants::COMPILED_IMPORT;
use crate::types::TransformState;

static JSX_SOURCE_ANNOTATION_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"\*?\s*@jsxImportSource\s+([^\s]+)").expect("jsx import source regex should compile")
});

static JSX_ANNOTATION_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"\*?\s*@jsx\s+([^\s]+)").expect("jsx pragma regex should compile"));

static XCSS_PROP_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)xcss\s*=\s*\{").expect("xcss prop regex should compile"));

/// Scan the file's leading comments for pragma annotations and, when
/// enabled, the raw source text for an xcss prop usage.
///
/// Every comment is tested against both patterns with no early exit, so
/// when several comments match, the last match wins for each flag. That is
/// observed upstream behaviour and is preserved deliberately.
pub fn process_pragmas(state: &mut TransformState) {
  let mut source_match: Option<usize> = None;
  let mut jsx_match: Option<usize> = None;

  for (index, comment) in state.file.comments.iter().enumerate() {
    let text = comment.text.as_ref();

    if let Some(captures) = JSX_SOURCE_ANNOTATION_REGEX.captures(text) {
      let origin = captures.get(1).map(|m| m.as_str()).unwrap_or("");
      if origin == COMPILED_IMPORT {
        source_match = Some(index);
      }
    }

    if JSX_ANNOTATION_REGEX.is_match(text) {
      jsx_match = Some(index);
    }
  }

  if source_match.is_some() {
    state.pragma.jsx_import_source = true;
    state.ensure_compiled_imports();
  }
  if jsx_match.is_some() {
    state.pragma.jsx = true;
  }

  // Only the compiled import-source pragma is consumed. A generic @jsx
  // pragma may belong to another library, and a file it does not make
  // applicable must pass through with its comments intact.
  if let Some(index) = source_match {
    state.file.comments.remove(index);
  }

  process_xcss_text(state);

  debug!(
    jsx = state.pragma.jsx,
    jsx_import_source = state.pragma.jsx_import_source,
    uses_xcss = state.uses_xcss,
    "processed pragmas"
  );
}

/// Textual pre-scan for the special style prop. Deliberately independent of
/// import analysis so xcss usage is detected without the main API import.
fn process_xcss_text(state: &mut TransformState) {
  if !state.opts.process_xcss.unwrap_or(true) {
    return;
  }

  let Some(source) = state.file.source_text.as_deref() else {
    return;
  };

  if XCSS_PROP_REGEX.is_match(source) {
    state.uses_xcss = true;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{PluginOptions, TransformFile, TransformFileOptions, TransformState};
  use swc_core::common::comments::{Comment, CommentKind};
  use swc_core::common::sync::Lrc;
  use swc_core::common::{SourceMap, DUMMY_SP};

  fn block_comment(text: &str) -> Comment {
    Comment {
      kind: CommentKind::Block,
      span: DUMMY_SP,
      text: text.to_string().into(),
    }
  }

  fn state_with(comments: Vec<Comment>, source_text: Option<&str>) -> TransformState {
    let cm: Lrc<SourceMap> = Default::default();
    let file = TransformFile::with_options(
      cm,
      comments,
      TransformFileOptions {
        source_text: source_text.map(str::to_string),
        ..TransformFileOptions::default()
      },
    );
    TransformState::new(file, PluginOptions::default())
  }

  #[test]
  fn jsx_import_source_pragma_marks_file_applicable() {
    let mut state = state_with(
      vec![block_comment("* @jsxImportSource @compiled/react ")],
      None,
    );

    process_pragmas(&mut state);

    assert!(state.pragma.jsx_import_source);
    assert!(state.compiled_imports.is_some());
    assert!(state.file.comments.is_empty(), "pragma comment is consumed");
  }

  #[test]
  fn foreign_import_source_is_ignored() {
    let mut state = state_with(vec![block_comment("* @jsxImportSource @emotion/react ")], None);

    process_pragmas(&mut state);

    assert!(!state.pragma.jsx_import_source);
    assert!(state.compiled_imports.is_none());
    assert_eq!(state.file.comments.len(), 1);
  }

  #[test]
  fn classic_jsx_pragma_sets_flag_without_marking_applicable() {
    let mut state = state_with(vec![block_comment("* @jsx myJsx ")], None);

    process_pragmas(&mut state);

    assert!(state.pragma.jsx);
    assert!(state.compiled_imports.is_none());
    assert_eq!(state.file.comments.len(), 1);
  }

  #[test]
  fn inapplicable_file_keeps_foreign_jsx_pragma_comment() {
    let mut state = state_with(
      vec![
        block_comment("* @jsx jsx "),
        block_comment(" copyright banner "),
      ],
      None,
    );

    process_pragmas(&mut state);

    assert!(state.pragma.jsx);
    assert!(state.compiled_imports.is_none());
    assert!(!state.uses_xcss);
    // No finalization will run for this file, so its comment list must be
    // exactly what was parsed.
    assert_eq!(state.file.comments.len(), 2);
    assert_eq!(state.file.comments[0].text.as_ref(), "* @jsx jsx ");
  }

  #[test]
  fn classic_pragma_comment_survives_alongside_consumed_import_source() {
    let mut state = state_with(
      vec![
        block_comment("* @jsx jsx "),
        block_comment("* @jsxImportSource @compiled/react "),
      ],
      None,
    );

    process_pragmas(&mut state);

    assert!(state.pragma.jsx);
    assert!(state.pragma.jsx_import_source);
    assert_eq!(state.file.comments.len(), 1);
    assert_eq!(state.file.comments[0].text.as_ref(), "* @jsx jsx ");
  }

  #[test]
  fn last_matching_comment_wins() {
    let mut state = state_with(
      vec![
        block_comment("* @jsxImportSource @compiled/react "),
        block_comment(" unrelated "),
        block_comment("* @jsxImportSource @compiled/react "),
      ],
      None,
    );

    process_pragmas(&mut state);

    assert!(state.pragma.jsx_import_source);
    // Only the last matching comment is consumed.
    assert_eq!(state.file.comments.len(), 2);
  }

  #[test]
  fn detects_xcss_prop_in_raw_text() {
    let mut state = state_with(
      Vec::new(),
      Some("const Component = () => <div xcss={{ color: 'red' }} />;"),
    );

    process_pragmas(&mut state);

    assert!(state.uses_xcss);
    assert!(state.compiled_imports.is_none());
  }

  #[test]
  fn xcss_scan_is_case_insensitive_and_suffix_tolerant() {
    let mut state = state_with(
      Vec::new(),
      Some("<Button innerXCSS={styles.primary} />"),
    );

    process_pragmas(&mut state);

    assert!(state.uses_xcss);
  }

  #[test]
  fn xcss_scan_gated_by_option() {
    let cm: Lrc<SourceMap> = Default::default();
    let file = TransformFile::with_options(
      cm,
      Vec::new(),
      TransformFileOptions {
        source_text: Some("<div xcss={{ color: 'red' }} />".into()),
        ..TransformFileOptions::default()
      },
    );
    let mut state = TransformState::new(
      file,
      PluginOptions {
        process_xcss: Some(false),
        ..PluginOptions::default()
      },
    );

    process_pragmas(&mut state);

    assert!(!state.uses_xcss);
  }
}
