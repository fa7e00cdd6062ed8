use std::any::Any;
use std::sync::Once;

use serde::{Deserialize, Serialize};
use swc_core::common::Span;

static PANIC_HOOK_INIT: Once = Once::new();

/// Install a process-wide panic hook that suppresses the default panic
/// output. Failures inside a transform are fatal for that file only and are
/// reported to the caller as structured diagnostics, so the default stderr
/// dump is noise.
pub fn init_panic_suppression() {
  PANIC_HOOK_INIT.call_once(|| {
    let debug_panics = std::env::var("COMPILED_CSS_DEBUG_PANIC").is_ok();
    std::panic::set_hook(Box::new(move |info| {
      if debug_panics {
        eprintln!("[swc-compiled-css-core] panic: {info}");
      }
    }));
  });
}

/// A fatal per-file failure raised during transformation.
///
/// There is no retry or rollback: the file that raised the error is aborted
/// with whatever mutations were already applied, and other files in a batch
/// are unaffected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformError {
  pub message: String,
  #[serde(skip)]
  pub span: Option<Span>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hints: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none", rename = "documentationUrl")]
  pub documentation_url: Option<String>,
}

impl TransformError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      span: None,
      hints: None,
      documentation_url: None,
    }
  }

  pub fn with_span(mut self, span: Span) -> Self {
    self.span = Some(span);
    self
  }

  /// Convert a caught panic payload into a diagnostic.
  pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
    let message = if let Some(message) = payload.downcast_ref::<String>() {
      message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
      (*message).to_string()
    } else {
      "transform aborted by an unexpected panic".to_string()
    };

    Self::new(message)
  }
}

impl std::fmt::Display for TransformError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.message)
  }
}

impl std::error::Error for TransformError {}
