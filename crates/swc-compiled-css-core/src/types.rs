use std::cell::RefCell;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use indexmap::IndexSet;
use once_cell::sync::OnceCell;
use oxc_resolver::{ResolveOptions, Resolver};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use swc_core::common::comments::Comment;
use swc_core::common::sync::Lrc;
use swc_core::common::{SourceMap, Span};
use swc_core::ecma::ast::Program;

use crate::cache::{Cache, CacheOptions};
use crate::constants::COMPILED_IMPORT;
use crate::errors::TransformError;

fn normalized_join(root: &Path, segment: &str) -> PathBuf {
  root.join(segment).components().collect()
}

/// Cache lifecycle selector mirroring the union accepted by the Babel
/// plugin's `cache` option.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CacheBehavior {
  Enabled(bool),
  /// Matches the `'file-pass'` literal: caching is on but scoped to the
  /// current file's compilation.
  FilePass(String),
}

impl CacheBehavior {
  pub fn is_enabled(&self) -> bool {
    match self {
      CacheBehavior::Enabled(value) => *value,
      CacheBehavior::FilePass(_) => true,
    }
  }
}

impl Default for CacheBehavior {
  fn default() -> Self {
    CacheBehavior::Enabled(false)
  }
}

/// Resolver configuration: an inline lookup table or a module specifier to
/// be loaded relative to the project root.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResolverOption {
  Module(String),
  Inline(Value),
}

/// Resolver capability normalized against the project root and stored on the
/// transform state. Extraction handlers use it to resolve composed or
/// imported style values.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedResolver {
  Inline(Value),
  Module(String),
}

impl ResolvedResolver {
  pub fn from_option(option: &ResolverOption, root: &Path) -> Self {
    match option {
      ResolverOption::Module(specifier) => {
        if specifier.starts_with('.') {
          let joined = normalized_join(root, specifier);
          ResolvedResolver::Module(joined.to_string_lossy().into_owned())
        } else {
          ResolvedResolver::Module(specifier.clone())
        }
      }
      ResolverOption::Inline(value) => ResolvedResolver::Inline(value.clone()),
    }
  }

  pub fn as_module(&self) -> Option<&str> {
    match self {
      ResolvedResolver::Module(value) => Some(value.as_str()),
      ResolvedResolver::Inline(_) => None,
    }
  }

  pub fn as_inline(&self) -> Option<&Value> {
    match self {
      ResolvedResolver::Inline(value) => Some(value),
      ResolvedResolver::Module(_) => None,
    }
  }

  /// Look up a key in the inline table form. Returns `None` for the module
  /// form, whose lookups go through the host-loaded module instead.
  pub fn resolve_inline(&self, key: &str) -> Option<&Value> {
    self.as_inline().and_then(|value| value.get(key))
  }
}

/// Callback invoked once per file with the de-duplicated list of files
/// composed into the output during extraction.
#[derive(Clone)]
pub struct IncludedFilesCallback(Rc<dyn Fn(Vec<String>)>);

impl IncludedFilesCallback {
  pub fn new(callback: impl Fn(Vec<String>) + 'static) -> Self {
    Self(Rc::new(callback))
  }

  pub fn call(&self, files: Vec<String>) {
    (self.0)(files)
  }
}

impl fmt::Debug for IncludedFilesCallback {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("IncludedFilesCallback")
  }
}

impl PartialEq for IncludedFilesCallback {
  fn eq(&self, other: &Self) -> bool {
    Rc::ptr_eq(&self.0, &other.0)
  }
}

/// Per-compilation plugin options.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginOptions {
  pub cache: Option<CacheBehavior>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_size: Option<usize>,
  pub import_react: Option<bool>,
  pub import_sources: Vec<String>,
  #[serde(skip)]
  pub on_included_files: Option<IncludedFilesCallback>,
  pub resolver: Option<ResolverOption>,
  pub process_xcss: Option<bool>,
}

impl Default for PluginOptions {
  fn default() -> Self {
    Self {
      cache: None,
      max_size: None,
      import_react: None,
      import_sources: Vec::new(),
      on_included_files: None,
      resolver: None,
      process_xcss: None,
    }
  }
}

/// Metadata collected alongside the mutated program.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransformMetadata {
  pub included_files: Vec<String>,
  pub style_rules: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub diagnostics: Vec<TransformError>,
}

/// Result of a transform run.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformOutput {
  pub program: Program,
  pub metadata: TransformMetadata,
}

/// File-level context for one compilation.
#[derive(Clone)]
pub struct TransformFile {
  pub source_map: Lrc<SourceMap>,
  pub comments: Vec<Comment>,
  pub filename: Option<String>,
  pub cwd: PathBuf,
  pub root: PathBuf,
  /// Raw source text, consumed only by the textual xcss pre-scan.
  pub source_text: Option<String>,
}

/// Options used to construct [`TransformFile`] instances.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransformFileOptions {
  pub filename: Option<String>,
  pub cwd: Option<PathBuf>,
  pub root: Option<PathBuf>,
  pub source_text: Option<String>,
}

impl TransformFile {
  pub fn new(source_map: Lrc<SourceMap>, comments: Vec<Comment>) -> Self {
    Self::with_options(source_map, comments, TransformFileOptions::default())
  }

  pub fn with_options(
    source_map: Lrc<SourceMap>,
    comments: Vec<Comment>,
    options: TransformFileOptions,
  ) -> Self {
    let TransformFileOptions {
      filename,
      cwd,
      root,
      source_text,
    } = options;

    let cwd_path = cwd
      .or_else(|| env::current_dir().ok())
      .unwrap_or_else(|| PathBuf::from("."));
    let root_path = root.unwrap_or_else(|| cwd_path.clone());

    Self {
      source_map,
      comments,
      filename,
      cwd: cwd_path,
      root: root_path,
      source_text,
    }
  }
}

impl Default for TransformFile {
  fn default() -> Self {
    Self::new(Lrc::new(SourceMap::default()), Vec::new())
  }
}

impl fmt::Debug for TransformFile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TransformFile")
      .field("filename", &self.filename)
      .field("cwd", &self.cwd)
      .field("root", &self.root)
      .field("comments", &self.comments)
      .finish()
  }
}

/// Pragma flags discovered in the file's leading comments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PragmaFlags {
  /// Classic `@jsx` annotation was present.
  pub jsx: bool,
  /// `@jsxImportSource` annotation named the default compiled origin.
  pub jsx_import_source: bool,
}

impl PragmaFlags {
  pub fn any(&self) -> bool {
    self.jsx || self.jsx_import_source
  }
}

/// Local aliases under which the five compiled APIs were imported.
///
/// The presence of this record (even empty) marks the file as using the
/// compiled style API; its absence means the file never imported it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledImports {
  pub css: Vec<String>,
  pub styled: Vec<String>,
  pub keyframes: Vec<String>,
  pub class_names: Vec<String>,
  pub css_map: Vec<String>,
}

impl CompiledImports {
  /// Record a recognized API import under its local alias. Returns `false`
  /// for names outside the fixed API set.
  pub fn record(&mut self, imported: &str, local: &str) -> bool {
    let bucket = match imported {
      "css" => &mut self.css,
      "styled" => &mut self.styled,
      "keyframes" => &mut self.keyframes,
      "ClassNames" => &mut self.class_names,
      "cssMap" => &mut self.css_map,
      _ => return false,
    };

    bucket.push(local.to_string());
    true
  }

  pub fn is_css(&self, local: &str) -> bool {
    self.css.iter().any(|alias| alias == local)
  }

  pub fn is_styled(&self, local: &str) -> bool {
    self.styled.iter().any(|alias| alias == local)
  }

  pub fn is_keyframes(&self, local: &str) -> bool {
    self.keyframes.iter().any(|alias| alias == local)
  }

  pub fn is_css_map(&self, local: &str) -> bool {
    self.css_map.iter().any(|alias| alias == local)
  }

  pub fn has_class_names(&self) -> bool {
    !self.class_names.is_empty()
  }
}

/// A mutation queued during traversal and applied at finalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanupAction {
  /// Delete the node outright.
  Remove,
  /// Substitute a null literal so the surrounding expression position stays
  /// syntactically valid.
  Replace,
}

/// A queued cleanup, addressed by the target node's span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathCleanup {
  pub action: CleanupAction,
  pub span: Span,
}

/// Per-node memo keyed by span. Spans identify nodes without owning them,
/// so entries cannot outlive the tree they describe.
#[derive(Clone, Debug, Default)]
pub struct TransformCache {
  spans: IndexSet<Span>,
}

impl TransformCache {
  pub fn has(&self, span: Span) -> bool {
    self.spans.contains(&span)
  }

  pub fn set(&mut self, span: Span) {
    self.spans.insert(span);
  }

  pub fn clear(&mut self) {
    self.spans.clear();
  }

  pub fn is_empty(&self) -> bool {
    self.spans.is_empty()
  }
}

static GLOBAL_CACHE: OnceCell<SharedCache> = OnceCell::new();

/// Shared cache handle. When the process-wide lifecycle is selected this
/// handle is accessed from every file compiled in the process; the core
/// provides no locking beyond the mutex and assumes the host serializes
/// semantic access.
pub type SharedCache = Arc<Mutex<Cache<Value>>>;

/// Shared pointer to the transform state, allowing the dispatcher and the
/// extraction handlers to observe and mutate one state per file.
pub type SharedTransformState = Rc<RefCell<TransformState>>;

/// Compilation state: exactly one per file, created before traversal begins
/// and consumed after finalization.
pub struct TransformState {
  pub compiled_imports: Option<CompiledImports>,
  pub uses_xcss: bool,
  pub uses_styled: bool,
  pub import_sources: Vec<String>,
  pub pragma: PragmaFlags,
  pub paths_to_cleanup: Vec<PathCleanup>,
  pub runtime_imports: IndexSet<String>,
  pub opts: PluginOptions,
  pub file: TransformFile,
  pub included_files: Vec<String>,
  pub style_rules: IndexSet<String>,
  pub cache: SharedCache,
  pub resolver: Option<ResolvedResolver>,
  pub module_resolver: Option<Resolver>,
  pub transform_cache: TransformCache,
  pub filename: Option<String>,
  pub cwd: PathBuf,
  pub root: PathBuf,
  pub diagnostics: Vec<TransformError>,
}

impl fmt::Debug for TransformState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TransformState")
      .field("compiled_imports", &self.compiled_imports)
      .field("uses_xcss", &self.uses_xcss)
      .field("uses_styled", &self.uses_styled)
      .field("import_sources", &self.import_sources)
      .field("pragma", &self.pragma)
      .field("paths_to_cleanup", &self.paths_to_cleanup)
      .field("runtime_imports", &self.runtime_imports)
      .field("included_files", &self.included_files)
      .field("filename", &self.filename)
      .finish()
  }
}

impl TransformState {
  pub fn new(file: TransformFile, opts: PluginOptions) -> Self {
    let filename = file.filename.clone();
    let cwd = file.cwd.clone();
    let root = file.root.clone();
    let import_sources = Self::resolve_import_sources(&file, &opts);
    let resolver = opts
      .resolver
      .as_ref()
      .map(|option| ResolvedResolver::from_option(option, &root));

    let cache_behavior = opts.cache.clone();
    let cache_enabled = cache_behavior
      .as_ref()
      .map(CacheBehavior::is_enabled)
      .unwrap_or(false);
    let use_global_cache = matches!(cache_behavior, Some(CacheBehavior::Enabled(true)));
    let max_size = opts.max_size;

    let cache_handle = if use_global_cache {
      GLOBAL_CACHE
        .get_or_init(|| Arc::new(Mutex::new(Cache::new())))
        .clone()
    } else {
      Arc::new(Mutex::new(Cache::new()))
    };

    {
      let mut cache = cache_handle
        .lock()
        .expect("cache lock should not be poisoned");
      cache.initialize(CacheOptions {
        cache: Some(cache_enabled),
        max_size,
      });
    }

    Self {
      compiled_imports: None,
      uses_xcss: false,
      uses_styled: false,
      import_sources,
      pragma: PragmaFlags::default(),
      paths_to_cleanup: Vec::new(),
      runtime_imports: IndexSet::new(),
      opts,
      file,
      included_files: Vec::new(),
      style_rules: IndexSet::new(),
      cache: cache_handle,
      resolver,
      module_resolver: None,
      transform_cache: TransformCache::default(),
      filename,
      cwd,
      root,
      diagnostics: Vec::new(),
    }
  }

  pub fn replace_file(&mut self, file: TransformFile) {
    self.filename = file.filename.clone();
    self.cwd = file.cwd.clone();
    self.root = file.root.clone();
    self.file = file;
    self.import_sources = Self::resolve_import_sources(&self.file, &self.opts);
    self.resolver = self
      .opts
      .resolver
      .as_ref()
      .map(|option| ResolvedResolver::from_option(option, &self.root));
    self.module_resolver = None;
  }

  fn resolve_import_sources(file: &TransformFile, opts: &PluginOptions) -> Vec<String> {
    let configured = opts.import_sources.iter().map(|origin| {
      if origin.starts_with('.') {
        normalized_join(&file.root, origin)
          .to_string_lossy()
          .into_owned()
      } else {
        origin.clone()
      }
    });

    std::iter::once(COMPILED_IMPORT.to_string())
      .chain(configured)
      .collect()
  }

  /// Marks the file as using the compiled style API, creating the (possibly
  /// empty) import record if it does not exist yet.
  pub fn ensure_compiled_imports(&mut self) -> &mut CompiledImports {
    self.compiled_imports.get_or_insert_with(Default::default)
  }

  /// Queue a deferred mutation. Duplicate action/span pairs collapse so
  /// each node is cleaned up exactly once.
  pub fn enqueue_cleanup(&mut self, action: CleanupAction, span: Span) {
    if self
      .paths_to_cleanup
      .iter()
      .any(|entry| entry.span == span && entry.action == action)
    {
      return;
    }

    self.paths_to_cleanup.push(PathCleanup { action, span });
  }

  /// Request a named runtime helper import; duplicates are merged while
  /// preserving first-request order.
  pub fn request_runtime_import(&mut self, name: impl Into<String>) {
    self.runtime_imports.insert(name.into());
  }

  pub fn record_included_file(&mut self, path: impl Into<String>) {
    self.included_files.push(path.into());
  }

  /// Resolve a composed file's specifier against the importing file's
  /// directory. Resolution failure is fatal for the current file.
  pub fn resolve_included_file(&mut self, specifier: &str) -> Result<PathBuf, TransformError> {
    let base_dir = self
      .filename
      .as_deref()
      .map(|filename| {
        Path::new(filename)
          .parent()
          .map(Path::to_path_buf)
          .unwrap_or_else(|| self.root.clone())
      })
      .unwrap_or_else(|| self.root.clone());

    let resolver = self
      .module_resolver
      .get_or_insert_with(|| Resolver::new(ResolveOptions::default()));

    let resolution = resolver
      .resolve(&base_dir, specifier)
      .map_err(|error| TransformError::new(format!("failed to resolve {specifier}: {error}")))?;

    let resolved = resolution.path().to_path_buf();
    self.record_included_file(resolved.to_string_lossy().into_owned());
    Ok(resolved)
  }
}
