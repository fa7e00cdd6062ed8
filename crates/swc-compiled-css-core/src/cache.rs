use std::fmt::Debug;

use indexmap::IndexMap;

use crate::hash::hash;

/// Options accepted by [`Cache::initialize`]. Unset fields fall back to the
/// defaults used by the Babel plugin.
#[derive(Clone, Debug, Default)]
pub struct CacheOptions {
  pub cache: Option<bool>,
  pub max_size: Option<usize>,
}

#[derive(Clone, Copy, Debug)]
struct CacheConfig {
  cache: bool,
  max_size: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      cache: true,
      max_size: 500,
    }
  }
}

/// Keyed LRU store consumed by the extraction handlers to memoize expensive
/// work such as dependency resolution and repeated style evaluation.
///
/// Must be initialized with the compilation options exactly once before the
/// first load. The core only selects the lifecycle (process-wide singleton
/// vs per-file instance); the semantics of cached values belong to the
/// handlers.
#[derive(Clone, Debug)]
pub struct Cache<T: Clone + Debug> {
  options: CacheConfig,
  entries: IndexMap<String, T>,
}

impl<T: Clone + Debug> Default for Cache<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Clone + Debug> Cache<T> {
  pub fn new() -> Self {
    Self {
      options: CacheConfig::default(),
      entries: IndexMap::new(),
    }
  }

  /// Compute the canonical cache key for a key/namespace pair.
  pub fn unique_key(cache_key: &str, namespace: Option<&str>) -> String {
    let combined = match namespace {
      Some(ns) => format!("{ns}----{cache_key}"),
      None => cache_key.to_string(),
    };

    hash(&combined, 0)
  }

  /// Apply the compilation options. Required once per compilation before
  /// any [`Cache::load`] call.
  pub fn initialize(&mut self, options: CacheOptions) {
    let defaults = CacheConfig::default();
    self.options = CacheConfig {
      cache: options.cache.unwrap_or(defaults.cache),
      max_size: options.max_size.unwrap_or(defaults.max_size),
    };
  }

  fn maybe_evict_lru(&mut self) {
    if self.entries.len() >= self.options.max_size {
      self.entries.shift_remove_index(0);
    }
  }

  /// Load a value, computing and storing it on a miss. A hit refreshes the
  /// entry's recency.
  pub fn load<F>(&mut self, namespace: Option<&str>, cache_key: &str, value: F) -> T
  where
    F: FnOnce() -> T,
  {
    if !self.options.cache {
      return value();
    }

    let unique_key = Self::unique_key(cache_key, namespace);

    if let Some(existing) = self.entries.shift_remove(unique_key.as_str()) {
      let result = existing.clone();
      self.entries.insert(unique_key, existing);
      return result;
    }

    self.maybe_evict_lru();

    let computed = value();
    self.entries.insert(unique_key, computed.clone());
    computed
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Ordered cache keys, oldest first. Primarily used in tests.
  pub fn keys(&self) -> Vec<String> {
    self.entries.keys().cloned().collect()
  }
}
