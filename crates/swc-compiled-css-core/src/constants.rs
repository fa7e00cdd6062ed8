//! Constants shared by the transform core.

/// Name stamped into the provenance comment of transformed files.
pub const PACKAGE_NAME: &str = "@compiled/babel-plugin";

/// Default module imported when enabling compiled transforms.
pub const COMPILED_IMPORT: &str = "@compiled/react";

/// Module that provides the runtime helpers referenced by generated output.
pub const COMPILED_RUNTIME_MODULE: &str = "@compiled/react/runtime";

/// The five API names the import tracker recognizes on compiled origins.
pub const COMPILED_API_NAMES: &[&str] = &["css", "styled", "keyframes", "ClassNames", "cssMap"];

/// Environment variable that overrides the packaged version in the
/// provenance comment, keeping snapshot output deterministic in tests.
pub const VERSION_OVERRIDE_ENV: &str = "TEST_PKG_VERSION";
