//! Runtime configuration.
//!
//! A single immutable [`Config`] value carries the storage root and the
//! registry endpoints through every component. There is no process-wide
//! path state: tests and embedders construct a `Config` pointing wherever
//! they like.

use crate::constants::{
    DEFAULT_AUTH_BASE, DEFAULT_REGISTRY_BASE, DEFAULT_STORAGE_ROOT, IMAGE_SUBDIR, SANDBOX_SUBDIR,
};
use std::path::{Path, PathBuf};

/// Immutable runtime configuration.
///
/// Derived paths:
///
/// | Accessor        | Path                      |
/// |-----------------|---------------------------|
/// | `image_dir()`   | `<root>/image`            |
/// | `sandbox_dir()` | `<root>/sandbox`          |
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the on-disk store (`image` and `sandbox` subtrees).
    storage_root: PathBuf,
    /// Token service base URL.
    auth_base: String,
    /// Registry v2 API base URL.
    registry_base: String,
}

impl Config {
    /// Creates a configuration with the default storage root and
    /// Docker Hub endpoints.
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(DEFAULT_STORAGE_ROOT))
    }

    /// Creates a configuration rooted at a custom storage directory.
    pub fn with_root(storage_root: PathBuf) -> Self {
        Self {
            storage_root,
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            registry_base: DEFAULT_REGISTRY_BASE.to_string(),
        }
    }

    /// Overrides the registry endpoints. Used by tests and alternative
    /// registries.
    pub fn with_endpoints(mut self, auth_base: &str, registry_base: &str) -> Self {
        self.auth_base = auth_base.trim_end_matches('/').to_string();
        self.registry_base = registry_base.trim_end_matches('/').to_string();
        self
    }

    /// Returns the storage root.
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Returns the image cache directory (`<root>/image`).
    pub fn image_dir(&self) -> PathBuf {
        self.storage_root.join(IMAGE_SUBDIR)
    }

    /// Returns the sandbox directory (`<root>/sandbox`).
    pub fn sandbox_dir(&self) -> PathBuf {
        self.storage_root.join(SANDBOX_SUBDIR)
    }

    /// Returns the token service base URL.
    pub fn auth_base(&self) -> &str {
        &self.auth_base
    }

    /// Returns the registry v2 API base URL.
    pub fn registry_base(&self) -> &str {
        &self.registry_base
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
