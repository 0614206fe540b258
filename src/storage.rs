//! # Image Store
//!
//! Content-addressed layout of pulled images under `<root>/image`:
//!
//! ```text
//! image/
//!   .refs/<sanitized-ref>          reference -> image id
//!   <imageId>/
//!     layers.json                  ordered layer digests
//!     <layerDigest>/rootfs/        extracted layer filesystem
//! ```
//!
//! Cache presence is the existence of `image/<imageId>` and nothing
//! more: no digest revalidation, no integrity checks, no eviction. A
//! partially-pulled image whose directory exists is treated as cached.
//!
//! The reference cache and `layers.json` are written at pull time so a
//! later run of the same reference resolves the image id and the layer
//! order without touching the network.

use crate::config::Config;
use crate::constants::{LAYER_ORDER_FILE, REF_CACHE_SUBDIR, ROOTFS_DIR};
use crate::error::{Error, Result};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Handle on the image cache rooted at `<root>/image`.
#[derive(Debug, Clone)]
pub struct ImageStore {
    image_dir: PathBuf,
}

impl ImageStore {
    /// Creates a store for the configured storage root.
    pub fn new(config: &Config) -> Self {
        Self {
            image_dir: config.image_dir(),
        }
    }

    /// Returns the directory holding one image's layers.
    pub fn image_dir(&self, image_id: &str) -> PathBuf {
        self.image_dir.join(image_id)
    }

    /// Returns true if the image directory exists. Existence is the
    /// entire cache contract.
    pub fn is_cached(&self, image_id: &str) -> bool {
        self.image_dir(image_id).is_dir()
    }

    /// Returns the extracted rootfs directory of one layer.
    pub fn layer_rootfs(&self, image_id: &str, digest: &str) -> PathBuf {
        self.image_dir(image_id).join(digest).join(ROOTFS_DIR)
    }

    /// Records the manifest-ordered layer digests for an image.
    pub fn record_layer_order(&self, image_id: &str, digests: &[String]) -> Result<()> {
        let path = self.image_dir(image_id).join(LAYER_ORDER_FILE);
        let body = serde_json::to_vec_pretty(digests).map_err(|e| Error::Decode {
            what: "layer order".to_string(),
            reason: e.to_string(),
        })?;
        fs::write(&path, body).map_err(|e| Error::fs(&path, e))?;
        Ok(())
    }

    /// Reads back the recorded layer order, if present.
    pub fn read_layer_order(&self, image_id: &str) -> Option<Vec<String>> {
        let path = self.image_dir(image_id).join(LAYER_ORDER_FILE);
        let body = fs::read(&path).ok()?;
        serde_json::from_slice(&body).ok()
    }

    /// Returns the layer rootfs directories of an image in application
    /// order: the recorded manifest order when available, otherwise the
    /// layer directories sorted by name.
    pub fn layer_dirs_in_order(&self, image_id: &str) -> Result<Vec<PathBuf>> {
        if let Some(digests) = self.read_layer_order(image_id) {
            return Ok(digests
                .iter()
                .map(|d| self.layer_rootfs(image_id, d))
                .collect());
        }

        let image_dir = self.image_dir(image_id);
        let entries = fs::read_dir(&image_dir).map_err(|e| Error::fs(&image_dir, e))?;

        let mut layers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::fs(&image_dir, e))?;
            let rootfs = entry.path().join(ROOTFS_DIR);
            if rootfs.is_dir() {
                layers.push(rootfs);
            }
        }
        layers.sort();
        Ok(layers)
    }

    /// Looks up the cached image id for a reference.
    pub fn lookup_ref(&self, image_ref: &str) -> Option<String> {
        let path = self.ref_path(image_ref);
        let id = fs::read_to_string(path).ok()?;
        let id = id.trim().to_string();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    /// Records the reference -> image id mapping.
    pub fn record_ref(&self, image_ref: &str, image_id: &str) -> Result<()> {
        let dir = self.image_dir.join(REF_CACHE_SUBDIR);
        fs::create_dir_all(&dir).map_err(|e| Error::fs(&dir, e))?;
        let path = self.ref_path(image_ref);
        fs::write(&path, image_id).map_err(|e| Error::fs(&path, e))?;
        debug!(reference = image_ref, image_id, "recorded reference");
        Ok(())
    }

    /// Filesystem-safe path for one reference cache entry. `:` and `/`
    /// in the reference become `-`.
    fn ref_path(&self, image_ref: &str) -> PathBuf {
        let key: String = image_ref
            .chars()
            .map(|c| if c == ':' || c == '/' { '-' } else { c })
            .collect();
        self.image_dir.join(REF_CACHE_SUBDIR).join(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ImageStore {
        let config = Config::with_root(dir.path().to_path_buf());
        ImageStore::new(&config)
    }

    #[test]
    fn test_cache_presence_is_directory_existence() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(!store.is_cached("sha256:img"));
        fs::create_dir_all(store.image_dir("sha256:img")).unwrap();
        assert!(store.is_cached("sha256:img"));
    }

    #[test]
    fn test_layer_order_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.image_dir("sha256:img")).unwrap();

        let digests = vec!["sha256:b".to_string(), "sha256:a".to_string()];
        store.record_layer_order("sha256:img", &digests).unwrap();

        let dirs = store.layer_dirs_in_order("sha256:img").unwrap();
        assert_eq!(
            dirs,
            vec![
                store.layer_rootfs("sha256:img", "sha256:b"),
                store.layer_rootfs("sha256:img", "sha256:a"),
            ]
        );
    }

    #[test]
    fn test_layer_order_fallback_is_sorted_readdir() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        fs::create_dir_all(store.layer_rootfs("sha256:img", "sha256:zz")).unwrap();
        fs::create_dir_all(store.layer_rootfs("sha256:img", "sha256:aa")).unwrap();

        let dirs = store.layer_dirs_in_order("sha256:img").unwrap();
        assert_eq!(
            dirs,
            vec![
                store.layer_rootfs("sha256:img", "sha256:aa"),
                store.layer_rootfs("sha256:img", "sha256:zz"),
            ]
        );
    }

    #[test]
    fn test_ref_cache_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.lookup_ref("ubuntu:20.04"), None);
        store.record_ref("ubuntu:20.04", "sha256:img").unwrap();
        assert_eq!(
            store.lookup_ref("ubuntu:20.04"),
            Some("sha256:img".to_string())
        );

        // ':' and '/' are sanitized into the same flat namespace.
        let key = dir.path().join("image/.refs/ubuntu-20.04");
        assert!(key.is_file());
    }
}
