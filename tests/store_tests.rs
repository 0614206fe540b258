//! Tests for the on-disk image store: cache presence, the reference
//! cache, and layer ordering.

use boxrun::{Config, ImageStore};
use std::fs;
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> (Config, ImageStore) {
    let config = Config::with_root(dir.path().to_path_buf());
    let store = ImageStore::new(&config);
    (config, store)
}

// =============================================================================
// Cache Presence
// =============================================================================

#[test]
fn test_missing_image_is_not_cached() {
    let dir = TempDir::new().unwrap();
    let (_, store) = store_in(&dir);
    assert!(!store.is_cached("sha256:missing"));
}

#[test]
fn test_empty_image_directory_counts_as_cached() {
    // Presence is directory existence, nothing else.
    let dir = TempDir::new().unwrap();
    let (_, store) = store_in(&dir);

    fs::create_dir_all(store.image_dir("sha256:img")).unwrap();
    assert!(store.is_cached("sha256:img"));
}

#[test]
fn test_layer_rootfs_layout() {
    let dir = TempDir::new().unwrap();
    let (_, store) = store_in(&dir);

    let rootfs = store.layer_rootfs("sha256:img", "sha256:layer");
    assert_eq!(
        rootfs,
        dir.path().join("image/sha256:img/sha256:layer/rootfs")
    );
}

// =============================================================================
// Reference Cache
// =============================================================================

#[test]
fn test_ref_cache_miss_then_hit() {
    let dir = TempDir::new().unwrap();
    let (_, store) = store_in(&dir);

    assert_eq!(store.lookup_ref("busybox:latest"), None);
    store.record_ref("busybox:latest", "sha256:img").unwrap();
    assert_eq!(
        store.lookup_ref("busybox:latest"),
        Some("sha256:img".to_string())
    );
}

#[test]
fn test_ref_cache_distinct_tags_distinct_entries() {
    let dir = TempDir::new().unwrap();
    let (_, store) = store_in(&dir);

    store.record_ref("ubuntu:20.04", "sha256:focal").unwrap();
    store.record_ref("ubuntu:22.04", "sha256:jammy").unwrap();

    assert_eq!(store.lookup_ref("ubuntu:20.04"), Some("sha256:focal".to_string()));
    assert_eq!(store.lookup_ref("ubuntu:22.04"), Some("sha256:jammy".to_string()));
}

#[test]
fn test_ref_cache_sanitizes_separators() {
    let dir = TempDir::new().unwrap();
    let (_, store) = store_in(&dir);

    store.record_ref("library/busybox:latest", "sha256:img").unwrap();
    assert!(dir.path().join("image/.refs/library-busybox-latest").is_file());
}

// =============================================================================
// Layer Ordering
// =============================================================================

#[test]
fn test_recorded_order_beats_directory_order() {
    let dir = TempDir::new().unwrap();
    let (_, store) = store_in(&dir);

    fs::create_dir_all(store.layer_rootfs("sha256:img", "sha256:aa")).unwrap();
    fs::create_dir_all(store.layer_rootfs("sha256:img", "sha256:bb")).unwrap();

    // Manifest order reversed relative to lexicographic order.
    store
        .record_layer_order(
            "sha256:img",
            &["sha256:bb".to_string(), "sha256:aa".to_string()],
        )
        .unwrap();

    let dirs = store.layer_dirs_in_order("sha256:img").unwrap();
    assert_eq!(
        dirs,
        vec![
            store.layer_rootfs("sha256:img", "sha256:bb"),
            store.layer_rootfs("sha256:img", "sha256:aa"),
        ]
    );
}

#[test]
fn test_order_file_absent_falls_back_to_sorted_layers() {
    let dir = TempDir::new().unwrap();
    let (_, store) = store_in(&dir);

    fs::create_dir_all(store.layer_rootfs("sha256:img", "sha256:bb")).unwrap();
    fs::create_dir_all(store.layer_rootfs("sha256:img", "sha256:aa")).unwrap();
    // A stray file in the image directory is not a layer.
    fs::write(dir.path().join("image/sha256:img/stray"), b"x").unwrap();

    let dirs = store.layer_dirs_in_order("sha256:img").unwrap();
    assert_eq!(
        dirs,
        vec![
            store.layer_rootfs("sha256:img", "sha256:aa"),
            store.layer_rootfs("sha256:img", "sha256:bb"),
        ]
    );
}
