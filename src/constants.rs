//! # Runtime Constants
//!
//! Registry endpoints, OCI/Docker media types, and storage layout names
//! used throughout the crate. These are the **single source of truth**
//! for wire-protocol strings and on-disk naming.
//!
//! ## Cross-References
//!
//! - [`crate::registry`]: Uses endpoints and accept headers
//! - [`crate::manifest`]: Uses media types for dispatch and classification
//! - [`crate::storage`]: Uses subdirectory and file names

// =============================================================================
// Registry Endpoints
// =============================================================================
//
// Docker Hub defaults. Both are overridable through `Config` so tests and
// alternative registries never depend on process-wide state.
// =============================================================================

/// Default token service base URL (anonymous pull tokens).
pub const DEFAULT_AUTH_BASE: &str = "https://auth.docker.io";

/// Default registry API base URL (manifests and blobs, v2 API).
pub const DEFAULT_REGISTRY_BASE: &str = "https://registry.hub.docker.com";

/// Token service name sent in the token request query string.
pub const AUTH_SERVICE: &str = "registry.docker.io";

// =============================================================================
// Storage Layout
// =============================================================================

/// Default storage root. Holds the `image` and `sandbox` subtrees.
pub const DEFAULT_STORAGE_ROOT: &str = "/var/lib/boxrun";

/// Subdirectory for cached images: `image/<imageId>/<layerDigest>/rootfs`.
pub const IMAGE_SUBDIR: &str = "image";

/// Subdirectory for ephemeral sandboxes: `sandbox/<randomId>/rootfs`.
pub const SANDBOX_SUBDIR: &str = "sandbox";

/// Subdirectory (under `image/`) for the reference → image-id cache.
pub const REF_CACHE_SUBDIR: &str = ".refs";

/// Per-image file recording the ordered layer digests of the last pull.
pub const LAYER_ORDER_FILE: &str = "layers.json";

/// Name of the extracted filesystem directory inside each layer.
pub const ROOTFS_DIR: &str = "rootfs";

// =============================================================================
// Media Types
// =============================================================================
//
// The four manifest content types the resolver recognizes, plus the legacy
// layer type. Anything else on the wire is an unsupported-format error.
//
// Reference: <https://github.com/opencontainers/image-spec/blob/main/media-types.md>
// =============================================================================

/// Docker schema 1 signed manifest (legacy).
pub const MANIFEST_V1_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";

/// Docker schema 2 manifest.
pub const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// OCI image manifest (single platform).
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// OCI image index (multi-platform manifest list).
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// Legacy schema 1 layer media type. Always a gzip-compressed tar.
pub const V1_LAYER_MEDIA_TYPE: &str =
    "application/vnd.docker.container.image.rootfs.diff.tar.gzip";

// =============================================================================
// Validation
// =============================================================================

/// Maximum image reference length in bytes.
///
/// Prevents pathological references from reaching the registry or the
/// filesystem layer.
pub const MAX_IMAGE_REF_LEN: usize = 512;

/// Valid characters for image references.
///
/// Includes: `a-z`, `A-Z`, `0-9`, `-`, `_`, `.`, `/`, `:`, `@`
pub const IMAGE_REF_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_./:@";

/// Validates an image reference before it is used in URLs or paths.
///
/// # Returns
///
/// `Ok(())` if valid, `Err(reason)` with a description of the failure.
#[inline]
pub fn validate_image_ref(reference: &str) -> std::result::Result<(), &'static str> {
    if reference.is_empty() {
        return Err("image reference cannot be empty");
    }
    if reference.len() > MAX_IMAGE_REF_LEN {
        return Err("image reference exceeds maximum length");
    }
    if !reference.chars().all(|c| IMAGE_REF_VALID_CHARS.contains(c)) {
        return Err("image reference contains invalid characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_image_ref() {
        assert!(validate_image_ref("ubuntu:20.04").is_ok());
        assert!(validate_image_ref("library/busybox").is_ok());
        assert!(validate_image_ref("").is_err());
        assert!(validate_image_ref("bad image").is_err());
        assert!(validate_image_ref(&"a".repeat(MAX_IMAGE_REF_LEN + 1)).is_err());
    }
}
