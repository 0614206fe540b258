//! # Manifest Data Model and Dispatch
//!
//! Wire formats for the three manifest document kinds a registry can
//! return (legacy schema 1, schema 2 / OCI manifest, and the
//! multi-platform OCI index), plus the logic that depends only on the
//! documents themselves:
//!
//! - [`decode_document`]: Content-Type driven dispatch into a closed
//!   tagged union. The variant is fixed at decode time; no type probing
//!   happens at use sites.
//! - [`select_platform_entry`]: first index entry matching the host
//!   OS + architecture (variant ignored).
//! - [`Manifest::image_id`]: `config.digest` for schema 2,
//!   `history[0].v1Compatibility → id` for schema 1.
//! - [`classify_layer`]: `(file type, compressor, filename)` derived from
//!   a layer's media type.
//!
//! ## Recognized Content Types
//!
//! | Content-Type                                              | Variant |
//! |-----------------------------------------------------------|---------|
//! | `application/vnd.docker.distribution.manifest.v1+prettyjws` | V1    |
//! | `application/vnd.docker.distribution.manifest.v2+json`      | V2    |
//! | `application/vnd.oci.image.manifest.v1+json`                 | V2    |
//! | `application/vnd.oci.image.index.v1+json`                    | Index |
//!
//! Any other content type is a fatal [`Error::UnsupportedFormat`].

use crate::constants::{
    MANIFEST_V1_MEDIA_TYPE, MANIFEST_V2_MEDIA_TYPE, OCI_INDEX_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE,
    V1_LAYER_MEDIA_TYPE,
};
use crate::error::{Error, Result};
use crate::platform::Platform;
use serde::Deserialize;

// =============================================================================
// Wire Types
// =============================================================================

/// Content descriptor: digest-addressed blob reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    pub digest: String,
}

/// Platform entry inside an index manifest list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestPlatform {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub variant: String,
}

/// One member of an index's ordered manifest list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    pub digest: String,
    #[serde(default)]
    pub platform: ManifestPlatform,
}

/// Multi-platform image index (manifest of manifests).
#[derive(Debug, Clone, Deserialize)]
pub struct ImageIndex {
    #[serde(default)]
    pub manifests: Vec<IndexEntry>,
}

/// Layer reference inside a schema 1 manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLayer {
    pub blob_sum: String,
}

/// History entry inside a schema 1 manifest. The `v1Compatibility`
/// payload is an embedded JSON string.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V1History {
    pub v1_compatibility: String,
}

/// Legacy schema 1 signed manifest. Signatures are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestV1 {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub fs_layers: Vec<FsLayer>,
    #[serde(default)]
    pub history: Vec<V1History>,
}

/// Decoded `v1Compatibility` payload. Only the image id is used.
#[derive(Debug, Clone, Deserialize)]
struct V1Metadata {
    id: String,
}

/// Schema 2 / OCI image manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestV2 {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: String,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

// =============================================================================
// Dispatch
// =============================================================================

/// Any manifest document a registry can return, discriminated at decode
/// time by the response Content-Type.
#[derive(Debug, Clone)]
pub enum ManifestDocument {
    Index(ImageIndex),
    V1(ManifestV1),
    V2(ManifestV2),
}

/// A resolved, platform-specific manifest (an index never reaches here).
#[derive(Debug, Clone)]
pub enum Manifest {
    V1(ManifestV1),
    V2(ManifestV2),
}

/// One layer to fetch: digest plus the media type that drives
/// classification. Normalized across schema versions.
#[derive(Debug, Clone)]
pub struct LayerRef {
    pub digest: String,
    pub media_type: String,
}

/// Decodes a manifest response body according to its Content-Type.
pub fn decode_document(content_type: &str, body: &[u8]) -> Result<ManifestDocument> {
    let decode_err = |what: &str| {
        let what = what.to_string();
        move |e: serde_json::Error| Error::Decode {
            what,
            reason: e.to_string(),
        }
    };

    match content_type {
        MANIFEST_V1_MEDIA_TYPE => {
            let manifest: ManifestV1 =
                serde_json::from_slice(body).map_err(decode_err("v1 manifest"))?;
            Ok(ManifestDocument::V1(manifest))
        }
        MANIFEST_V2_MEDIA_TYPE | OCI_MANIFEST_MEDIA_TYPE => {
            let manifest: ManifestV2 =
                serde_json::from_slice(body).map_err(decode_err("v2 manifest"))?;
            Ok(ManifestDocument::V2(manifest))
        }
        OCI_INDEX_MEDIA_TYPE => {
            let index: ImageIndex =
                serde_json::from_slice(body).map_err(decode_err("image index"))?;
            Ok(ManifestDocument::Index(index))
        }
        other => Err(Error::UnsupportedFormat(format!(
            "manifest content type '{}'",
            other
        ))),
    }
}

/// Selects the first index entry matching the host platform exactly on
/// OS and architecture. The variant field is ignored.
pub fn select_platform_entry<'a>(
    index: &'a ImageIndex,
    host: &Platform,
) -> Result<&'a IndexEntry> {
    index
        .manifests
        .iter()
        .find(|m| m.platform.os == host.os_str() && m.platform.architecture == host.arch_str())
        .ok_or_else(|| Error::PlatformNotFound {
            os: host.os_str().to_string(),
            arch: host.arch_str().to_string(),
        })
}

impl Manifest {
    /// Extracts the resolved image id.
    ///
    /// Schema 2: the config digest. Schema 1: the `id` field of the
    /// first history entry's embedded JSON payload.
    pub fn image_id(&self) -> Result<String> {
        match self {
            Manifest::V2(m) => Ok(m.config.digest.clone()),
            Manifest::V1(m) => {
                let compat = m.history.first().ok_or_else(|| Error::Decode {
                    what: "v1 manifest history".to_string(),
                    reason: "empty history".to_string(),
                })?;
                let metadata: V1Metadata =
                    serde_json::from_str(&compat.v1_compatibility).map_err(|e| Error::Decode {
                        what: "v1 compatibility payload".to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(metadata.id)
            }
        }
    }

    /// Returns the layers to fetch, in document order.
    ///
    /// Schema 1 `fsLayers` are taken exactly as provided, with the fixed
    /// legacy layer media type; schema 2 layers carry their own.
    pub fn layer_refs(&self) -> Vec<LayerRef> {
        match self {
            Manifest::V1(m) => m
                .fs_layers
                .iter()
                .map(|l| LayerRef {
                    digest: l.blob_sum.clone(),
                    media_type: V1_LAYER_MEDIA_TYPE.to_string(),
                })
                .collect(),
            Manifest::V2(m) => m
                .layers
                .iter()
                .map(|l| LayerRef {
                    digest: l.digest.clone(),
                    media_type: l.media_type.clone(),
                })
                .collect(),
        }
    }
}

// =============================================================================
// Layer Classification
// =============================================================================

/// How a downloaded layer blob is stored and unpacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerArchive {
    /// Archive format, e.g. `tar`.
    pub file_type: String,
    /// Compression codec, e.g. `gzip` or `zstd`; empty when uncompressed.
    pub compressor: String,
    /// On-disk name of the raw blob, e.g. `<digest>.tar.gz`.
    pub filename: String,
}

/// Derives `(file type, compressor, filename)` from a layer media type.
///
/// The legacy schema 1 type is fixed to a gzip-compressed tar. For every
/// other type, the file type is the suffix of the media type's last
/// dot-segment before any `+`, and the compressor (if present) is the
/// segment after `+`:
///
/// ```text
/// application/vnd.oci.image.layer.v1.tar+gzip  →  ("tar", "gzip")
/// application/vnd.oci.image.layer.v1.tar       →  ("tar", "")
/// ```
pub fn classify_layer(digest: &str, media_type: &str) -> LayerArchive {
    if media_type == V1_LAYER_MEDIA_TYPE {
        return LayerArchive {
            file_type: "tar".to_string(),
            compressor: "gzip".to_string(),
            filename: format!("{}.tar.gz", digest),
        };
    }

    let (base, compressor) = match media_type.split_once('+') {
        Some((base, comp)) => (base, comp.to_string()),
        None => (media_type, String::new()),
    };
    let file_type = base.rsplit('.').next().unwrap_or(base).to_string();
    let filename = packed_filename(digest, &file_type, &compressor);

    LayerArchive {
        file_type,
        compressor,
        filename,
    }
}

/// Builds the raw blob filename from the file type and compressor.
fn packed_filename(digest: &str, file_type: &str, compressor: &str) -> String {
    let archive_ext = match file_type {
        "tar" => "tar",
        other => other,
    };

    let codec_ext = match compressor {
        "gzip" => "gz",
        "zstd" => "zst",
        _ => "",
    };

    if codec_ext.is_empty() {
        format!("{}.{}", digest, archive_ext)
    } else {
        format!("{}.{}.{}", digest, archive_ext, codec_ext)
    }
}
