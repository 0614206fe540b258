//! # Image Acquisition
//!
//! [`ensure_image`] turns an image reference into a populated local
//! image directory and returns the image id. A reference that is already
//! cached (reference cache hit plus image directory present) resolves
//! with zero network calls; otherwise the manifest is resolved and every
//! layer goes through the pipeline below, strictly one layer at a time:
//!
//! ```text
//! download blob -> decompress (gzip/zstd) -> extract (tar) -> next layer
//! ```
//!
//! Decompression and extraction shell out to the host's `gzip`, `zstd`,
//! and `tar`. Each stage deletes its input on success, so a finished
//! layer leaves only `<digest>/rootfs` behind.

use crate::config::Config;
use crate::constants::validate_image_ref;
use crate::error::{Error, Result};
use crate::manifest::{classify_layer, LayerRef};
use crate::platform::Platform;
use crate::registry::{canonical_repository, parse_image, RegistryClient};
use crate::storage::ImageStore;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

/// Ensures the referenced image is present in the local store and
/// returns its image id.
///
/// On a cache hit no network connection is made. On a miss the manifest
/// is resolved for the host platform, all layers are downloaded and
/// extracted, and the reference cache and layer order are recorded for
/// the next run.
pub async fn ensure_image(config: &Config, image_ref: &str) -> Result<String> {
    validate_image_ref(image_ref).map_err(|reason| Error::InvalidImageReference {
        reference: image_ref.to_string(),
        reason: reason.to_string(),
    })?;

    let store = ImageStore::new(config);

    if let Some(image_id) = store.lookup_ref(image_ref) {
        if store.is_cached(&image_id) {
            info!(reference = image_ref, image_id = %image_id, "image cached");
            return Ok(image_id);
        }
    }

    let (name, tag) = parse_image(image_ref);
    let repository = canonical_repository(&name);
    let host = Platform::detect();

    info!(repository = %repository, tag = %tag, platform = %host, "pulling image");

    let mut client = RegistryClient::new(config, &repository);
    let manifest = client.resolve_manifest(&tag, &host).await?;
    let image_id = manifest.image_id()?;

    if store.is_cached(&image_id) {
        // Pulled before under another reference.
        store.record_ref(image_ref, &image_id)?;
        return Ok(image_id);
    }

    let layers = manifest.layer_refs();
    download_layers(&mut client, &store, &image_id, &layers).await?;

    let digests: Vec<String> = layers.iter().map(|l| l.digest.clone()).collect();
    store.record_layer_order(&image_id, &digests)?;
    store.record_ref(image_ref, &image_id)?;

    info!(image_id = %image_id, layers = layers.len(), "image ready");
    Ok(image_id)
}

/// Runs the download/decompress/extract pipeline for each layer in
/// manifest order. Layers are processed sequentially; a failure on any
/// layer aborts the pull.
async fn download_layers(
    client: &mut RegistryClient,
    store: &ImageStore,
    image_id: &str,
    layers: &[LayerRef],
) -> Result<()> {
    let image_dir = store.image_dir(image_id);
    tokio::fs::create_dir_all(&image_dir)
        .await
        .map_err(|e| Error::fs(&image_dir, e))?;

    for layer in layers {
        let archive = classify_layer(&layer.digest, &layer.media_type);
        if archive.file_type != "tar" {
            return Err(Error::UnsupportedFormat(format!(
                "layer archive type '{}'",
                archive.file_type
            )));
        }

        let packed = image_dir.join(&archive.filename);
        debug!(digest = %layer.digest, file = %archive.filename, "downloading layer");
        client
            .download_blob(&layer.digest, &layer.media_type, &packed)
            .await?;

        let tarball = decompress_layer(&layer.digest, &packed, &archive.compressor).await?;

        let rootfs = store.layer_rootfs(image_id, &layer.digest);
        extract_layer(&layer.digest, &tarball, &rootfs).await?;
    }

    Ok(())
}

/// Decompresses a downloaded blob in place, returning the path of the
/// resulting tarball. The compressed file is removed by the external
/// tool on success; an empty compressor is a no-op.
async fn decompress_layer(
    digest: &str,
    packed: &Path,
    compressor: &str,
) -> Result<std::path::PathBuf> {
    let (tool, args, strip_ext): (&str, &[&str], &str) = match compressor {
        "" => return Ok(packed.to_path_buf()),
        "gzip" => ("gzip", &["-d", "-f"], ".gz"),
        "zstd" => ("zstd", &["-d", "--rm", "-f"], ".zst"),
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "layer compressor '{}'",
                other
            )))
        }
    };

    run_tool(digest, tool, args, packed).await?;

    let name = packed.to_string_lossy();
    let tarball = std::path::PathBuf::from(name.trim_end_matches(strip_ext));
    debug!(digest, tarball = %tarball.display(), "decompressed layer");
    Ok(tarball)
}

/// Extracts a layer tarball into its rootfs directory, then removes the
/// tarball.
async fn extract_layer(digest: &str, tarball: &Path, rootfs: &Path) -> Result<()> {
    tokio::fs::create_dir_all(rootfs)
        .await
        .map_err(|e| Error::fs(rootfs, e))?;

    let output = Command::new("tar")
        .arg("-xf")
        .arg(tarball)
        .arg("-C")
        .arg(rootfs)
        .output()
        .await
        .map_err(|e| Error::LayerUnpack {
            digest: digest.to_string(),
            reason: format!("tar: {}", e),
        })?;

    if !output.status.success() {
        return Err(Error::LayerUnpack {
            digest: digest.to_string(),
            reason: format!(
                "tar exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    tokio::fs::remove_file(tarball)
        .await
        .map_err(|e| Error::fs(tarball, e))?;
    debug!(digest, rootfs = %rootfs.display(), "extracted layer");
    Ok(())
}

/// Runs an external decompression tool against one file.
async fn run_tool(digest: &str, tool: &str, args: &[&str], file: &Path) -> Result<()> {
    let output = Command::new(tool)
        .args(args)
        .arg(file)
        .output()
        .await
        .map_err(|e| Error::LayerUnpack {
            digest: digest.to_string(),
            reason: format!("{}: {}", tool, e),
        })?;

    if !output.status.success() {
        return Err(Error::LayerUnpack {
            digest: digest.to_string(),
            reason: format!(
                "{} exited with {}: {}",
                tool,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(())
}
