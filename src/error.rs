//! Error types for the container runtime.

use std::path::PathBuf;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while pulling an image or running a sandbox.
///
/// Every variant is fatal to the current pull or run; nothing is retried.
/// A sandboxed command that starts and exits non-zero is *not* an error:
/// its exit code is propagated by [`crate::sandbox::run_in_sandbox`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Registry Errors
    // =========================================================================
    /// Transport failure or non-2xx status on a token/manifest/blob request.
    #[error("registry request failed ({context}): {reason}")]
    Network { context: String, reason: String },

    /// Malformed JSON in a token, manifest, or embedded v1 payload.
    #[error("failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    /// Unrecognized manifest content type, archive type, or compressor.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A multi-platform index had no entry for the host platform.
    #[error("no manifest found for {os}/{arch}")]
    PlatformNotFound { os: String, arch: String },

    /// Failed to parse an image reference.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    // =========================================================================
    // Layer Pipeline Errors
    // =========================================================================
    /// External decompression or extraction tool failed on a layer.
    #[error("failed to unpack layer {digest}: {reason}")]
    LayerUnpack { digest: String, reason: String },

    // =========================================================================
    // Filesystem Errors
    // =========================================================================
    /// Directory creation, file copy, or removal failure.
    #[error("filesystem error at {path}: {reason}")]
    Filesystem { path: PathBuf, reason: String },

    // =========================================================================
    // Sandbox Errors
    // =========================================================================
    /// The sandboxed command could not be spawned.
    #[error("failed to start command '{command}': {reason}")]
    ProcessStart { command: String, reason: String },

    /// The sandboxed command started but waiting on it failed.
    #[error("failed waiting for command '{command}': {reason}")]
    ProcessWait { command: String, reason: String },
}

impl Error {
    /// Builds a filesystem error from a path and an underlying I/O error.
    pub fn fs(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
