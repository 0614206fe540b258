//! # boxrun
//!
//! A minimal container runtime: pull an image from a Docker/OCI registry
//! into a content-addressed local store, assemble its layers into an
//! ephemeral root filesystem, and run one command inside it behind PID
//! and network namespaces plus a chroot.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                        boxrun (CLI)                          |
//! +--------------------------------------------------------------+
//! |  image::ensure_image            sandbox::run_in_sandbox      |
//! |  (pull pipeline)                (namespaces + chroot)        |
//! +-------------------------------+------------------------------+
//! |  registry::RegistryClient     |  storage::ImageStore         |
//! |  (token, manifests, blobs)    |  (image cache layout)        |
//! +-------------------------------+------------------------------+
//! |  manifest (decode, platform select, layer classification)    |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Modules
//!
//! | Module        | Purpose                                          |
//! |---------------|--------------------------------------------------|
//! | [`config`]    | Storage root and registry endpoints              |
//! | [`constants`] | Media types, endpoints, storage layout names     |
//! | [`error`]     | Error types                                      |
//! | [`image`]     | Pull pipeline (download, decompress, extract)    |
//! | [`manifest`]  | Manifest wire formats and dispatch               |
//! | [`platform`]  | Host OS/architecture detection                   |
//! | [`registry`]  | Registry v2 client                               |
//! | [`sandbox`]   | Sandbox assembly and command execution           |
//! | [`storage`]   | On-disk image store                              |
//!
//! ## Example
//!
//! ```no_run
//! use boxrun::{ensure_image, run_in_sandbox, Config};
//!
//! # async fn demo() -> boxrun::Result<()> {
//! let config = Config::new();
//! let image_id = ensure_image(&config, "busybox:latest").await?;
//! let code = run_in_sandbox(&config, &image_id, "sh", &[])?;
//! std::process::exit(code);
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod image;
pub mod manifest;
pub mod platform;
pub mod registry;
pub mod sandbox;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
pub use image::ensure_image;
pub use platform::Platform;
pub use sandbox::{run_in_sandbox, Sandbox};
pub use storage::ImageStore;
