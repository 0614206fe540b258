//! # Sandbox Execution
//!
//! An ephemeral root filesystem under `<root>/sandbox/<randomId>/rootfs`,
//! populated by stacking the image's layer rootfs directories in manifest
//! order (later layers overwrite earlier ones), then a command run inside
//! it with:
//!
//! - new PID and network namespaces (`unshare`)
//! - `chroot` into the assembled rootfs, working directory `/`
//! - stdin/stdout/stderr inherited from the parent
//!
//! The sandbox directory is removed when the [`Sandbox`] guard drops, on
//! success and failure alike. Running requires root (namespace and chroot
//! privileges); the child's exit code is propagated verbatim, and death
//! by signal maps to `128 + signal`.

use crate::config::Config;
use crate::constants::ROOTFS_DIR;
use crate::error::{Error, Result};
use crate::storage::ImageStore;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use tracing::{debug, info, warn};

/// Ephemeral sandbox directory. Removed on drop.
pub struct Sandbox {
    dir: PathBuf,
}

impl Sandbox {
    /// Creates an empty sandbox under `<root>/sandbox` with a random
    /// content-address-shaped id.
    pub fn create(config: &Config) -> Result<Self> {
        let id = random_sandbox_id();
        let dir = config.sandbox_dir().join(&id);
        fs::create_dir_all(&dir).map_err(|e| Error::fs(&dir, e))?;
        debug!(sandbox = %dir.display(), "created sandbox");
        Ok(Self { dir })
    }

    /// Returns the rootfs path inside the sandbox.
    pub fn rootfs(&self) -> PathBuf {
        self.dir.join(ROOTFS_DIR)
    }

    /// Populates the sandbox rootfs from an image's layers, applied in
    /// order so later layers overwrite earlier ones.
    pub fn populate(&self, store: &ImageStore, image_id: &str) -> Result<()> {
        let rootfs = self.rootfs();
        fs::create_dir_all(&rootfs).map_err(|e| Error::fs(&rootfs, e))?;

        for layer in store.layer_dirs_in_order(image_id)? {
            debug!(layer = %layer.display(), "applying layer");
            copy_tree(&layer, &rootfs)?;
        }
        Ok(())
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            warn!(sandbox = %self.dir.display(), error = %e, "failed to clean up sandbox");
        }
    }
}

/// Generates a random sandbox id shaped like a content digest.
fn random_sandbox_id() -> String {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    let digest = Sha256::digest(seed);
    format!("sha256:{}", hex::encode(digest))
}

/// Recursively copies `src` into `dst`, merging into existing
/// directories. Symlinks are recreated, not dereferenced; file and
/// directory permission bits are preserved.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let entries = fs::read_dir(src).map_err(|e| Error::fs(src, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| Error::fs(src, e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let meta = fs::symlink_metadata(&src_path).map_err(|e| Error::fs(&src_path, e))?;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&src_path).map_err(|e| Error::fs(&src_path, e))?;
            // A layer may replace an earlier file with a symlink.
            if fs::symlink_metadata(&dst_path).is_ok() {
                remove_any(&dst_path)?;
            }
            std::os::unix::fs::symlink(&target, &dst_path).map_err(|e| Error::fs(&dst_path, e))?;
        } else if meta.is_dir() {
            fs::create_dir_all(&dst_path).map_err(|e| Error::fs(&dst_path, e))?;
            fs::set_permissions(&dst_path, meta.permissions())
                .map_err(|e| Error::fs(&dst_path, e))?;
            copy_tree(&src_path, &dst_path)?;
        } else {
            if fs::symlink_metadata(&dst_path).is_ok() {
                remove_any(&dst_path)?;
            }
            fs::copy(&src_path, &dst_path).map_err(|e| Error::fs(&dst_path, e))?;
        }
    }
    Ok(())
}

/// Removes a path regardless of whether it is a file, symlink, or
/// directory.
fn remove_any(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path).map_err(|e| Error::fs(path, e))?;
    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(|e| Error::fs(path, e))
    } else {
        fs::remove_file(path).map_err(|e| Error::fs(path, e))
    }
}

/// Runs a command inside a fresh sandbox built from the given image and
/// returns the exit code to report.
///
/// The sandbox is created, populated, used for exactly one command, and
/// removed. A non-zero exit from the child is a normal outcome, not an
/// error.
pub fn run_in_sandbox(
    config: &Config,
    image_id: &str,
    command: &str,
    args: &[String],
) -> Result<i32> {
    let store = ImageStore::new(config);
    let sandbox = Sandbox::create(config)?;
    sandbox.populate(&store, image_id)?;
    let rootfs = sandbox.rootfs();

    info!(command, rootfs = %rootfs.display(), "starting sandboxed command");

    let rootfs_c =
        std::ffi::CString::new(rootfs.as_os_str().as_encoded_bytes()).map_err(|_| {
            Error::ProcessStart {
                command: command.to_string(),
                reason: "rootfs path contains a NUL byte".to_string(),
            }
        })?;

    let mut child = Command::new(command);
    child.args(args);

    unsafe {
        child.pre_exec(move || {
            if libc::unshare(libc::CLONE_NEWPID | libc::CLONE_NEWNET) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            if libc::chroot(rootfs_c.as_ptr()) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            if libc::chdir(c"/".as_ptr()) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let status = child
        .spawn()
        .map_err(|e| Error::ProcessStart {
            command: command.to_string(),
            reason: e.to_string(),
        })?
        .wait()
        .map_err(|e| Error::ProcessWait {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

    let code = exit_code_from_status(status);
    info!(command, code, "sandboxed command finished");
    Ok(code)
}

/// Maps a child's wait status to the exit code to report: the exit code
/// itself, or `128 + signal` when the child died from a signal.
pub fn exit_code_from_status(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}
