//! Mount operations trait.

use crate::HalResult;
use std::path::Path;

/// Trait for mounting and unmounting filesystems.
pub trait MountOps {
    /// Mount a device (or a virtual filesystem source such as `proc`) at a
    /// target path.
    ///
    /// # Arguments
    /// * `source` - Device path (e.g., `/dev/sdc1`) or virtual source name
    /// * `target` - Mount point path
    /// * `fstype` - Optional filesystem type (e.g., `"ext4"`, `"vfat"`, `"proc"`)
    /// * `options` - Mount options
    /// * `dry_run` - If true, log the operation but don't execute it
    fn mount_device(
        &self,
        source: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: MountOptions,
        dry_run: bool,
    ) -> HalResult<()>;

    /// Unmount a filesystem.
    fn unmount(&self, target: &Path, dry_run: bool) -> HalResult<()>;

    /// Forced/lazy unmount fallback for targets that refuse a plain unmount
    /// (stale file handles from just-exited chrooted processes).
    fn unmount_force(&self, target: &Path, dry_run: bool) -> HalResult<()>;

    /// Check if a path is currently mounted.
    fn is_mounted(&self, path: &Path) -> HalResult<bool>;
}

/// Mount options and flags.
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    /// Additional mount options as a comma-separated string (e.g., "ro,noexec")
    pub options: Option<String>,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: impl Into<String>) -> Self {
        Self {
            options: Some(options.into()),
        }
    }
}
