//! Filesystem creation and root-first mounting of the target tree.

use crate::config::ProvisionConfig;
use crate::errors::{PistrapError, Result};
use crate::partitions::{mount_order, FsKind};
use crate::pipeline::{MountRecord, PipelineState};
use crate::runlog::RunLog;
use anyhow::Context;
use log::info;
use pistrap_hal::{partition_path, FormatOptions, MountOptions, SystemHal};
use std::fs;
use std::path::{Path, PathBuf};

const BOOT_LABEL: &str = "boot";

/// Map a partition's mount path (`/`, `/boot`, ...) into the work tree.
fn mount_target(tree: &Path, mount: &str) -> PathBuf {
    if mount == "/" {
        tree.to_path_buf()
    } else {
        tree.join(mount.trim_start_matches('/'))
    }
}

pub fn format_and_mount<H: SystemHal + ?Sized>(
    hal: &H,
    runlog: &RunLog,
    state: &mut PipelineState,
    cfg: &ProvisionConfig,
) -> Result<()> {
    let opts = FormatOptions::new(cfg.dry_run, cfg.confirmed);

    for (idx, spec) in cfg.partitions.iter().enumerate() {
        let device = partition_path(&cfg.device, (idx + 1) as u32);
        info!(
            "💾 Formatting {} as {} (for {})",
            device.display(),
            spec.fs.mount_type(),
            spec.mount
        );
        match spec.fs {
            FsKind::Ext4 => {
                runlog.note(&format!("mkfs.ext4 -F {}", device.display()));
                hal.format_ext4(&device, &opts)
                    .with_context(|| format!("Failed to format {}", device.display()))?;
            }
            FsKind::Vfat => {
                runlog.note(&format!(
                    "mkfs.vfat -F 32 -n {} {}",
                    BOOT_LABEL,
                    device.display()
                ));
                hal.format_vfat(&device, BOOT_LABEL, &opts)
                    .with_context(|| format!("Failed to format {}", device.display()))?;
            }
        }
    }

    // Root tree first, nested mount points after, since they live inside
    // the root tree's directory namespace.
    for idx in mount_order(&cfg.partitions) {
        let spec = &cfg.partitions[idx];
        let device = partition_path(&cfg.device, (idx + 1) as u32);
        let target = mount_target(&state.tree, &spec.mount);

        fs::create_dir_all(&target)
            .with_context(|| format!("Failed to create mount point {}", target.display()))?;
        if hal
            .is_mounted(&target)
            .with_context(|| format!("Failed to check mount state of {}", target.display()))?
        {
            return Err(PistrapError::ValidationFailed(format!(
                "{} is already mounted",
                target.display()
            ))
            .into());
        }
        info!("🔗 Mounting {} at {}", device.display(), target.display());
        runlog.note(&format!(
            "mount -t {} {} {}",
            spec.fs.mount_type(),
            device.display(),
            target.display()
        ));
        hal.mount_device(
            &device,
            &target,
            Some(spec.fs.mount_type()),
            MountOptions::new(),
            cfg.dry_run,
        )
        .with_context(|| format!("Failed to mount {}", device.display()))?;

        state.register_mount(MountRecord {
            source: device,
            target,
            fstype: spec.fs.mount_type().to_string(),
        })?;
    }

    Ok(())
}
