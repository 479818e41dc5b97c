//! Disk layout stage: signature wipe plus one sfdisk transaction.

use crate::config::ProvisionConfig;
use crate::errors::Result;
use crate::partitions::{render_sfdisk_script, validate_specs};
use crate::runlog::RunLog;
use anyhow::Context;
use log::info;
use pistrap_hal::{SystemHal, WipeOptions};

/// Zeroing the first MiB is enough to kill any partition-table or
/// filesystem signature at the head of the device.
const WIPE_LEN: u64 = 1024 * 1024;

pub fn apply_layout<H: SystemHal + ?Sized>(
    hal: &H,
    runlog: &RunLog,
    cfg: &ProvisionConfig,
) -> Result<()> {
    validate_specs(&cfg.partitions)?;
    let opts = WipeOptions::new(cfg.dry_run, cfg.confirmed);

    info!("🧹 Wiping partition signature on {}", cfg.device.display());
    runlog.note(&format!("wipe first {} bytes of {}", WIPE_LEN, cfg.device.display()));
    hal.zero_signature(&cfg.device, WIPE_LEN, &opts)
        .with_context(|| format!("Failed to wipe {}", cfg.device.display()))?;

    info!("📐 Creating partitions");
    let script = render_sfdisk_script(&cfg.partitions);
    runlog.note(&format!("sfdisk script:\n{}", script.trim_end()));
    let output = hal
        .sfdisk_apply(&cfg.device, &script, &opts)
        .with_context(|| format!("Failed to partition {}", cfg.device.display()))?;
    if !output.trim().is_empty() {
        runlog.note(output.trim_end());
    }

    // Let the kernel publish the new partition device nodes before mkfs.
    if !cfg.dry_run {
        hal.sync().context("sync failed")?;
        hal.udev_settle().context("udev settle failed")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitions::default_layout;
    use pistrap_hal::{FakeHal, HalError, Operation};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn confirmed_config() -> ProvisionConfig {
        let mut cfg = ProvisionConfig::new("/dev/sdz", default_layout(100));
        cfg.confirmed = true;
        cfg
    }

    #[test]
    fn wipes_then_partitions_then_settles() {
        let dir = tempdir().unwrap();
        let runlog = RunLog::open(dir.path().join("pistrap.log")).unwrap();
        let hal = FakeHal::new();

        apply_layout(&hal, &runlog, &confirmed_config()).unwrap();

        let ops = hal.operations();
        assert!(matches!(&ops[0], Operation::ZeroSignature { disk, len }
            if disk == &PathBuf::from("/dev/sdz") && *len == 1024 * 1024));
        assert!(matches!(&ops[1], Operation::SfdiskApply { script, .. }
            if script == "label: dos\n,100MiB,e\n,,83\n"));
        assert!(matches!(ops[2], Operation::Sync));
        assert!(matches!(ops[3], Operation::UdevSettle));
    }

    #[test]
    fn unconfirmed_run_is_refused_before_any_write() {
        let dir = tempdir().unwrap();
        let runlog = RunLog::open(dir.path().join("pistrap.log")).unwrap();
        let hal = FakeHal::new();
        let mut cfg = confirmed_config();
        cfg.confirmed = false;

        let err = apply_layout(&hal, &runlog, &cfg).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HalError>(),
            Some(HalError::SafetyLock)
        ));
        assert_eq!(hal.operation_count(), 0);
    }
}
