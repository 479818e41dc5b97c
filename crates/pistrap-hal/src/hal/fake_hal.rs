//! Fake HAL implementation for testing.
//!
//! This implementation records all operations without executing them,
//! allowing for CI-safe testing without root privileges or real hardware.
//! Tests can script command failures and one-shot unmount failures to
//! exercise the pipeline's error paths.

use super::{
    CmdOutput, CmdSpec, FormatOps, FormatOptions, MountOps, MountOptions, PartitionOps, ProcessOps,
    SystemOps, WipeOptions,
};
use crate::{HalError, HalResult};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Operation records for testing and verification.
#[derive(Debug, Clone)]
pub enum Operation {
    ZeroSignature {
        disk: PathBuf,
        len: u64,
    },
    SfdiskApply {
        disk: PathBuf,
        script: String,
    },
    FormatExt4 {
        device: PathBuf,
    },
    FormatVfat {
        device: PathBuf,
        label: String,
    },
    Mount {
        source: PathBuf,
        target: PathBuf,
        fstype: Option<String>,
    },
    Unmount {
        target: PathBuf,
        forced: bool,
    },
    Command {
        argv: Vec<String>,
        chroot: Option<PathBuf>,
        streamed: bool,
    },
    Sync,
    UdevSettle,
}

#[derive(Debug, Default)]
struct FakeHalState {
    /// All operations that were recorded
    operations: Vec<Operation>,
    /// Currently mounted paths
    mounted_paths: HashSet<PathBuf>,
    /// Substrings that make a matching command report a non-zero exit
    failing_commands: Vec<String>,
    /// Scripted stdout for commands matching a substring
    command_outputs: Vec<(String, String)>,
    /// Targets whose next N plain unmount attempts fail
    unmount_failures: HashMap<PathBuf, u32>,
    /// Targets whose forced unmount attempts always fail
    forced_unmount_failures: HashSet<PathBuf>,
}

/// Fake HAL implementation that records operations without executing them.
///
/// This is designed for testing and CI environments where real system
/// operations would fail or be dangerous.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeHalState::default())),
        }
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().unwrap().operations.clone()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.state.lock().unwrap().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.state.lock().unwrap().operations.iter().any(check)
    }

    /// Clear all recorded operations.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.operations.clear();
        state.mounted_paths.clear();
    }

    /// Currently mounted targets, for end-state assertions.
    pub fn mounted_paths(&self) -> Vec<PathBuf> {
        let state = self.state.lock().unwrap();
        let mut paths: Vec<PathBuf> = state.mounted_paths.iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Script a non-zero exit for any command whose rendered line contains
    /// `pattern`.
    pub fn fail_commands_matching(&self, pattern: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .failing_commands
            .push(pattern.into());
    }

    /// Script captured stdout for commands whose rendered line contains
    /// `pattern`.
    pub fn set_command_output(&self, pattern: impl Into<String>, output: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .command_outputs
            .push((pattern.into(), output.into()));
    }

    /// Make the next `count` plain unmounts of `target` fail; the forced
    /// variant still succeeds.
    pub fn fail_unmount(&self, target: impl Into<PathBuf>, count: u32) {
        self.state
            .lock()
            .unwrap()
            .unmount_failures
            .insert(target.into(), count);
    }

    /// Make every forced unmount of `target` fail as well, so a target
    /// stays mounted no matter what.
    pub fn fail_unmount_force(&self, target: impl Into<PathBuf>) {
        self.state
            .lock()
            .unwrap()
            .forced_unmount_failures
            .insert(target.into());
    }

    fn record_operation(&self, op: Operation) {
        self.state.lock().unwrap().operations.push(op);
    }
}

impl ProcessOps for FakeHal {
    fn run_command(&self, spec: &CmdSpec, dry_run: bool) -> HalResult<CmdOutput> {
        if dry_run {
            log::info!("FAKE HAL DRY RUN: {}", spec.display_line());
            return Ok(CmdOutput {
                success: true,
                code: Some(0),
                output: String::new(),
            });
        }

        let line = spec.display_line();
        self.record_operation(Operation::Command {
            argv: spec.argv.clone(),
            chroot: spec.chroot.clone(),
            streamed: spec.streamed,
        });

        let state = self.state.lock().unwrap();
        if state.failing_commands.iter().any(|pat| line.contains(pat)) {
            return Ok(CmdOutput {
                success: false,
                code: Some(1),
                output: format!("simulated failure: {}", line),
            });
        }
        let output = state
            .command_outputs
            .iter()
            .find(|(pat, _)| line.contains(pat))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        Ok(CmdOutput {
            success: true,
            code: Some(0),
            output,
        })
    }
}

impl PartitionOps for FakeHal {
    fn zero_signature(&self, disk: &Path, len: u64, opts: &WipeOptions) -> HalResult<()> {
        if !opts.dry_run && !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        if opts.dry_run {
            log::info!("FAKE HAL DRY RUN: zero {} bytes of {}", len, disk.display());
            return Ok(());
        }
        self.record_operation(Operation::ZeroSignature {
            disk: disk.to_path_buf(),
            len,
        });
        Ok(())
    }

    fn sfdisk_apply(&self, disk: &Path, script: &str, opts: &WipeOptions) -> HalResult<String> {
        if !opts.dry_run && !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        if opts.dry_run {
            log::info!("FAKE HAL DRY RUN: sfdisk {}", disk.display());
            return Ok(String::new());
        }
        self.record_operation(Operation::SfdiskApply {
            disk: disk.to_path_buf(),
            script: script.to_string(),
        });
        Ok(String::new())
    }
}

impl FormatOps for FakeHal {
    fn format_ext4(&self, device: &Path, opts: &FormatOptions) -> HalResult<()> {
        if !opts.dry_run && !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        if opts.dry_run {
            log::info!("FAKE HAL DRY RUN: mkfs.ext4 {}", device.display());
            return Ok(());
        }
        log::info!("FAKE HAL: mkfs.ext4 {}", device.display());
        self.record_operation(Operation::FormatExt4 {
            device: device.to_path_buf(),
        });
        Ok(())
    }

    fn format_vfat(&self, device: &Path, label: &str, opts: &FormatOptions) -> HalResult<()> {
        if !opts.dry_run && !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        if opts.dry_run {
            log::info!("FAKE HAL DRY RUN: mkfs.vfat {} ({})", device.display(), label);
            return Ok(());
        }
        log::info!("FAKE HAL: mkfs.vfat {} ({})", device.display(), label);
        self.record_operation(Operation::FormatVfat {
            device: device.to_path_buf(),
            label: label.to_string(),
        });
        Ok(())
    }
}

impl MountOps for FakeHal {
    fn mount_device(
        &self,
        source: &Path,
        target: &Path,
        fstype: Option<&str>,
        _options: MountOptions,
        dry_run: bool,
    ) -> HalResult<()> {
        if dry_run {
            log::info!(
                "FAKE HAL DRY RUN: mount {} -> {}",
                source.display(),
                target.display()
            );
            return Ok(());
        }

        log::info!(
            "FAKE HAL: mount {} -> {} (type: {:?})",
            source.display(),
            target.display(),
            fstype
        );
        self.record_operation(Operation::Mount {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            fstype: fstype.map(String::from),
        });
        self.state
            .lock()
            .unwrap()
            .mounted_paths
            .insert(target.to_path_buf());
        Ok(())
    }

    fn unmount(&self, target: &Path, dry_run: bool) -> HalResult<()> {
        if dry_run {
            log::info!("FAKE HAL DRY RUN: unmount {}", target.display());
            return Ok(());
        }

        self.record_operation(Operation::Unmount {
            target: target.to_path_buf(),
            forced: false,
        });

        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.unmount_failures.get_mut(target) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(HalError::DeviceBusy);
            }
        }
        state.mounted_paths.remove(target);
        Ok(())
    }

    fn unmount_force(&self, target: &Path, dry_run: bool) -> HalResult<()> {
        if dry_run {
            log::info!("FAKE HAL DRY RUN: unmount -l {}", target.display());
            return Ok(());
        }

        self.record_operation(Operation::Unmount {
            target: target.to_path_buf(),
            forced: true,
        });
        let mut state = self.state.lock().unwrap();
        if state.forced_unmount_failures.contains(target) {
            return Err(HalError::DeviceBusy);
        }
        state.mounted_paths.remove(target);
        Ok(())
    }

    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        Ok(self.state.lock().unwrap().mounted_paths.contains(path))
    }
}

impl SystemOps for FakeHal {
    fn sync(&self) -> HalResult<()> {
        self.record_operation(Operation::Sync);
        Ok(())
    }

    fn udev_settle(&self) -> HalResult<()> {
        self.record_operation(Operation::UdevSettle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_hal_records_mount() {
        let hal = FakeHal::new();
        let source = Path::new("/dev/sdc1");
        let target = Path::new("/mnt/test");

        hal.mount_device(source, target, Some("vfat"), MountOptions::new(), false)
            .unwrap();

        assert_eq!(hal.operation_count(), 1);
        assert!(hal.has_operation(|op| matches!(op, Operation::Mount { .. })));
        assert!(hal.is_mounted(target).unwrap());
    }

    #[test]
    fn fake_hal_records_unmount() {
        let hal = FakeHal::new();
        let target = Path::new("/mnt/test");

        hal.mount_device(
            Path::new("/dev/sdc1"),
            target,
            Some("ext4"),
            MountOptions::new(),
            false,
        )
        .unwrap();
        hal.unmount(target, false).unwrap();

        assert_eq!(hal.operation_count(), 2);
        assert!(hal.has_operation(|op| matches!(op, Operation::Unmount { .. })));
        assert!(!hal.is_mounted(target).unwrap());
    }

    #[test]
    fn fake_hal_requires_confirmation() {
        let hal = FakeHal::new();
        let opts = FormatOptions::new(false, false);

        let err = hal.format_ext4(Path::new("/dev/sdc2"), &opts).unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));

        let wipe = WipeOptions::new(false, false);
        let err = hal
            .zero_signature(Path::new("/dev/sdc"), 1024, &wipe)
            .unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));
    }

    #[test]
    fn scripted_command_failure_reports_nonzero_exit() {
        let hal = FakeHal::new();
        hal.fail_commands_matching("debootstrap");

        let spec = CmdSpec {
            argv: vec!["debootstrap".to_string(), "--foreign".to_string()],
            ..Default::default()
        };
        let out = hal.run_command(&spec, false).unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(1));
        assert!(out.output.contains("simulated failure"));
    }

    #[test]
    fn scripted_unmount_failure_clears_after_count() {
        let hal = FakeHal::new();
        let target = Path::new("/mnt/busy");
        hal.mount_device(
            Path::new("/dev/sdc2"),
            target,
            Some("ext4"),
            MountOptions::new(),
            false,
        )
        .unwrap();
        hal.fail_unmount(target, 1);

        assert!(hal.unmount(target, false).is_err());
        assert!(hal.is_mounted(target).unwrap());
        assert!(hal.unmount(target, false).is_ok());
        assert!(!hal.is_mounted(target).unwrap());
    }

    #[test]
    fn scripted_forced_unmount_failure_keeps_target_mounted() {
        let hal = FakeHal::new();
        let target = Path::new("/mnt/stuck");
        hal.mount_device(
            Path::new("/dev/sdc2"),
            target,
            Some("ext4"),
            MountOptions::new(),
            false,
        )
        .unwrap();
        hal.fail_unmount_force(target);

        assert!(hal.unmount_force(target, false).is_err());
        assert!(hal.is_mounted(target).unwrap());
    }

    #[test]
    fn fake_hal_can_clear() {
        let hal = FakeHal::new();
        hal.format_ext4(Path::new("/dev/sdc2"), &FormatOptions::new(false, true))
            .unwrap();
        assert_eq!(hal.operation_count(), 1);

        hal.clear();
        assert_eq!(hal.operation_count(), 0);
    }
}
