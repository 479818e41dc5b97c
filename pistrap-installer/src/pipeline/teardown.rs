//! Mount teardown: reverse acquisition order, best-effort all the way.

use crate::pipeline::PipelineState;
use crate::runlog::RunLog;
use log::{info, warn};
use pistrap_hal::SystemHal;
use std::thread;
use std::time::Duration;

/// Release every live mount in strict reverse acquisition order. Nothing
/// here can fail the run: a plain unmount that refuses gets one forced
/// retry after the grace sleep, and a target that still will not release
/// is logged and left behind rather than crashing before the rest of the
/// cleanup completes. Returns whether every target actually released;
/// callers must not delete the mount tree when it did not.
pub fn release_mounts<H: SystemHal + ?Sized>(
    hal: &H,
    runlog: &RunLog,
    state: &mut PipelineState,
    grace: Duration,
    dry_run: bool,
) -> bool {
    let mut all_released = true;
    while let Some(record) = state.pop_mount() {
        runlog.note(&format!("umount {}", record.target.display()));
        match hal.unmount(&record.target, dry_run) {
            Ok(()) => info!("🔓 Unmounted {}", record.target.display()),
            Err(err) => {
                warn!(
                    "unmount of {} failed ({}); retrying forced after grace period",
                    record.target.display(),
                    err
                );
                if !grace.is_zero() {
                    thread::sleep(grace);
                }
                runlog.note(&format!("umount -l {}", record.target.display()));
                match hal.unmount_force(&record.target, dry_run) {
                    Ok(()) => info!("🔓 Force-unmounted {}", record.target.display()),
                    Err(err) => {
                        warn!(
                            "{} is still mounted ({}); leaving it behind",
                            record.target.display(),
                            err
                        );
                        runlog.note(&format!(
                            "still mounted: {} ({})",
                            record.target.display(),
                            err
                        ));
                        all_released = false;
                    }
                }
            }
        }
    }
    all_released
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MountRecord;
    use pistrap_hal::{FakeHal, MountOptions, MountOps, Operation};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn test_runlog() -> (RunLog, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::open(dir.path().join("pistrap.log")).unwrap();
        (log, dir)
    }

    fn mounted_state(hal: &FakeHal, targets: &[&str]) -> PipelineState {
        let mut state = PipelineState::new("/work/tree");
        for target in targets {
            hal.mount_device(
                Path::new("/dev/sdz2"),
                Path::new(target),
                Some("ext4"),
                MountOptions::new(),
                false,
            )
            .unwrap();
            state
                .register_mount(MountRecord {
                    source: PathBuf::from("/dev/sdz2"),
                    target: PathBuf::from(target),
                    fstype: "ext4".to_string(),
                })
                .unwrap();
        }
        state
    }

    fn unmount_ops(hal: &FakeHal) -> Vec<(PathBuf, bool)> {
        hal.operations()
            .into_iter()
            .filter_map(|op| match op {
                Operation::Unmount { target, forced } => Some((target, forced)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn releases_in_reverse_acquisition_order() {
        let hal = FakeHal::new();
        let (runlog, _dir) = test_runlog();
        let mut state = mounted_state(&hal, &["/work/tree", "/work/tree/boot", "/work/tree/proc"]);

        let clean = release_mounts(&hal, &runlog, &mut state, Duration::ZERO, false);

        assert!(clean);
        assert_eq!(
            unmount_ops(&hal),
            vec![
                (PathBuf::from("/work/tree/proc"), false),
                (PathBuf::from("/work/tree/boot"), false),
                (PathBuf::from("/work/tree"), false),
            ]
        );
        assert!(state.mounts().is_empty());
        assert!(hal.mounted_paths().is_empty());
    }

    #[test]
    fn busy_target_gets_one_forced_retry() {
        let hal = FakeHal::new();
        let (runlog, _dir) = test_runlog();
        let mut state = mounted_state(&hal, &["/work/tree", "/work/tree/proc"]);
        hal.fail_unmount("/work/tree/proc", 1);

        let clean = release_mounts(&hal, &runlog, &mut state, Duration::ZERO, false);

        assert!(clean);
        assert_eq!(
            unmount_ops(&hal),
            vec![
                (PathBuf::from("/work/tree/proc"), false),
                (PathBuf::from("/work/tree/proc"), true),
                (PathBuf::from("/work/tree"), false),
            ]
        );
        assert!(hal.mounted_paths().is_empty());
    }

    #[test]
    fn stuck_target_is_left_behind_and_reported() {
        let hal = FakeHal::new();
        let (runlog, _dir) = test_runlog();
        let mut state = mounted_state(&hal, &["/work/tree", "/work/tree/proc"]);
        hal.fail_unmount("/work/tree/proc", 1);
        hal.fail_unmount_force("/work/tree/proc");

        let clean = release_mounts(&hal, &runlog, &mut state, Duration::ZERO, false);

        assert!(!clean);
        // The stuck target stays mounted; the rest still release.
        assert_eq!(hal.mounted_paths(), vec![PathBuf::from("/work/tree/proc")]);
        assert_eq!(
            unmount_ops(&hal),
            vec![
                (PathBuf::from("/work/tree/proc"), false),
                (PathBuf::from("/work/tree/proc"), true),
                (PathBuf::from("/work/tree"), false),
            ]
        );
    }
}
