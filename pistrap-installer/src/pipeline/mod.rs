//! The provisioning pipeline.
//!
//! Stages run strictly in sequence: disk layout, filesystems and mounts,
//! two-stage bootstrap, customization, Raspberry Pi extras. Every mount a
//! stage acquires is registered in [`PipelineState`]; a drop guard releases
//! them in reverse acquisition order on every exit path, panics included.

pub mod bootstrap;
pub mod customize;
pub mod disk;
pub mod fsmount;
pub mod rpi;
pub mod teardown;

use crate::config::ProvisionConfig;
use crate::errors::{PistrapError, Result};
use crate::executor::Executor;
use crate::interrupt;
use crate::report::RunReport;
use crate::runlog::RunLog;
use anyhow::Context;
use log::{info, warn};
use pistrap_hal::SystemHal;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Grace period before the forced-unmount retry, long enough for file
/// handles held by just-exited chrooted processes to close.
pub const TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Partition,
    Filesystems,
    BootstrapStage1,
    BootstrapStage2,
    Customize,
    RpiExtras,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Partition => "partition",
            Stage::Filesystems => "filesystems",
            Stage::BootstrapStage1 => "bootstrap-stage1",
            Stage::BootstrapStage2 => "bootstrap-stage2",
            Stage::Customize => "customize",
            Stage::RpiExtras => "rpi-extras",
        }
    }
}

/// One live mount, recorded at acquisition time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub source: PathBuf,
    pub target: PathBuf,
    pub fstype: String,
}

/// Mutable state threaded through the stages. No ambient globals: the
/// mount registry and the stage ledger live here and nowhere else.
#[derive(Debug)]
pub struct PipelineState {
    /// Root of the target tree inside the work directory.
    pub tree: PathBuf,
    /// Live mounts in acquisition order.
    mounts: Vec<MountRecord>,
    completed: Vec<Stage>,
}

impl PipelineState {
    pub fn new(tree: impl Into<PathBuf>) -> Self {
        Self {
            tree: tree.into(),
            mounts: Vec::new(),
            completed: Vec::new(),
        }
    }

    /// Register a freshly acquired mount. Two live records never share a
    /// target.
    pub fn register_mount(&mut self, record: MountRecord) -> Result<()> {
        if self.mounts.iter().any(|m| m.target == record.target) {
            return Err(PistrapError::ValidationFailed(format!(
                "mount target already registered: {}",
                record.target.display()
            ))
            .into());
        }
        self.mounts.push(record);
        Ok(())
    }

    pub fn mounts(&self) -> &[MountRecord] {
        &self.mounts
    }

    /// Remove and return the most recently acquired mount.
    pub(crate) fn pop_mount(&mut self) -> Option<MountRecord> {
        self.mounts.pop()
    }

    pub fn complete(&mut self, stage: Stage) {
        self.completed.push(stage);
    }

    pub fn completed_names(&self) -> Vec<String> {
        self.completed.iter().map(|s| s.name().to_string()).collect()
    }
}

/// Releases the state's mounts when dropped, so teardown runs on the
/// success path, the fatal path, interrupts, and unwind alike. `release`
/// runs it eagerly; the drop impl is the safety net.
struct TeardownGuard<'a, H: SystemHal + ?Sized> {
    hal: &'a H,
    runlog: &'a RunLog,
    state: PipelineState,
    grace: Duration,
    dry_run: bool,
    released: bool,
    clean: bool,
}

impl<'a, H: SystemHal + ?Sized> TeardownGuard<'a, H> {
    fn new(
        hal: &'a H,
        runlog: &'a RunLog,
        state: PipelineState,
        grace: Duration,
        dry_run: bool,
    ) -> Self {
        Self {
            hal,
            runlog,
            state,
            grace,
            dry_run,
            released: false,
            clean: true,
        }
    }

    fn state_mut(&mut self) -> &mut PipelineState {
        &mut self.state
    }

    fn release(&mut self) {
        if !self.released {
            self.clean = teardown::release_mounts(
                self.hal,
                self.runlog,
                &mut self.state,
                self.grace,
                self.dry_run,
            );
            self.released = true;
        }
    }
}

impl<H: SystemHal + ?Sized> Drop for TeardownGuard<'_, H> {
    fn drop(&mut self) {
        self.release();
    }
}

pub fn run<H: SystemHal + ?Sized>(
    hal: &H,
    runlog: &RunLog,
    cfg: &ProvisionConfig,
) -> Result<()> {
    run_with_grace(hal, runlog, cfg, TEARDOWN_GRACE)
}

/// Run the whole pipeline with an injectable teardown grace period.
pub fn run_with_grace<H: SystemHal + ?Sized>(
    hal: &H,
    runlog: &RunLog,
    cfg: &ProvisionConfig,
    grace: Duration,
) -> Result<()> {
    let mut report = RunReport::begin(
        &cfg.device.display().to_string(),
        &cfg.suite,
        &cfg.arch,
        cfg.dry_run,
    );

    let work = tempfile::Builder::new()
        .prefix("pistrap-")
        .tempdir()
        .context("Failed to create work directory")?;
    let tree = work.path().join("tree");
    fs::create_dir_all(&tree)
        .with_context(|| format!("Failed to create target tree {}", tree.display()))?;
    runlog.note(&format!("target tree: {}", tree.display()));

    let mut guard = TeardownGuard::new(hal, runlog, PipelineState::new(&tree), grace, cfg.dry_run);
    let result = run_stages(hal, runlog, cfg, guard.state_mut());
    guard.release();

    report.finish(
        guard.state.completed_names(),
        result.as_ref().err().map(|e| format!("{:#}", e)),
    );
    report.write();

    // The work directory is removed only after every mount is released.
    let clean = guard.clean;
    drop(guard);
    finish_workdir(work, clean)?;

    if result.is_ok() {
        info!("✅ {} is ready. Remove the card and boot the Pi.", cfg.device.display());
    }
    result
}

/// Remove the work directory, but only when teardown released every mount.
/// Deleting a tree with a card filesystem still mounted under it would
/// recurse onto the card itself, so an unclean teardown leaks the
/// directory and tells the operator where it is.
fn finish_workdir(work: tempfile::TempDir, clean: bool) -> Result<()> {
    if clean {
        work.close().context("Failed to remove work directory")?;
    } else {
        let kept = work.keep();
        warn!(
            "⚠️  A mount could not be released; keeping work directory {}",
            kept.display()
        );
    }
    Ok(())
}

fn run_stages<H: SystemHal + ?Sized>(
    hal: &H,
    runlog: &RunLog,
    cfg: &ProvisionConfig,
    state: &mut PipelineState,
) -> Result<()> {
    let exec = Executor::new(hal, runlog, cfg.dry_run);

    interrupt::checkpoint()?;
    disk::apply_layout(hal, runlog, cfg)?;
    state.complete(Stage::Partition);

    interrupt::checkpoint()?;
    fsmount::format_and_mount(hal, runlog, state, cfg)?;
    state.complete(Stage::Filesystems);

    interrupt::checkpoint()?;
    bootstrap::stage1(&exec, state, cfg)?;
    state.complete(Stage::BootstrapStage1);

    interrupt::checkpoint()?;
    bootstrap::stage2(hal, &exec, state, cfg)?;
    state.complete(Stage::BootstrapStage2);

    interrupt::checkpoint()?;
    customize::apply(&exec, state, cfg)?;
    state.complete(Stage::Customize);

    interrupt::checkpoint()?;
    rpi::install_extras(&exec, state, cfg)?;
    state.complete(Stage::RpiExtras);

    Ok(())
}
