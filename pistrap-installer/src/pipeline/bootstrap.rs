//! Two-stage foreign bootstrap.
//!
//! Stage 1 runs host-native and only unpacks: `debootstrap --foreign`.
//! Stage 2 completes inside the tree under qemu user-mode emulation; the
//! kernel's binfmt handler routes every target-architecture binary through
//! the emulator copied into the tree.

use crate::config::ProvisionConfig;
use crate::errors::Result;
use crate::executor::{Cmd, Executor, Policy};
use crate::pipeline::{MountRecord, PipelineState};
use anyhow::Context;
use log::info;
use pistrap_hal::{MountOptions, SystemHal};
use std::fs;
use std::path::Path;

pub fn stage1<H: SystemHal + ?Sized>(
    exec: &Executor<'_, H>,
    state: &PipelineState,
    cfg: &ProvisionConfig,
) -> Result<()> {
    info!(
        "📦 Bootstrap stage 1: debootstrap --foreign {} ({})",
        cfg.suite, cfg.arch
    );
    exec.execute(
        Cmd::new("debootstrap")
            .arg("--foreign")
            .arg(format!("--arch={}", cfg.arch))
            .arg(&cfg.suite)
            .arg(state.tree.display().to_string())
            .arg(&cfg.mirror),
        Policy::Fatal,
    )?;
    Ok(())
}

/// Stage 2 runs only after stage 1 returned success; the caller sequences
/// the two and never retries either.
pub fn stage2<H: SystemHal + ?Sized>(
    hal: &H,
    exec: &Executor<'_, H>,
    state: &mut PipelineState,
    cfg: &ProvisionConfig,
) -> Result<()> {
    info!("📦 Bootstrap stage 2: emulated completion");

    // The emulator must sit on the tree's own executable search path so the
    // chroot can launch target binaries.
    let emulator = tree_emulator_path(&state.tree, &cfg.qemu_binary);
    exec.execute(
        Cmd::new("cp")
            .arg(cfg.qemu_binary.display().to_string())
            .arg(emulator.clone()),
        Policy::Fatal,
    )?;
    exec.execute(
        Cmd::new("chmod").arg("0755").arg(emulator),
        Policy::Fatal,
    )?;

    // The second stage's package scripts expect a live /proc.
    let proc_target = state.tree.join("proc");
    fs::create_dir_all(&proc_target)
        .with_context(|| format!("Failed to create {}", proc_target.display()))?;
    exec.runlog()
        .note(&format!("mount -t proc proc {}", proc_target.display()));
    hal.mount_device(
        Path::new("proc"),
        &proc_target,
        Some("proc"),
        MountOptions::new(),
        cfg.dry_run,
    )
    .context("Failed to mount proc in the target tree")?;
    state.register_mount(MountRecord {
        source: "proc".into(),
        target: proc_target,
        fstype: "proc".to_string(),
    })?;

    exec.execute(
        Cmd::new("/debootstrap/debootstrap")
            .arg("--second-stage")
            .chroot(&state.tree),
        Policy::Fatal,
    )?;

    // Interactive reconfiguration runs streamed so the prompts reach the
    // operator's terminal.
    for package in ["locales", "tzdata"] {
        exec.execute(
            Cmd::new("dpkg-reconfigure")
                .arg(package)
                .chroot(&state.tree)
                .streamed(),
            Policy::Fatal,
        )?;
    }

    Ok(())
}

fn tree_emulator_path(tree: &Path, qemu_binary: &Path) -> String {
    let name = qemu_binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "qemu-arm-static".to_string());
    tree.join("usr/bin").join(name).display().to_string()
}
