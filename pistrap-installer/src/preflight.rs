//! Host requirement checks that run before anything touches the card.

use crate::config::ProvisionConfig;
use crate::errors::{PistrapError, Result};
use log::{info, warn};
use pistrap_hal::{CmdSpec, SystemHal};

/// Host tools the pipeline shells out to.
const REQUIRED_BINARIES: &[&str] = &[
    "debootstrap",
    "sfdisk",
    "mkfs.vfat",
    "mkfs.ext4",
    "curl",
    "chroot",
];

pub fn run(hal: &dyn SystemHal, config: &ProvisionConfig) -> Result<()> {
    info!("🔍 Preflight checks");

    if !config.dry_run && !nix::unistd::geteuid().is_root() {
        return Err(PistrapError::ValidationFailed(
            "pistrap must run as root".to_string(),
        )
        .into());
    }

    probe_tools(hal, config)
}

/// Probe for every host tool the run needs and for the qemu emulator binary.
/// The probes are read-only, so they run for real even under `--dry-run`, and
/// all of them run even after the first failure so the operator sees the full
/// list of missing pieces at once.
fn probe_tools(hal: &dyn SystemHal, config: &ProvisionConfig) -> Result<()> {
    let mut missing = Vec::new();
    for tool in REQUIRED_BINARIES {
        let spec = CmdSpec::new(["which", *tool]);
        let found = match hal.run_command(&spec, false) {
            Ok(out) => out.success,
            Err(_) => false,
        };
        if found {
            info!("✅ {}", tool);
        } else {
            warn!("❌ missing {}", tool);
            missing.push((*tool).to_string());
        }
    }

    let qemu = config.qemu_binary.display().to_string();
    let probe = CmdSpec::new(["test", "-e", qemu.as_str()]);
    let qemu_present = match hal.run_command(&probe, false) {
        Ok(out) => out.success,
        Err(_) => false,
    };
    if qemu_present {
        info!("✅ {}", qemu);
    } else {
        warn!("❌ missing {} (install qemu-user-static)", qemu);
        missing.push(qemu);
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PistrapError::MissingDependencies(missing.join(", ")).into())
    }
}
