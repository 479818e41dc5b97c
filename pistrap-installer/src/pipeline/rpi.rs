//! Raspberry Pi extras: kernel, firmware and the VideoCore userland paths.

use crate::config::ProvisionConfig;
use crate::errors::Result;
use crate::executor::{Cmd, Executor, Policy};
use crate::pipeline::customize::write_artifact;
use crate::pipeline::PipelineState;
use anyhow::Context;
use log::{info, warn};
use pistrap_hal::SystemHal;
use std::fs;
use std::io::ErrorKind;

pub fn install_extras<H: SystemHal + ?Sized>(
    exec: &Executor<'_, H>,
    state: &PipelineState,
    cfg: &ProvisionConfig,
) -> Result<()> {
    info!("🍓 Installing Raspberry Pi kernel and firmware");

    let usr_bin = state.tree.join("usr/bin");
    fs::create_dir_all(&usr_bin)
        .with_context(|| format!("Failed to create {}", usr_bin.display()))?;

    for (name, url) in [
        ("rpi-update", cfg.rpi_update_url.as_str()),
        ("raspi-config", cfg.raspi_config_url.as_str()),
    ] {
        let dest = usr_bin.join(name).display().to_string();
        exec.execute(
            Cmd::new("curl").arg("-Lso").arg(dest.clone()).arg(url),
            Policy::Fatal,
        )?;
        exec.execute(Cmd::new("chmod").arg("+x").arg(dest), Policy::Fatal)?;
    }

    // rpi-update refuses to run without a modules directory in place.
    let modules = state.tree.join("lib/modules");
    fs::create_dir_all(&modules)
        .with_context(|| format!("Failed to create {}", modules.display()))?;

    exec.execute(
        Cmd::new("/usr/bin/rpi-update")
            .chroot(&state.tree)
            .env("SKIP_WARNING", "1"),
        Policy::Fatal,
    )?;

    // The VideoCore userland lives outside the default linker and shell
    // search paths.
    write_artifact(&state.tree, "etc/ld.so.conf.d/videocore.conf", "/opt/vc/lib\n")?;
    exec.execute(Cmd::new("ldconfig").chroot(&state.tree), Policy::Fatal)?;
    write_artifact(
        &state.tree,
        "etc/profile.d/paths.sh",
        "export PATH=\"${PATH}:/opt/vc/sbin:/opt/vc/bin\"\n",
    )?;

    remove_autolaunch_hook(state);
    Ok(())
}

/// First boot must come up non-interactive, so drop the configuration
/// tool's login auto-launch hook if the package installed one.
fn remove_autolaunch_hook(state: &PipelineState) {
    let hook = state.tree.join("etc/profile.d/raspi-config.sh");
    match fs::remove_file(&hook) {
        Ok(()) => info!("Removed {}", hook.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!("Could not remove {}: {}", hook.display(), err),
    }
}
