//! In-tree system customization.
//!
//! Writes the fixed configuration artifacts into the mounted tree, installs
//! the package set, applies a few best-effort text substitutions and sets
//! the default root credential. Artifact writes are fatal; substitutions
//! are soft because target defaults vary by release.

use crate::config::ProvisionConfig;
use crate::errors::Result;
use crate::executor::{Cmd, Executor, Policy};
use crate::pipeline::PipelineState;
use anyhow::Context;
use log::{info, warn};
use pistrap_hal::SystemHal;
use std::fs;
use std::path::Path;

/// Kernel command line the Pi firmware hands to the kernel. The root
/// device is named from the Pi's own point of view, not the host's.
const CMDLINE: &str = "dwc_otg.lpm_enable=0 console=ttyAMA0,115200 console=tty1 \
                       root=/dev/mmcblk0p2 rootfstype=ext4 elevator=deadline rootwait";

const FSTAB: &str = "\
proc            /proc           proc    defaults          0       0
/dev/mmcblk0p1  /boot           vfat    defaults          0       2
/dev/mmcblk0p2  /               ext4    defaults,noatime  0       1
";

const INTERFACES: &str = "\
auto lo
iface lo inet loopback

allow-hotplug eth0
iface eth0 inet dhcp
";

/// Modest overclock, applied only with `--tuning`.
const TUNING_CONFIG: &str = "\
arm_freq=1000
core_freq=500
sdram_freq=500
over_voltage=2
";

pub fn apply<H: SystemHal + ?Sized>(
    exec: &Executor<'_, H>,
    state: &PipelineState,
    cfg: &ProvisionConfig,
) -> Result<()> {
    info!("🔧 Customizing the target system");

    for (rel, content) in artifacts(cfg) {
        write_artifact(&state.tree, rel, &content)?;
    }

    install_packages(exec, state, cfg)?;

    // Best-effort tweaks on files whose stock content varies by release.
    substitute(
        &state.tree,
        "etc/ssh/sshd_config",
        "#PasswordAuthentication yes",
        "PasswordAuthentication yes",
    );
    substitute(
        &state.tree,
        "etc/ssh/sshd_config",
        "#PermitRootLogin prohibit-password",
        "PermitRootLogin yes",
    );
    substitute(
        &state.tree,
        "etc/dhcp/dhclient.conf",
        "timeout 60;",
        "timeout 10;",
    );

    set_root_password(exec, state, cfg)?;
    Ok(())
}

/// The fixed artifact set, tree-relative path plus literal content.
fn artifacts(cfg: &ProvisionConfig) -> Vec<(&'static str, String)> {
    vec![
        ("etc/fstab", FSTAB.to_string()),
        ("etc/network/interfaces", INTERFACES.to_string()),
        ("etc/hostname", format!("{}\n", cfg.hostname)),
        (
            "etc/hosts",
            format!("127.0.0.1\tlocalhost\n127.0.1.1\t{}\n", cfg.hostname),
        ),
        (
            "etc/apt/sources.list",
            format!(
                "deb {mirror} {suite} main contrib non-free non-free-firmware\n",
                mirror = cfg.mirror,
                suite = cfg.suite
            ),
        ),
        (
            "etc/apt/preferences.d/pistrap",
            format!(
                "Package: *\nPin: release n={}\nPin-Priority: 900\n",
                cfg.suite
            ),
        ),
        ("boot/cmdline.txt", format!("{}\n", CMDLINE)),
        (
            "boot/config.txt",
            if cfg.tuning {
                TUNING_CONFIG.to_string()
            } else {
                String::new()
            },
        ),
    ]
}

/// Write one artifact verbatim. Write failures are fatal.
pub(crate) fn write_artifact(tree: &Path, rel: &str, content: &str) -> Result<()> {
    let path = tree.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn install_packages<H: SystemHal + ?Sized>(
    exec: &Executor<'_, H>,
    state: &PipelineState,
    cfg: &ProvisionConfig,
) -> Result<()> {
    info!("📚 Installing packages: {}", cfg.packages.join(", "));
    exec.execute(
        Cmd::new("apt-get").arg("update").chroot(&state.tree),
        Policy::Fatal,
    )?;
    exec.execute(
        Cmd::new("apt-get")
            .arg("install")
            .arg("-y")
            .args(cfg.packages.iter().cloned())
            .chroot(&state.tree)
            .env("DEBIAN_FRONTEND", "noninteractive"),
        Policy::Fatal,
    )?;
    Ok(())
}

/// Replace one exact pattern in a tree file. An absent file or pattern
/// leaves everything untouched; nothing here can fail the run.
fn substitute(tree: &Path, rel: &str, pattern: &str, replacement: &str) {
    let path = tree.join(rel);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            warn!("skipping substitution, {} unreadable: {}", path.display(), err);
            return;
        }
    };
    if !content.contains(pattern) {
        return;
    }
    let updated = content.replace(pattern, replacement);
    if let Err(err) = fs::write(&path, updated) {
        warn!("substitution write failed for {}: {}", path.display(), err);
    }
}

fn set_root_password<H: SystemHal + ?Sized>(
    exec: &Executor<'_, H>,
    state: &PipelineState,
    cfg: &ProvisionConfig,
) -> Result<()> {
    exec.execute(
        Cmd::new("chpasswd")
            .chroot(&state.tree)
            .stdin(format!("root:{}\n", cfg.root_password)),
        Policy::Fatal,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitions::default_layout;
    use crate::runlog::RunLog;
    use pistrap_hal::{FakeHal, Operation};
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, PipelineState, ProvisionConfig) {
        let work = tempdir().unwrap();
        let tree = work.path().join("tree");
        std::fs::create_dir_all(&tree).unwrap();
        let state = PipelineState::new(&tree);
        let cfg = ProvisionConfig::new("/dev/sdz", default_layout(100));
        (work, state, cfg)
    }

    #[test]
    fn writes_every_artifact_into_the_tree() {
        let (work, state, cfg) = setup();
        let runlog = RunLog::open(work.path().join("pistrap.log")).unwrap();
        let hal = FakeHal::new();
        let exec = Executor::new(&hal, &runlog, false);

        apply(&exec, &state, &cfg).unwrap();

        let hostname = std::fs::read_to_string(state.tree.join("etc/hostname")).unwrap();
        assert_eq!(hostname, "raspberrypi\n");
        let cmdline = std::fs::read_to_string(state.tree.join("boot/cmdline.txt")).unwrap();
        assert!(cmdline.starts_with("dwc_otg.lpm_enable=0 console=ttyAMA0,115200"));
        assert!(cmdline.contains("root=/dev/mmcblk0p2"));
        let config = std::fs::read_to_string(state.tree.join("boot/config.txt")).unwrap();
        assert!(config.is_empty());
        assert!(state.tree.join("etc/apt/preferences.d/pistrap").exists());
    }

    #[test]
    fn tuning_flag_fills_boot_config() {
        let (work, state, mut cfg) = setup();
        cfg.tuning = true;
        let runlog = RunLog::open(work.path().join("pistrap.log")).unwrap();
        let hal = FakeHal::new();
        let exec = Executor::new(&hal, &runlog, false);

        apply(&exec, &state, &cfg).unwrap();

        let config = std::fs::read_to_string(state.tree.join("boot/config.txt")).unwrap();
        assert!(config.contains("arm_freq=1000"));
    }

    #[test]
    fn installs_packages_then_sets_credential() {
        let (work, state, cfg) = setup();
        let runlog = RunLog::open(work.path().join("pistrap.log")).unwrap();
        let hal = FakeHal::new();
        let exec = Executor::new(&hal, &runlog, false);

        apply(&exec, &state, &cfg).unwrap();

        let ops = hal.operations();
        let update_pos = ops.iter().position(|op| matches!(op, Operation::Command { argv, .. }
            if argv[0] == "apt-get" && argv[1] == "update")).unwrap();
        let install_pos = ops.iter().position(|op| matches!(op, Operation::Command { argv, .. }
            if argv[0] == "apt-get" && argv[1] == "install"
                && argv.contains(&"fake-hwclock".to_string()))).unwrap();
        let passwd_pos = ops.iter().position(|op| matches!(op, Operation::Command { argv, chroot, .. }
            if argv[0] == "chpasswd" && chroot.is_some())).unwrap();
        assert!(update_pos < install_pos && install_pos < passwd_pos);
    }

    #[test]
    fn absent_pattern_leaves_file_byte_identical() {
        let (work, state, _cfg) = setup();
        let _ = work;
        let sshd = state.tree.join("etc/ssh");
        std::fs::create_dir_all(&sshd).unwrap();
        let path = sshd.join("sshd_config");
        let original = "PermitRootLogin yes\nUsePAM yes\n";
        std::fs::write(&path, original).unwrap();

        substitute(
            &state.tree,
            "etc/ssh/sshd_config",
            "#PasswordAuthentication yes",
            "PasswordAuthentication yes",
        );

        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn present_pattern_is_replaced() {
        let (work, state, _cfg) = setup();
        let _ = work;
        let sshd = state.tree.join("etc/ssh");
        std::fs::create_dir_all(&sshd).unwrap();
        let path = sshd.join("sshd_config");
        std::fs::write(&path, "#PermitRootLogin prohibit-password\n").unwrap();

        substitute(
            &state.tree,
            "etc/ssh/sshd_config",
            "#PermitRootLogin prohibit-password",
            "PermitRootLogin yes",
        );

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "PermitRootLogin yes\n"
        );
    }

    #[test]
    fn missing_file_substitution_is_a_no_op() {
        let (work, state, _cfg) = setup();
        let _ = work;
        substitute(&state.tree, "etc/dhcp/dhclient.conf", "timeout 60;", "timeout 10;");
    }
}
