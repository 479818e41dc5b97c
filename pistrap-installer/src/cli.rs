//! CLI argument parsing for pistrap.

use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "pistrap")]
#[command(about = "🍓 pistrap - Debian SD card provisioner for Raspberry Pi")]
#[command(long_about = "🍓 pistrap - Debian SD card provisioner for Raspberry Pi\n\n\
    Partitions an SD card, bootstraps a minimal Debian system onto it with\n\
    debootstrap and qemu user-mode emulation, and installs the Raspberry Pi\n\
    kernel and firmware. Run as root on the host machine.")]
pub struct Cli {
    /// Target SD card block device (e.g., /dev/sdc, /dev/mmcblk0)
    pub sdcard: PathBuf,

    /// Comma separated list of additional packages to install
    #[arg(short, long, value_delimiter = ',')]
    pub packages: Vec<String>,

    /// Boot partition size in MiB
    #[arg(long, default_value_t = 100)]
    pub boot_size: u32,

    /// Write performance-tuning settings to the boot configuration
    #[arg(long)]
    pub tuning: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Log commands without touching the device
    #[arg(long)]
    pub dry_run: bool,

    /// Confirm destructive operation (skips the typed confirmation gate)
    #[arg(long)]
    pub yes_i_know: bool,
}

/// A `p<digits>` suffix that follows the base name's trailing digit, as in
/// `mmcblk0p2` or `nvme0n1p1`. The `p` in `loop0` does not count: it is
/// part of the base name, not a partition marker.
fn has_partition_suffix(name: &str) -> bool {
    let Some(pos) = name.rfind('p') else {
        return false;
    };
    let digits = &name[pos + 1..];
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && name[..pos].chars().last().is_some_and(|c| c.is_ascii_digit())
}

/// Reject anything that is not a whole-disk style device path. Partition
/// suffixes (`/dev/sdc1`, `/dev/mmcblk0p2`) are refused so the operator does
/// not hand over a single partition by mistake.
pub fn validate_device_path(device: &Path) -> Result<(), String> {
    let raw = device.to_string_lossy();
    if !raw.starts_with("/dev/") {
        return Err(format!("{} is not under /dev", raw));
    }
    let name = match device.file_name() {
        Some(n) => n.to_string_lossy().into_owned(),
        None => return Err(format!("{} has no device name", raw)),
    };
    if name.is_empty() {
        return Err(format!("{} has no device name", raw));
    }
    if name.starts_with("mmcblk") || name.starts_with("nvme") || name.starts_with("loop") {
        if has_partition_suffix(&name) {
            return Err(format!(
                "{} looks like a partition, not a whole device",
                raw
            ));
        }
    } else if name.chars().last().is_some_and(|c| c.is_ascii_digit()) {
        return Err(format!(
            "{} looks like a partition, not a whole device",
            raw
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_whole_disks() {
        assert!(validate_device_path(Path::new("/dev/sdc")).is_ok());
        assert!(validate_device_path(Path::new("/dev/mmcblk0")).is_ok());
        assert!(validate_device_path(Path::new("/dev/nvme0n1")).is_ok());
        assert!(validate_device_path(Path::new("/dev/loop0")).is_ok());
    }

    #[test]
    fn rejects_partitions() {
        assert!(validate_device_path(Path::new("/dev/sdc1")).is_err());
        assert!(validate_device_path(Path::new("/dev/mmcblk0p2")).is_err());
        assert!(validate_device_path(Path::new("/dev/nvme0n1p1")).is_err());
        assert!(validate_device_path(Path::new("/dev/loop0p1")).is_err());
    }

    #[test]
    fn rejects_non_dev_paths() {
        assert!(validate_device_path(Path::new("/tmp/card")).is_err());
        assert!(validate_device_path(Path::new("sdc")).is_err());
    }

    #[test]
    fn parses_package_list() {
        let cli = Cli::parse_from(["pistrap", "/dev/sdc", "-p", "vim,htop"]);
        assert_eq!(cli.packages, vec!["vim", "htop"]);
        assert_eq!(cli.boot_size, 100);
    }
}
