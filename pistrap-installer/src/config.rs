//! Provisioning run configuration.

use crate::partitions::PartitionSpec;
use std::path::PathBuf;

/// Base package set every card gets; `--packages` appends to this.
pub const BASE_PACKAGES: &[&str] = &[
    "fake-hwclock",
    "binutils",
    "parted",
    "lua5.1",
    "triggerhappy",
    "ca-certificates",
    "curl",
];

pub const DEFAULT_SUITE: &str = "bookworm";
pub const DEFAULT_MIRROR: &str = "http://deb.debian.org/debian";
pub const DEFAULT_ARCH: &str = "armhf";
pub const DEFAULT_QEMU: &str = "/usr/bin/qemu-arm-static";
pub const DEFAULT_HOSTNAME: &str = "raspberrypi";
pub const DEFAULT_ROOT_PASSWORD: &str = "raspberry";

pub const RPI_UPDATE_URL: &str =
    "https://raw.githubusercontent.com/Hexxeh/rpi-update/master/rpi-update";
pub const RASPI_CONFIG_URL: &str =
    "https://raw.githubusercontent.com/RPi-Distro/raspi-config/master/raspi-config";

/// Everything one provisioning run needs. Built once from the CLI and passed
/// by reference into every stage.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Target block device (the whole card, e.g. `/dev/sdc`).
    pub device: PathBuf,
    pub hostname: String,
    pub partitions: Vec<PartitionSpec>,
    pub packages: Vec<String>,
    pub suite: String,
    pub mirror: String,
    /// Foreign architecture to bootstrap (debootstrap `--arch`).
    pub arch: String,
    /// User-mode emulator binary copied into the tree for stage 2.
    pub qemu_binary: PathBuf,
    pub rpi_update_url: String,
    pub raspi_config_url: String,
    pub root_password: String,
    /// Write the performance-tuning boot configuration.
    pub tuning: bool,
    pub dry_run: bool,
    /// Set once the operator passes the confirmation gate. Destructive HAL
    /// calls refuse to run while this is false.
    pub confirmed: bool,
}

impl ProvisionConfig {
    pub fn new(device: impl Into<PathBuf>, partitions: Vec<PartitionSpec>) -> Self {
        Self {
            device: device.into(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            partitions,
            packages: BASE_PACKAGES.iter().map(|s| s.to_string()).collect(),
            suite: DEFAULT_SUITE.to_string(),
            mirror: DEFAULT_MIRROR.to_string(),
            arch: DEFAULT_ARCH.to_string(),
            qemu_binary: PathBuf::from(DEFAULT_QEMU),
            rpi_update_url: RPI_UPDATE_URL.to_string(),
            raspi_config_url: RASPI_CONFIG_URL.to_string(),
            root_password: DEFAULT_ROOT_PASSWORD.to_string(),
            tuning: false,
            dry_run: false,
            confirmed: false,
        }
    }

    pub fn with_extra_packages(mut self, extra: &[String]) -> Self {
        self.packages.extend(extra.iter().cloned());
        self
    }
}
