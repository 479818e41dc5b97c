//! pistrap - bootable Debian SD cards for Raspberry Pi.
//!
//! The host (usually x86) partitions and formats the card, runs a
//! two-stage foreign debootstrap (host-native unpack, then emulated
//! in-target completion), customizes the target configuration and
//! installs the Raspberry Pi kernel/firmware extras. Every mount the
//! pipeline acquires is tracked and released in reverse order on every
//! exit path.

pub mod cli;
pub mod config;
pub mod confirm;
pub mod errors;
pub mod executor;
pub mod interrupt;
pub mod logging;
pub mod partitions;
pub mod pipeline;
pub mod preflight;
pub mod report;
pub mod runlog;
