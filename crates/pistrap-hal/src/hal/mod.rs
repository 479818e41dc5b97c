//! HAL trait definitions and implementations.
//!
//! This module defines the core traits for system operations and provides
//! both real (LinuxHal) and fake (FakeHal) implementations.

pub mod fake_hal;
pub mod format_ops;
pub mod linux_hal;
pub mod mount_ops;
pub mod partition_ops;
pub mod process_ops;
pub mod system_ops;

pub use fake_hal::{FakeHal, Operation};
pub use format_ops::{FormatOps, FormatOptions};
pub use linux_hal::LinuxHal;
pub use mount_ops::{MountOps, MountOptions};
pub use partition_ops::{PartitionOps, WipeOptions};
pub use process_ops::{CmdOutput, CmdSpec, ProcessOps};
pub use system_ops::SystemOps;

/// Complete HAL combining all system operation traits.
pub trait SystemHal:
    ProcessOps + MountOps + FormatOps + PartitionOps + SystemOps + Send + Sync
{
}

/// Automatically implement SystemHal for any type implementing all required traits.
impl<T> SystemHal for T where
    T: ProcessOps + MountOps + FormatOps + PartitionOps + SystemOps + Send + Sync
{
}
