//! pistrap system abstraction layer.
//!
//! Everything that touches the world — block devices, mounts, external
//! commands — goes through the traits in this crate so the provisioning
//! pipeline can be exercised in CI without root privileges or real
//! hardware.

mod error;
pub mod hal;
pub mod path;
pub mod procfs;

pub use error::{HalError, HalResult};
pub use hal::fake_hal::{FakeHal, Operation};
pub use hal::format_ops::{FormatOps, FormatOptions};
pub use hal::linux_hal::LinuxHal;
pub use hal::mount_ops::{MountOps, MountOptions};
pub use hal::partition_ops::{PartitionOps, WipeOptions};
pub use hal::process_ops::{CmdOutput, CmdSpec, ProcessOps};
pub use hal::system_ops::SystemOps;
pub use hal::SystemHal;
pub use path::partition_path;
