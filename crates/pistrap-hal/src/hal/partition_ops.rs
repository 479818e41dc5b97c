//! Partition-table operations (signature wipe + sfdisk transaction).

use crate::HalResult;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct WipeOptions {
    pub dry_run: bool,
    pub confirmed: bool,
}

impl WipeOptions {
    pub fn new(dry_run: bool, confirmed: bool) -> Self {
        Self { dry_run, confirmed }
    }
}

pub trait PartitionOps {
    /// Overwrite the first `len` bytes of the device with zeros, destroying
    /// any existing partition-table signature. Irreversible.
    fn zero_signature(&self, disk: &Path, len: u64, opts: &WipeOptions) -> HalResult<()>;

    /// Apply a complete partition layout in one `sfdisk` transaction. The
    /// script is the standard sfdisk dump format: a `label:` header followed
    /// by one `start,size,type` line per partition.
    fn sfdisk_apply(&self, disk: &Path, script: &str, opts: &WipeOptions) -> HalResult<String>;
}
