use std::path::{Path, PathBuf};

/// Partition path helper for block devices. Handles nvme/mmcblk postfixing.
pub fn partition_path(disk: &Path, num: u32) -> PathBuf {
    let disk = disk.to_string_lossy();
    if disk.contains("nvme") || disk.contains("mmcblk") || disk.contains("loop") {
        PathBuf::from(format!("{}p{}", disk, num))
    } else {
        PathBuf::from(format!("{}{}", disk, num))
    }
}
