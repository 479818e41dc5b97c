//! Partition layout specification and sfdisk script rendering.

use crate::errors::PistrapError;
use anyhow::Result;

/// Filesystem kinds the provisioner can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Vfat,
    Ext4,
}

impl FsKind {
    pub fn mount_type(self) -> &'static str {
        match self {
            FsKind::Vfat => "vfat",
            FsKind::Ext4 => "ext4",
        }
    }
}

/// One partition to create, applied in list order to a freshly zeroed
/// partition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    /// Start offset; `None` = immediately after the previous partition.
    pub start: Option<String>,
    /// Size; `None` = remainder of the device.
    pub size: Option<String>,
    /// MBR partition type code (e.g. `"e"`, `"83"`).
    pub type_code: String,
    pub fs: FsKind,
    /// Mount path relative to the tree root (`"/"`, `"/boot"`, ...).
    pub mount: String,
}

/// The stock Raspberry Pi layout: a FAT boot partition of the given size
/// followed by an ext4 root consuming the rest of the card.
pub fn default_layout(boot_size_mib: u32) -> Vec<PartitionSpec> {
    vec![
        PartitionSpec {
            start: None,
            size: Some(format!("{}MiB", boot_size_mib)),
            type_code: "e".to_string(),
            fs: FsKind::Vfat,
            mount: "/boot".to_string(),
        },
        PartitionSpec {
            start: None,
            size: None,
            type_code: "83".to_string(),
            fs: FsKind::Ext4,
            mount: "/".to_string(),
        },
    ]
}

/// Check the layout invariants: at least one partition, distinct mount
/// paths, exactly one root (`/`) entry.
pub fn validate_specs(specs: &[PartitionSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(PistrapError::ValidationFailed("empty partition layout".to_string()).into());
    }

    let mut seen = std::collections::HashSet::new();
    for spec in specs {
        if !spec.mount.starts_with('/') {
            return Err(PistrapError::ValidationFailed(format!(
                "mount path must be absolute: {}",
                spec.mount
            ))
            .into());
        }
        if !seen.insert(spec.mount.as_str()) {
            return Err(PistrapError::ValidationFailed(format!(
                "duplicate mount path: {}",
                spec.mount
            ))
            .into());
        }
    }

    let roots = specs.iter().filter(|s| s.mount == "/").count();
    if roots != 1 {
        return Err(PistrapError::ValidationFailed(format!(
            "layout must contain exactly one root mount, found {}",
            roots
        ))
        .into());
    }

    Ok(())
}

/// Render the layout as one sfdisk transaction script. Empty start and size
/// fields carry sfdisk's own semantics: next free sector and remainder of
/// the device.
pub fn render_sfdisk_script(specs: &[PartitionSpec]) -> String {
    let mut script = String::from("label: dos\n");
    for spec in specs {
        script.push_str(&format!(
            "{},{},{}\n",
            spec.start.as_deref().unwrap_or(""),
            spec.size.as_deref().unwrap_or(""),
            spec.type_code
        ));
    }
    script
}

/// Mount order: the root tree first, then nested paths by depth, since
/// nested mount points live inside the root tree's directory namespace.
pub fn mount_order(specs: &[PartitionSpec]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..specs.len()).collect();
    order.sort_by_key(|&i| mount_depth(&specs[i].mount));
    order
}

fn mount_depth(mount: &str) -> usize {
    if mount == "/" {
        0
    } else {
        mount.trim_matches('/').split('/').count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_boot_plus_root() {
        let specs = default_layout(100);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].mount, "/boot");
        assert_eq!(specs[0].size.as_deref(), Some("100MiB"));
        assert_eq!(specs[1].mount, "/");
        assert!(specs[1].size.is_none());
        validate_specs(&specs).unwrap();
    }

    #[test]
    fn script_renders_one_line_per_partition() {
        let script = render_sfdisk_script(&default_layout(100));
        assert_eq!(script, "label: dos\n,100MiB,e\n,,83\n");
    }

    #[test]
    fn validate_rejects_duplicate_mounts() {
        let mut specs = default_layout(100);
        specs[0].mount = "/".to_string();
        assert!(validate_specs(&specs).is_err());
    }

    #[test]
    fn validate_requires_exactly_one_root() {
        let mut specs = default_layout(100);
        specs[1].mount = "/home".to_string();
        assert!(validate_specs(&specs).is_err());

        assert!(validate_specs(&[]).is_err());
    }

    #[test]
    fn mount_order_puts_root_first() {
        let specs = default_layout(100);
        let order = mount_order(&specs);
        assert_eq!(specs[order[0]].mount, "/");
        assert_eq!(specs[order[1]].mount, "/boot");
    }
}
