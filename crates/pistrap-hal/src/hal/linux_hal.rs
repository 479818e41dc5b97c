//! Linux HAL implementation using real system calls.

use super::{
    CmdOutput, CmdSpec, FormatOps, FormatOptions, MountOps, MountOptions, PartitionOps, ProcessOps,
    SystemOps, WipeOptions,
};
use crate::{HalError, HalResult};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Real HAL implementation for Linux systems.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal;

impl LinuxHal {
    pub fn new() -> Self {
        Self
    }
}

const ZERO_CHUNK: usize = 64 * 1024;

fn map_command_err(program: &str, err: std::io::Error) -> HalError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

fn output_failed(program: &str, output: &Output) -> HalError {
    HalError::CommandFailed {
        program: program.to_string(),
        code: output.status.code(),
        output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Run a command to completion with stdout/stderr captured, optionally
/// feeding `stdin` to the child. Blocks for the command's full duration.
fn captured_output(program: &str, cmd: &mut Command, stdin: Option<&str>) -> HalResult<Output> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;
    if let Some(payload) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(payload.as_bytes())?;
        }
    }
    child.wait_with_output().map_err(HalError::Io)
}

fn map_nix_err(err: nix::errno::Errno) -> HalError {
    use nix::errno::Errno;
    match err {
        Errno::EBUSY => HalError::DeviceBusy,
        Errno::EACCES | Errno::EPERM => HalError::PermissionDenied,
        other => HalError::Nix(other),
    }
}

impl ProcessOps for LinuxHal {
    fn run_command(&self, spec: &CmdSpec, dry_run: bool) -> HalResult<CmdOutput> {
        if spec.argv.is_empty() {
            return Err(HalError::Other("empty command argv".to_string()));
        }
        if dry_run {
            log::info!("DRY RUN: {}", spec.display_line());
            return Ok(CmdOutput {
                success: true,
                code: Some(0),
                output: String::new(),
            });
        }

        // A chrooted invocation runs through the chroot binary; the target's
        // binfmt handler routes foreign-architecture programs through the
        // emulator staged into the tree.
        let mut cmd = match &spec.chroot {
            Some(root) => {
                let mut cmd = Command::new("chroot");
                cmd.arg(root);
                cmd.args(&spec.argv);
                cmd
            }
            None => {
                let mut cmd = Command::new(spec.program());
                cmd.args(&spec.argv[1..]);
                cmd
            }
        };
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let program = if spec.chroot.is_some() {
            "chroot"
        } else {
            spec.program()
        };

        if spec.streamed {
            // Forward the child's output live so interactive prompts reach
            // the operator.
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            cmd.stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::inherit()
            });
            let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;
            if let Some(payload) = &spec.stdin {
                if let Some(mut pipe) = child.stdin.take() {
                    pipe.write_all(payload.as_bytes())?;
                }
            }
            let status = child.wait().map_err(HalError::Io)?;
            return Ok(CmdOutput {
                success: status.success(),
                code: status.code(),
                output: String::new(),
            });
        }

        let output = captured_output(program, &mut cmd, spec.stdin.as_deref())?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(stderr.trim_end());
        }
        Ok(CmdOutput {
            success: output.status.success(),
            code: output.status.code(),
            output: text,
        })
    }
}

impl PartitionOps for LinuxHal {
    fn zero_signature(&self, disk: &Path, len: u64, opts: &WipeOptions) -> HalResult<()> {
        if opts.dry_run {
            log::info!("DRY RUN: zero first {} bytes of {}", len, disk.display());
            return Ok(());
        }
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut out = fs::OpenOptions::new().write(true).open(disk)?;
        let chunk = vec![0u8; ZERO_CHUNK];
        let mut remaining = len;
        while remaining > 0 {
            let take = remaining.min(ZERO_CHUNK as u64) as usize;
            out.write_all(&chunk[..take])?;
            remaining -= take as u64;
        }
        // Best-effort flush (block devices may ignore).
        out.sync_all().ok();
        Ok(())
    }

    fn sfdisk_apply(&self, disk: &Path, script: &str, opts: &WipeOptions) -> HalResult<String> {
        if opts.dry_run {
            log::info!("DRY RUN: sfdisk {} <<\n{}", disk.display(), script);
            return Ok(String::new());
        }
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut cmd = Command::new("sfdisk");
        cmd.arg(disk);
        let output = captured_output("sfdisk", &mut cmd, Some(script))?;
        if !output.status.success() {
            return Err(output_failed("sfdisk", &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl FormatOps for LinuxHal {
    fn format_ext4(&self, device: &Path, opts: &FormatOptions) -> HalResult<()> {
        if opts.dry_run {
            log::info!("DRY RUN: mkfs.ext4 {}", device.display());
            return Ok(());
        }
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut args: Vec<String> = vec!["-F".to_string()];
        args.extend(opts.extra_args.iter().cloned());
        args.push(device.display().to_string());

        let mut cmd = Command::new("mkfs.ext4");
        cmd.args(&args);
        let output = captured_output("mkfs.ext4", &mut cmd, None)?;
        if !output.status.success() {
            return Err(output_failed("mkfs.ext4", &output));
        }
        Ok(())
    }

    fn format_vfat(&self, device: &Path, label: &str, opts: &FormatOptions) -> HalResult<()> {
        if opts.dry_run {
            log::info!("DRY RUN: mkfs.vfat {} ({})", device.display(), label);
            return Ok(());
        }
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut args: Vec<String> = vec!["-F".to_string(), "32".to_string()];
        args.push("-n".to_string());
        args.push(label.to_string());
        args.extend(opts.extra_args.iter().cloned());
        args.push(device.display().to_string());

        let mut cmd = Command::new("mkfs.vfat");
        cmd.args(&args);
        let output = captured_output("mkfs.vfat", &mut cmd, None)?;
        if !output.status.success() {
            return Err(output_failed("mkfs.vfat", &output));
        }
        Ok(())
    }
}

impl MountOps for LinuxHal {
    fn mount_device(
        &self,
        source: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: MountOptions,
        dry_run: bool,
    ) -> HalResult<()> {
        if dry_run {
            log::info!(
                "DRY RUN: mount {} -> {}",
                source.display(),
                target.display()
            );
            return Ok(());
        }

        let flags = nix::mount::MsFlags::empty();
        let data = options.options.as_deref();
        nix::mount::mount(Some(source), target, fstype, flags, data).map_err(map_nix_err)?;
        Ok(())
    }

    fn unmount(&self, target: &Path, dry_run: bool) -> HalResult<()> {
        if dry_run {
            log::info!("DRY RUN: unmount {}", target.display());
            return Ok(());
        }

        nix::mount::umount2(target, nix::mount::MntFlags::empty()).map_err(map_nix_err)?;
        Ok(())
    }

    fn unmount_force(&self, target: &Path, dry_run: bool) -> HalResult<()> {
        if dry_run {
            log::info!("DRY RUN: unmount -l {}", target.display());
            return Ok(());
        }

        nix::mount::umount2(target, nix::mount::MntFlags::MNT_DETACH).map_err(map_nix_err)?;
        Ok(())
    }

    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        let content = fs::read_to_string("/proc/self/mountinfo")?;
        let entries = crate::procfs::parse_mountinfo(&content);
        Ok(crate::procfs::is_mounted_from_info(path, &entries))
    }
}

impl SystemOps for LinuxHal {
    fn sync(&self) -> HalResult<()> {
        let mut cmd = Command::new("sync");
        let output = captured_output("sync", &mut cmd, None)?;
        if !output.status.success() {
            return Err(output_failed("sync", &output));
        }
        Ok(())
    }

    fn udev_settle(&self) -> HalResult<()> {
        let mut cmd = Command::new("udevadm");
        cmd.arg("settle");
        let output = captured_output("udevadm", &mut cmd, None)?;
        if !output.status.success() {
            return Err(output_failed("udevadm", &output));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn format_ext4_requires_confirmation() {
        let hal = LinuxHal::new();
        let opts = FormatOptions::new(false, false);
        let err = hal.format_ext4(Path::new("/dev/null"), &opts).unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));
    }

    #[test]
    fn zero_signature_requires_confirmation() {
        let hal = LinuxHal::new();
        let opts = WipeOptions::new(false, false);
        let err = hal
            .zero_signature(Path::new("/dev/null"), 1024, &opts)
            .unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));
    }

    #[test]
    fn zero_signature_writes_zeros_to_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("disk.img");
        std::fs::write(&target, vec![0xffu8; 4096]).unwrap();

        let hal = LinuxHal::new();
        hal.zero_signature(&target, 4096, &WipeOptions::new(false, true))
            .unwrap();

        let content = std::fs::read(&target).unwrap();
        assert!(content.iter().all(|&b| b == 0));
    }

    #[test]
    fn run_command_captures_output() {
        let hal = LinuxHal::new();
        let spec = CmdSpec {
            argv: vec!["echo".to_string(), "hello".to_string()],
            ..Default::default()
        };
        let out = hal.run_command(&spec, false).unwrap();
        assert!(out.success);
        assert_eq!(out.output.trim(), "hello");
    }

    #[test]
    fn run_command_reports_missing_program() {
        let hal = LinuxHal::new();
        let spec = CmdSpec {
            argv: vec!["pistrap-no-such-binary".to_string()],
            ..Default::default()
        };
        let err = hal.run_command(&spec, false).unwrap_err();
        assert!(matches!(err, HalError::CommandNotFound(_)));
    }

    #[test]
    fn run_command_feeds_stdin() {
        let hal = LinuxHal::new();
        let spec = CmdSpec {
            argv: vec!["cat".to_string()],
            stdin: Some("label: dos\n".to_string()),
            ..Default::default()
        };
        let out = hal.run_command(&spec, false).unwrap();
        assert!(out.success);
        assert_eq!(out.output, "label: dos\n");
    }

    #[test]
    fn dry_run_skips_execution() {
        let hal = LinuxHal::new();
        let spec = CmdSpec {
            argv: vec!["pistrap-no-such-binary".to_string()],
            ..Default::default()
        };
        let out = hal.run_command(&spec, true).unwrap();
        assert!(out.success);
    }
}
