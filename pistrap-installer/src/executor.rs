//! Command execution layer.
//!
//! Wraps the HAL process runner with run-log auditing and per-call
//! failure policy. Commands are built from structured arguments, never
//! from interpolated shell strings.

use crate::errors::PistrapError;
use crate::runlog::RunLog;
use anyhow::Result;
use pistrap_hal::{CmdSpec, ProcessOps};
use std::path::Path;

/// Per-call failure policy.
///
/// `Fatal` aborts the run (after teardown) with an error banner naming the
/// captured output; `Soft` hands the failed outcome back to the caller —
/// used for dependency probing and best-effort cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Fatal,
    Soft,
}

/// Result of one executed command.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub succeeded: bool,
    pub code: Option<i32>,
    pub output: String,
}

/// Typed command builder producing an argument vector.
#[derive(Debug, Clone, Default)]
pub struct Cmd {
    spec: CmdSpec,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            spec: CmdSpec {
                argv: vec![program.into()],
                ..Default::default()
            },
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.spec.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command inside a chroot at `root`.
    pub fn chroot(mut self, root: impl AsRef<Path>) -> Self {
        self.spec.chroot = Some(root.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.spec.stdin = Some(payload.into());
        self
    }

    /// Stream output live instead of capturing it.
    pub fn streamed(mut self) -> Self {
        self.spec.streamed = true;
        self
    }

    pub fn into_spec(self) -> CmdSpec {
        self.spec
    }
}

pub struct Executor<'a, H: ProcessOps + ?Sized> {
    hal: &'a H,
    runlog: &'a RunLog,
    dry_run: bool,
}

impl<'a, H: ProcessOps + ?Sized> Executor<'a, H> {
    pub fn new(hal: &'a H, runlog: &'a RunLog, dry_run: bool) -> Self {
        Self {
            hal,
            runlog,
            dry_run,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn runlog(&self) -> &RunLog {
        self.runlog
    }

    /// Run one external command exactly once. No retries: transient and
    /// permanent failures are treated alike. A pending interrupt aborts
    /// before the command starts, so the run unwinds into teardown.
    pub fn execute(&self, cmd: Cmd, policy: Policy) -> Result<Outcome> {
        crate::interrupt::checkpoint()?;
        let spec = cmd.into_spec();
        let line = spec.display_line();

        match self.hal.run_command(&spec, self.dry_run) {
            Ok(out) => {
                self.runlog.command(&line, out.code, &out.output);
                if out.success {
                    return Ok(Outcome {
                        succeeded: true,
                        code: out.code,
                        output: out.output,
                    });
                }
                self.failed(policy, &line, out.code, out.output)
            }
            // Spawn failures (program missing etc.) classify like any other
            // command failure.
            Err(err) => {
                let text = err.to_string();
                self.runlog.command(&line, None, &text);
                self.failed(policy, &line, None, text)
            }
        }
    }

    fn failed(
        &self,
        policy: Policy,
        line: &str,
        code: Option<i32>,
        output: String,
    ) -> Result<Outcome> {
        match policy {
            Policy::Soft => {
                log::warn!("command failed (soft): {}", line);
                Ok(Outcome {
                    succeeded: false,
                    code,
                    output,
                })
            }
            Policy::Fatal => {
                let banner = render_banner(line, &output);
                eprintln!("{}", banner);
                self.runlog.note(&banner);
                Err(PistrapError::CommandFailed(line.to_string()).into())
            }
        }
    }
}

/// Bordered error banner naming the failing command and its captured output.
fn render_banner(line: &str, output: &str) -> String {
    let border = "#".repeat(72);
    let mut banner = String::new();
    banner.push_str(&border);
    banner.push('\n');
    banner.push_str(&format!("# ERROR: {}\n", line));
    for text_line in output.lines().filter(|l| !l.trim().is_empty()) {
        banner.push_str(&format!("# {}\n", text_line.trim_end()));
    }
    banner.push_str(&border);
    banner
}

#[cfg(test)]
mod tests {
    use super::*;
    use pistrap_hal::FakeHal;
    use tempfile::tempdir;

    fn test_runlog(dir: &tempfile::TempDir) -> RunLog {
        RunLog::open(dir.path().join("pistrap.log")).unwrap()
    }

    #[test]
    fn soft_failure_returns_outcome() {
        let dir = tempdir().unwrap();
        let runlog = test_runlog(&dir);
        let hal = FakeHal::new();
        hal.fail_commands_matching("umount");

        let exec = Executor::new(&hal, &runlog, false);
        let outcome = exec
            .execute(Cmd::new("umount").arg("/mnt/tree"), Policy::Soft)
            .unwrap();

        assert!(!outcome.succeeded);
        assert_eq!(outcome.code, Some(1));
    }

    #[test]
    fn fatal_failure_returns_error() {
        let dir = tempdir().unwrap();
        let runlog = test_runlog(&dir);
        let hal = FakeHal::new();
        hal.fail_commands_matching("debootstrap");

        let exec = Executor::new(&hal, &runlog, false);
        let err = exec
            .execute(Cmd::new("debootstrap").arg("--foreign"), Policy::Fatal)
            .unwrap_err();

        assert!(err
            .downcast_ref::<PistrapError>()
            .is_some_and(|e| matches!(e, PistrapError::CommandFailed(_))));
    }

    #[test]
    fn commands_are_appended_to_runlog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pistrap.log");
        let runlog = RunLog::open(&path).unwrap();
        let hal = FakeHal::new();
        hal.set_command_output("sfdisk", "Created a new partition 1");

        let exec = Executor::new(&hal, &runlog, false);
        exec.execute(
            Cmd::new("sfdisk").arg("/dev/sdc").stdin("label: dos\n"),
            Policy::Fatal,
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("$ sfdisk /dev/sdc  [exit=0]"));
        assert!(content.contains("Created a new partition 1"));
    }

    #[test]
    fn chroot_commands_render_with_prefix() {
        let cmd = Cmd::new("ldconfig").chroot("/tmp/tree");
        assert_eq!(cmd.into_spec().display_line(), "chroot /tmp/tree ldconfig");
    }

    #[test]
    fn banner_contains_captured_output() {
        let banner = render_banner("debootstrap --foreign", "E: no such suite");
        assert!(banner.contains("ERROR: debootstrap --foreign"));
        assert!(banner.contains("E: no such suite"));
        assert!(banner.starts_with('#'));
    }
}
