//! Process execution trait.
//!
//! External commands are considered "world-touching" and must go through the
//! HAL so workflows can be tested without spawning real processes.

use crate::HalResult;
use std::path::PathBuf;

/// A fully structured command invocation.
///
/// The argv is always a vector of discrete arguments; callers never hand the
/// HAL an interpolated shell string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdSpec {
    pub argv: Vec<String>,
    /// Run the command inside `chroot <root>`.
    pub chroot: Option<PathBuf>,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
    /// Text fed to the child's stdin (e.g. an `sfdisk` script).
    pub stdin: Option<String>,
    /// Stream output live instead of capturing it. Used for commands that
    /// prompt the operator (dpkg-reconfigure and friends).
    pub streamed: bool,
}

impl CmdSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    /// Render the invocation for logs, chroot prefix included.
    pub fn display_line(&self) -> String {
        let mut parts = Vec::new();
        if let Some(root) = &self.chroot {
            parts.push(format!("chroot {}", root.display()));
        }
        parts.extend(self.argv.iter().cloned());
        parts.join(" ")
    }
}

/// Result of one external command. A non-zero exit is not a `HalError`;
/// the caller decides whether that is fatal.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// Captured stdout+stderr; empty in streamed mode.
    pub output: String,
}

/// Process execution trait (external command runner).
pub trait ProcessOps {
    /// Run one command to completion, blocking for its full duration.
    ///
    /// Spawn failures (program missing, fork error) surface as `Err`;
    /// the command exiting non-zero surfaces as `Ok` with `success: false`.
    fn run_command(&self, spec: &CmdSpec, dry_run: bool) -> HalResult<CmdOutput>;
}
