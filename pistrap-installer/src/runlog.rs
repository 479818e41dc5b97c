//! Append-only audit log for one provisioning run.
//!
//! Every executed command and every progress note is appended here. The
//! file is never read back by the pipeline; it exists for post-mortem
//! inspection.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    /// Open (or create) the log and append this run's timestamp header.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open run log {}", path.display()))?;
        writeln!(file, "===== pistrap run @ {} unix-ms =====", now_unix_ms())
            .context("Failed to write run log header")?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a free-form progress note. Best-effort: a failing audit log
    /// never takes the run down.
    pub fn note(&self, message: &str) {
        let mut file = self.file.lock().unwrap();
        if let Err(err) = writeln!(file, "{}", message) {
            log::warn!("run log write failed: {}", err);
        }
    }

    /// Append one executed command with its exit status and captured output.
    pub fn command(&self, line: &str, code: Option<i32>, output: &str) {
        let mut file = self.file.lock().unwrap();
        let status = match code {
            Some(code) => format!("exit={}", code),
            None => "exit=?".to_string(),
        };
        let result = writeln!(file, "$ {}  [{}]", line, status).and_then(|_| {
            if output.trim().is_empty() {
                Ok(())
            } else {
                writeln!(file, "{}", output.trim_end())
            }
        });
        if let Err(err) = result {
            log::warn!("run log write failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_appends_header_and_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pistrap.log");

        let log = RunLog::open(&path).unwrap();
        log.note("Partitioning /dev/sdc.");
        log.command("sfdisk /dev/sdc", Some(0), "Created a new DOS disklabel");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("===== pistrap run @ "));
        assert!(content.contains("Partitioning /dev/sdc."));
        assert!(content.contains("$ sfdisk /dev/sdc  [exit=0]"));
        assert!(content.contains("Created a new DOS disklabel"));
    }

    #[test]
    fn reopen_appends_second_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pistrap.log");

        drop(RunLog::open(&path).unwrap());
        drop(RunLog::open(&path).unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("===== pistrap run @ ").count(), 2);
    }
}
