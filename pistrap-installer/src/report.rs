//! Persistent run report artifact.
//!
//! Written after teardown on every run, success or failure. Default path:
//! `pistrap-report.json` in the working directory (override via
//! `PISTRAP_REPORT_PATH` for tests).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_REPORT_PATH: &str = "pistrap-report.json";

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn report_path() -> PathBuf {
    std::env::var_os("PISTRAP_REPORT_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at_unix_ms: u64,
    pub finished_at_unix_ms: u64,
    pub device: String,
    pub suite: String,
    pub arch: String,
    pub dry_run: bool,
    /// Stages that ran to completion, in order.
    pub completed_stages: Vec<String>,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl RunReport {
    pub fn begin(device: &str, suite: &str, arch: &str, dry_run: bool) -> Self {
        Self {
            started_at_unix_ms: now_unix_ms(),
            finished_at_unix_ms: 0,
            device: device.to_string(),
            suite: suite.to_string(),
            arch: arch.to_string(),
            dry_run,
            completed_stages: Vec::new(),
            succeeded: false,
            error: None,
        }
    }

    pub fn finish(&mut self, completed_stages: Vec<String>, error: Option<String>) {
        self.finished_at_unix_ms = now_unix_ms();
        self.completed_stages = completed_stages;
        self.succeeded = error.is_none();
        self.error = error;
    }

    /// Best-effort write; a failed report never masks the run's own result.
    pub fn write(&self) {
        let path = report_path();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    log::warn!("Could not write run report to {}: {}", path.display(), e);
                }
            }
            Err(e) => log::warn!("Could not serialize run report: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_round_trips_through_json() {
        let mut report = RunReport::begin("/dev/sdc", "bookworm", "armhf", false);
        report.finish(
            vec!["partition".to_string(), "format".to_string()],
            Some("debootstrap failed".to_string()),
        );

        let json = serde_json::to_string(&report).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.completed_stages.len(), 2);
        assert!(!parsed.succeeded);
        assert_eq!(parsed.error.as_deref(), Some("debootstrap failed"));
    }

    #[test]
    fn successful_finish_clears_error() {
        let mut report = RunReport::begin("/dev/mmcblk0", "bookworm", "armhf", true);
        report.finish(vec!["partition".to_string()], None);
        assert!(report.succeeded);
        assert!(report.finished_at_unix_ms >= report.started_at_unix_ms);
    }
}
