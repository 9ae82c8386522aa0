use crate::models::backup_run::{BackupRun, RunStatus};
use crate::models::resource_sample::ResourceSample;
use chrono::{DateTime, Local};
use std::path::PathBuf;

/// Everything the status panel shows at one point in time
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// Human-readable status line, e.g. "Backup scheduled: 14:30"
    pub message: String,
    pub run_status: Option<RunStatus>,
    pub percentage: u8,
    pub files_written: u64,
    pub total_files: u64,
    pub next_scheduled: Option<DateTime<Local>>,
    pub sample: Option<ResourceSample>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            message: "Waiting for configuration...".to_string(),
            run_status: None,
            percentage: 0,
            files_written: 0,
            total_files: 0,
            next_scheduled: None,
            sample: None,
        }
    }
}

/// Pushed to subscribers whenever run state changes
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub status: Option<RunStatus>,
    pub files_written: u64,
    pub total_files: u64,
    pub message: Option<String>,
}

/// Backup history entry
#[derive(Debug, Clone)]
pub struct RunHistoryEntry {
    pub id: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: RunStatus,
    pub files_archived: u64,
    pub skipped_files: usize,
    pub archive_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl From<&BackupRun> for RunHistoryEntry {
    fn from(run: &BackupRun) -> Self {
        Self {
            id: run.id.clone(),
            started_at: run.started_at.to_rfc3339(),
            completed_at: run.completed_at.map(|at| at.to_rfc3339()),
            status: run.status,
            files_archived: run.files_archived,
            skipped_files: run.skipped_files.len(),
            archive_path: run.archive_path.clone(),
            error: run.error.clone(),
        }
    }
}
