use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle of a single backup run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A regular file found under the source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Path inside the archive, `/`-separated and relative to the source root
    pub relative_path: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct BackupRun {
    pub id: String,
    pub started_at: DateTime<Local>,
    pub completed_at: Option<DateTime<Local>>,
    pub files: Vec<DiscoveredFile>,
    pub total_files: u64,
    pub files_written: u64,
    /// Entries in the finished archive; skipped files are counted as written
    pub files_archived: u64,
    pub status: RunStatus,
    pub archive_path: Option<PathBuf>,
    pub skipped_files: Vec<PathBuf>,
    pub error: Option<String>,
}

impl BackupRun {
    pub fn new(started_at: DateTime<Local>) -> Self {
        Self {
            id: run_id(&started_at),
            started_at,
            completed_at: None,
            files: Vec::new(),
            total_files: 0,
            files_written: 0,
            files_archived: 0,
            status: RunStatus::Pending,
            archive_path: None,
            skipped_files: Vec::new(),
            error: None,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn percentage(&self) -> u8 {
        progress_percentage(self.files_written, self.total_files)
    }
}

/// Run ids double as archive timestamps: `YYYY-MM-DD_HH-MM-SS`
pub fn run_id(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// `floor(written / total * 100)`; an empty file set counts as done.
pub fn progress_percentage(written: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let written = written.min(total);
    ((written * 100) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_id_format() {
        let at = Local.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();
        let run = BackupRun::new(at);
        assert_eq!(run.id, "2025-03-07_09-05-01");
        assert_eq!(run.status, RunStatus::Pending);
    }

    #[test]
    fn test_progress_percentage_floors() {
        assert_eq!(progress_percentage(0, 3), 0);
        assert_eq!(progress_percentage(1, 3), 33);
        assert_eq!(progress_percentage(2, 3), 66);
        assert_eq!(progress_percentage(3, 3), 100);
        assert_eq!(progress_percentage(199, 200), 99);
    }

    #[test]
    fn test_progress_percentage_edge_cases() {
        assert_eq!(progress_percentage(0, 0), 100);
        assert_eq!(progress_percentage(5, 3), 100);
    }

    #[test]
    fn test_progress_is_monotonic_and_hits_100_only_at_end() {
        let total = 7;
        let mut last = 0;
        for written in 1..=total {
            let pct = progress_percentage(written, total);
            assert!(pct >= last);
            assert_eq!(pct == 100, written == total);
            last = pct;
        }
    }

    #[test]
    fn test_totals() {
        let mut run = BackupRun::new(Local::now());
        run.files = vec![
            DiscoveredFile {
                path: PathBuf::from("/src/a.txt"),
                relative_path: "a.txt".to_string(),
                size: 10,
            },
            DiscoveredFile {
                path: PathBuf::from("/src/sub/b.txt"),
                relative_path: "sub/b.txt".to_string(),
                size: 5,
            },
        ];
        run.total_files = 2;
        run.files_written = 1;

        assert_eq!(run.total_bytes(), 15);
        assert_eq!(run.percentage(), 50);
    }

    #[test]
    fn test_finished_statuses() {
        assert!(!RunStatus::Pending.is_finished());
        assert!(!RunStatus::Running.is_finished());
        assert!(RunStatus::Completed.is_finished());
        assert!(RunStatus::Failed.is_finished());
    }
}
