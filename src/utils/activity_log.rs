use chrono::{DateTime, Local};
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const BACKUP_STARTED: &str = "Iniciando backup...";
pub const BACKUP_COMPLETED: &str = "Backup concluído";
pub const BACKUP_FAILED: &str = "Falha no backup";

/// Append-only, human-readable log of backup activity.
/// Every line is `YYYY-MM-DD HH:MM:SS - <message>`.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a line, creating the parent directory when needed
    pub fn append(&self, message: &str) -> std::io::Result<()> {
        let line = format_line(&Local::now(), message);
        // Poisoning only means another writer panicked mid-line; keep appending
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// Appends a line and mirrors it to the console logger. Write failures
    /// are reported but never interrupt the caller.
    pub fn record(&self, message: &str) {
        info!("{}", message);
        if let Err(e) = self.append(message) {
            warn!(
                "Failed to write activity log {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

pub fn format_line(at: &DateTime<Local>, message: &str) -> String {
    format!("{} - {}\n", at.format("%Y-%m-%d %H:%M:%S"), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_format_line() {
        let at = Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            format_line(&at, BACKUP_STARTED),
            "2025-01-02 03:04:05 - Iniciando backup...\n"
        );
    }

    #[test]
    fn test_append_creates_parent_and_appends() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path().join("assets").join("log.txt"));

        log.append("first").unwrap();
        log.append("second").unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - first"));
        assert!(lines[1].ends_with(" - second"));
        // "YYYY-MM-DD HH:MM:SS" prefix
        assert_eq!(lines[0].find(" - "), Some(19));
    }

    #[test]
    fn test_record_swallows_write_errors() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        // Parent is a regular file, so the directory cannot be created
        let log = ActivityLog::new(blocker.join("log.txt"));

        log.record("ignored");
        assert!(log.append("fails").is_err());
    }
}
