use crate::backup_service::BackupService;
use crate::models::backup_run::RunStatus;
use crate::models::resource_sample::describe_sample;
use crate::models::status::{ProgressEvent, StatusSnapshot};
use crate::utils::progress::{create_archive_progress_bar, create_spinner};
use indicatif::{MultiProgress, ProgressBar};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

/// Lines shown by the panel for one snapshot
pub fn render_snapshot(snapshot: &StatusSnapshot) -> Vec<String> {
    let next = snapshot
        .next_scheduled
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "not scheduled".to_string());

    let progress = match snapshot.run_status {
        Some(status) => format!(
            "Progress: {}% ({}/{} files, {})",
            snapshot.percentage, snapshot.files_written, snapshot.total_files, status
        ),
        None => "Progress: idle".to_string(),
    };

    let mut resources = describe_sample(snapshot.sample.as_ref());
    if snapshot.sample.is_some_and(|s| s.is_high()) {
        resources.push_str(" (high)");
    }

    vec![
        format!("Status: {}", snapshot.message),
        format!("Next backup: {}", next),
        progress,
        resources,
    ]
}

/// Terminal view of a [`BackupService`]: a status line refreshed on a timer
/// and a progress bar driven by progress events while a run is active.
pub struct StatusPanel {
    multi: MultiProgress,
    status_line: ProgressBar,
    run_bar: Option<ProgressBar>,
}

impl Default for StatusPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPanel {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let status_line = multi.add(create_spinner("Waiting for configuration..."));
        Self {
            multi,
            status_line,
            run_bar: None,
        }
    }

    #[cfg(test)]
    fn hidden() -> Self {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let status_line = multi.add(create_spinner("Waiting for configuration..."));
        Self {
            multi,
            status_line,
            run_bar: None,
        }
    }

    #[cfg(test)]
    fn run_bar(&self) -> Option<&ProgressBar> {
        self.run_bar.as_ref()
    }

    pub fn refresh(&self, snapshot: &StatusSnapshot) {
        self.status_line.set_message(render_snapshot(snapshot).join(" | "));
    }

    pub fn apply(&mut self, event: &ProgressEvent) {
        if let Some(message) = &event.message {
            self.status_line.set_message(message.clone());
        }
        match event.status {
            Some(RunStatus::Running) => {
                let bar = self.run_bar.get_or_insert_with(|| {
                    self.multi
                        .add(create_archive_progress_bar(event.total_files, "Archiving"))
                });
                bar.set_length(event.total_files);
                bar.set_position(event.files_written);
            }
            Some(status) if status.is_finished() => {
                if let Some(bar) = self.run_bar.take() {
                    bar.set_position(event.files_written);
                    let message = match status {
                        RunStatus::Completed => "Backup completed!".to_string(),
                        _ => "Backup failed".to_string(),
                    };
                    bar.finish_with_message(message);
                }
            }
            _ => {}
        }
    }

    /// Drives the panel until `shutdown` is set or the service goes away
    pub fn spawn(
        mut self,
        service: BackupService,
        refresh_interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        let mut events = service.subscribe_progress();
        thread::Builder::new()
            .name("status-panel".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    if !self.drain(&mut events) {
                        break;
                    }
                    self.refresh(&service.snapshot());
                    thread::sleep(refresh_interval);
                }
                self.status_line.finish_and_clear();
            })
    }

    /// Applies every pending event; false once the channel is closed
    fn drain(&mut self, events: &mut Receiver<ProgressEvent>) -> bool {
        loop {
            match events.try_recv() {
                Ok(event) => self.apply(&event),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Lagged(missed)) => {
                    debug!("Status panel skipped {} progress event(s)", missed)
                }
                Err(TryRecvError::Closed) => {
                    warn!("Progress channel closed, stopping status panel");
                    return false;
                }
            }
        }
    }
}
