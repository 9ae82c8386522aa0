use crate::models::backup_run::{BackupRun, RunStatus};
use crate::models::config::{BackupConfig, Config};
use crate::models::error::{BackupError, Result};
use crate::models::resource_sample::ResourceSample;
use crate::models::status::{ProgressEvent, RunHistoryEntry, StatusSnapshot};
use crate::service::backup::run_backup;
use crate::service::monitor::{ProcessSampler, ResourceMonitor};
use crate::service::scheduler::Scheduler;
use crate::utils::activity_log::ActivityLog;
use chrono::{DateTime, Local};
use log::{debug, warn};
use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::broadcast;

/// Maximum number of history entries to keep in memory
const MAX_HISTORY_ENTRIES: usize = 100;

/// Capacity of each progress subscriber's channel
const PROGRESS_CHANNEL_CAPACITY: usize = 100;

/// Timing knobs for the background work
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub poll_interval: Duration,
    pub monitor_ui_interval: Duration,
    pub monitor_log_interval: Duration,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.scheduler_poll_interval(),
            monitor_ui_interval: config.monitor_ui_interval(),
            monitor_log_interval: config.monitor_log_interval(),
        }
    }
}

/// State of the active or most recent run, as shown to the user
#[derive(Debug, Clone)]
struct RunState {
    message: String,
    status: Option<RunStatus>,
    files_written: u64,
    total_files: u64,
    percentage: u8,
    sample: Option<ResourceSample>,
}

impl Default for RunState {
    fn default() -> Self {
        let snapshot = StatusSnapshot::default();
        Self {
            message: snapshot.message,
            status: None,
            files_written: 0,
            total_files: 0,
            percentage: 0,
            sample: None,
        }
    }
}

/// Owns the backup configuration, the daily schedule, the current run and
/// the resource monitor output. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct BackupService {
    /// Current configuration (None until configured)
    config: Arc<Mutex<Option<BackupConfig>>>,

    settings: ServiceSettings,

    state: Arc<Mutex<RunState>>,

    /// Held for the whole duration of a run so runs never overlap
    run_lock: Arc<Mutex<()>>,

    running: Arc<AtomicBool>,

    history: Arc<Mutex<VecDeque<RunHistoryEntry>>>,

    progress_subscribers: Arc<Mutex<Vec<broadcast::Sender<ProgressEvent>>>>,

    scheduler: Scheduler,

    activity_log: ActivityLog,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BackupService {
    pub fn new(settings: ServiceSettings, activity_log: ActivityLog) -> Self {
        Self {
            config: Arc::new(Mutex::new(None)),
            settings,
            state: Arc::new(Mutex::new(RunState::default())),
            run_lock: Arc::new(Mutex::new(())),
            running: Arc::new(AtomicBool::new(false)),
            history: Arc::new(Mutex::new(VecDeque::new())),
            progress_subscribers: Arc::new(Mutex::new(Vec::new())),
            scheduler: Scheduler::new(),
            activity_log,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ServiceSettings::from(config),
            ActivityLog::new(&config.activity_log_file),
        )
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.activity_log
    }

    /// Get the current backup configuration
    pub fn get_config(&self) -> Option<BackupConfig> {
        lock(&self.config).clone()
    }

    /// Validates the user inputs, stores them and arms the daily trigger,
    /// replacing any earlier one. Returns the next fire time.
    pub fn configure(&self, config: &Config) -> Result<DateTime<Local>> {
        let backup = config.backup_config()?;

        fs::create_dir_all(&backup.destination).map_err(|cause| {
            BackupError::DestinationCreate {
                path: backup.destination.clone(),
                cause,
            }
        })?;

        let next_fire = self.scheduler.arm(backup.time)?;
        let time = backup.time;
        *lock(&self.config) = Some(backup);

        self.activity_log
            .record(&format!("Backup agendado para {}.", time));
        self.set_message(format!("Backup scheduled: {}", time));
        Ok(next_fire)
    }

    pub fn next_scheduled(&self) -> Option<DateTime<Local>> {
        self.scheduler.next_fire()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Blocks until the active run, if any, has finished
    pub fn wait_for_active_run(&self) {
        drop(lock(&self.run_lock));
    }

    /// Manual trigger: runs a backup on the calling thread. The daily
    /// schedule is left as configured.
    pub fn run_now(&self) -> Result<BackupRun> {
        let started = Local::now().format("%H:%M").to_string();
        if lock(&self.config).is_none() {
            return Err(BackupError::NotConfigured);
        }
        self.activity_log
            .record(&format!("Backup manual iniciado às {}.", started));
        self.set_message(format!("Backup started at {}", started));
        self.execute_run()
    }

    /// Manual trigger on its own thread, so the caller can keep the
    /// scheduler going and join the run later
    pub fn spawn_manual_run(&self) -> std::io::Result<JoinHandle<Result<BackupRun>>> {
        let service = self.clone();
        thread::Builder::new()
            .name("manual-backup".to_string())
            .spawn(move || service.run_now())
    }

    /// Runs a backup on a background thread
    pub fn spawn_run(&self) -> std::io::Result<JoinHandle<Result<BackupRun>>> {
        let service = self.clone();
        thread::Builder::new()
            .name("backup-run".to_string())
            .spawn(move || service.execute_run())
    }

    /// Starts the single scheduler thread. Each due trigger starts a run on
    /// its own thread so polling keeps going while archiving.
    pub fn start_scheduler(&self, shutdown: Arc<AtomicBool>) -> Option<JoinHandle<()>> {
        let service = self.clone();
        self.scheduler
            .spawn(self.settings.poll_interval, shutdown, move || {
                if let Err(e) = service.spawn_run() {
                    warn!("Failed to start scheduled backup: {}", e);
                }
            })
    }

    fn execute_run(&self) -> Result<BackupRun> {
        let _run_guard = lock(&self.run_lock);
        let config = self.get_config().ok_or(BackupError::NotConfigured)?;

        self.running.store(true, Ordering::SeqCst);
        self.set_message("Backup in progress...".to_string());

        let monitor = ProcessSampler::current().map(|sampler| {
            let state = self.state.clone();
            ResourceMonitor::new(
                self.settings.monitor_ui_interval,
                self.settings.monitor_log_interval,
            )
            .start(sampler, self.activity_log.clone(), move |sample| {
                lock(&state).sample = sample;
            })
        });

        let run = run_backup(&config, &self.activity_log, |run| self.record_progress(run));

        if let Some(monitor) = monitor {
            monitor.stop();
        }
        lock(&self.state).sample = None;

        let message = match run.status {
            RunStatus::Completed => "Backup completed!".to_string(),
            _ => format!(
                "Backup failed: {}",
                run.error.as_deref().unwrap_or("unknown error")
            ),
        };
        self.push_history(&run);
        self.running.store(false, Ordering::SeqCst);
        self.set_message(message);
        Ok(run)
    }

    fn record_progress(&self, run: &BackupRun) {
        {
            let mut state = lock(&self.state);
            state.status = Some(run.status);
            state.files_written = run.files_written;
            state.total_files = run.total_files;
            state.percentage = run.percentage();
        }
        self.notify(None);
    }

    fn set_message(&self, message: String) {
        lock(&self.state).message = message.clone();
        self.notify(Some(message));
    }

    fn push_history(&self, run: &BackupRun) {
        let mut history = lock(&self.history);
        history.push_front(RunHistoryEntry::from(run));
        if history.len() > MAX_HISTORY_ENTRIES {
            history.pop_back();
        }
    }

    /// Get backup history, newest first
    pub fn history(&self) -> Vec<RunHistoryEntry> {
        lock(&self.history).iter().cloned().collect()
    }

    /// Everything the status panel needs, read in one go
    pub fn snapshot(&self) -> StatusSnapshot {
        let state = lock(&self.state).clone();
        StatusSnapshot {
            message: state.message,
            run_status: state.status,
            percentage: state.percentage,
            files_written: state.files_written,
            total_files: state.total_files,
            next_scheduled: self.scheduler.next_fire(),
            sample: state.sample,
        }
    }

    /// Subscribe to progress events
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        let (tx, rx) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        lock(&self.progress_subscribers).push(tx);
        rx
    }

    /// Notify all subscribers, dropping the ones that went away
    fn notify(&self, message: Option<String>) {
        let event = {
            let state = lock(&self.state);
            ProgressEvent {
                status: state.status,
                files_written: state.files_written,
                total_files: state.total_files,
                message,
            }
        };

        let mut subscribers = lock(&self.progress_subscribers);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        debug!("Progress event sent to {} subscriber(s)", subscribers.len());
    }
}
