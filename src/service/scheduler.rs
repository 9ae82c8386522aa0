use crate::models::backup_time::BackupTime;
use crate::models::error::{BackupError, Result};
use chrono::{DateTime, Local};
use cron::Schedule;
use log::{debug, info, warn};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest single sleep of the polling loop, so shutdown is noticed quickly
const SHUTDOWN_CHECK: Duration = Duration::from_secs(1);

/// A single daily trigger at a fixed local time of day
#[derive(Debug, Clone)]
pub struct DailyTrigger {
    time: BackupTime,
    schedule: Schedule,
    next_fire: DateTime<Local>,
}

impl DailyTrigger {
    /// Arms the trigger for the first occurrence of `time` strictly after `now`
    pub fn new(time: BackupTime, now: &DateTime<Local>) -> Result<Self> {
        let expression = time.cron_expression();
        let schedule = Schedule::from_str(&expression)
            .map_err(|cause| BackupError::InvalidSchedule { expression, cause })?;
        let next_fire = next_occurrence(&schedule, now);
        Ok(Self {
            time,
            schedule,
            next_fire,
        })
    }

    pub fn time(&self) -> BackupTime {
        self.time
    }

    pub fn next_fire(&self) -> DateTime<Local> {
        self.next_fire
    }

    /// Returns true at most once per due occurrence. After a long gap the
    /// trigger fires once and moves to the next future occurrence.
    pub fn poll(&mut self, now: &DateTime<Local>) -> bool {
        if *now < self.next_fire {
            return false;
        }
        self.next_fire = next_occurrence(&self.schedule, now);
        true
    }
}

fn next_occurrence(schedule: &Schedule, after: &DateTime<Local>) -> DateTime<Local> {
    schedule
        .after(after)
        .next()
        .unwrap_or_else(|| *after + chrono::Duration::days(1))
}

/// Holds at most one armed [`DailyTrigger`] and drives it from one
/// background polling thread.
#[derive(Clone, Default)]
pub struct Scheduler {
    trigger: Arc<Mutex<Option<DailyTrigger>>>,
    started: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<DailyTrigger>> {
        self.trigger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the daily trigger, replacing any previous one
    pub fn arm(&self, time: BackupTime) -> Result<DateTime<Local>> {
        self.arm_at(time, &Local::now())
    }

    pub fn arm_at(&self, time: BackupTime, now: &DateTime<Local>) -> Result<DateTime<Local>> {
        let trigger = DailyTrigger::new(time, now)?;
        let next_fire = trigger.next_fire();
        if let Some(previous) = self.slot().replace(trigger) {
            debug!("Replacing daily trigger at {}", previous.time());
        }
        info!(
            "Next backup scheduled for: {}",
            next_fire.format("%Y-%m-%d %H:%M:%S")
        );
        Ok(next_fire)
    }

    pub fn armed_time(&self) -> Option<BackupTime> {
        self.slot().as_ref().map(DailyTrigger::time)
    }

    pub fn next_fire(&self) -> Option<DateTime<Local>> {
        self.slot().as_ref().map(DailyTrigger::next_fire)
    }

    /// One polling step: true when the armed trigger is due at `now`
    pub fn tick(&self, now: &DateTime<Local>) -> bool {
        match self.slot().as_mut() {
            Some(trigger) => trigger.poll(now),
            None => false,
        }
    }

    /// Starts the polling thread. Only the first call spawns a thread; later
    /// calls return `None` so triggers never stack.
    pub fn spawn<F>(
        &self,
        poll_interval: Duration,
        shutdown: Arc<AtomicBool>,
        on_fire: F,
    ) -> Option<JoinHandle<()>>
    where
        F: Fn() + Send + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Scheduler is already running");
            return None;
        }

        let scheduler = self.clone();
        let handle = thread::Builder::new()
            .name("backup-scheduler".to_string())
            .spawn(move || {
                info!(
                    "Scheduler started, polling every {} seconds",
                    poll_interval.as_secs_f32()
                );
                while !shutdown.load(Ordering::SeqCst) {
                    if scheduler.tick(&Local::now()) {
                        info!("Running scheduled backup...");
                        on_fire();
                    }
                    sleep_unless_shutdown(poll_interval, &shutdown);
                }
                scheduler.started.store(false, Ordering::SeqCst);
                info!("Scheduler stopped");
            });

        match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to start scheduler thread: {}", e);
                self.started.store(false, Ordering::SeqCst);
                None
            }
        }
    }
}

fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) {
    let mut remaining = duration;
    while !remaining.is_zero() && !shutdown.load(Ordering::SeqCst) {
        let step = remaining.min(SHUTDOWN_CHECK);
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}
