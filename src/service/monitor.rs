use crate::models::resource_sample::ResourceSample;
use crate::utils::activity_log::ActivityLog;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Samples CPU and resident memory of one process
pub struct ProcessSampler {
    system: System,
    pid: Pid,
}

impl ProcessSampler {
    pub fn new(pid: Pid) -> Self {
        Self {
            system: System::new(),
            pid,
        }
    }

    /// Sampler for the running process, if its id can be determined
    pub fn current() -> Option<Self> {
        sysinfo::get_current_pid().ok().map(Self::new)
    }

    /// `None` once the process is gone. CPU usage is measured since the
    /// previous call, so the first sample usually reads 0%.
    pub fn sample(&mut self) -> Option<ResourceSample> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        self.system
            .process(self.pid)
            .map(|process| ResourceSample::from_bytes(process.cpu_usage(), process.memory()))
    }
}

/// Running monitor; stopping it (or dropping it) joins the sampling thread
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct ResourceMonitor {
    pub ui_interval: Duration,
    pub log_interval: Duration,
}

impl ResourceMonitor {
    pub fn new(ui_interval: Duration, log_interval: Duration) -> Self {
        Self {
            ui_interval,
            log_interval,
        }
    }

    /// Samples the process every `ui_interval` and hands each result to
    /// `publish`; every `log_interval` the latest sample is appended to the
    /// activity log. Sampling failures publish `None` and are otherwise
    /// ignored. `publish(None)` is always the last call once stopped.
    pub fn start<F>(
        &self,
        mut sampler: ProcessSampler,
        activity_log: ActivityLog,
        publish: F,
    ) -> MonitorHandle
    where
        F: Fn(Option<ResourceSample>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let ui_interval = self.ui_interval;
        let log_interval = self.log_interval;

        let thread = thread::Builder::new()
            .name("resource-monitor".to_string())
            .spawn(move || {
                let mut last_logged: Option<Instant> = None;
                while !thread_stop.load(Ordering::SeqCst) {
                    let sample = sampler.sample();
                    publish(sample);

                    if let Some(sample) = sample {
                        let due = last_logged.map_or(true, |at| at.elapsed() >= log_interval);
                        if due {
                            if let Err(e) = activity_log.append(&sample.log_line()) {
                                debug!("Skipping resource log line: {}", e);
                            }
                            last_logged = Some(Instant::now());
                        }
                    }

                    wait(ui_interval, &thread_stop);
                }
                publish(None);
            });

        match thread {
            Ok(thread) => MonitorHandle {
                stop,
                thread: Some(thread),
            },
            Err(e) => {
                debug!("Resource monitor unavailable: {}", e);
                MonitorHandle { stop, thread: None }
            }
        }
    }
}

fn wait(duration: Duration, stop: &AtomicBool) {
    let step = Duration::from_millis(50);
    let deadline = Instant::now() + duration;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(step.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn test_samples_current_process() {
        let mut sampler = ProcessSampler::current().unwrap();
        let sample = sampler.sample().unwrap();
        assert!(sample.memory_mb > 0.0);
        assert!(sample.cpu_percent >= 0.0);
    }

    #[test]
    fn test_missing_process_yields_no_sample() {
        let mut sampler = ProcessSampler::new(Pid::from_u32(u32::MAX - 1));
        assert!(sampler.sample().is_none());
    }

    #[test]
    fn test_monitor_publishes_and_clears_on_stop() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path().join("log.txt"));
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = published.clone();

        let monitor = ResourceMonitor::new(Duration::from_millis(20), Duration::from_secs(60));
        let handle = monitor.start(ProcessSampler::current().unwrap(), log.clone(), move |s| {
            sink.lock().unwrap().push(s)
        });
        thread::sleep(Duration::from_millis(200));
        handle.stop();

        let published = published.lock().unwrap();
        assert!(published.len() >= 2);
        assert!(published[0].is_some());
        assert!(published.last().unwrap().is_none());

        // Only the first sample is logged within one log interval
        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("CPU: "));
        assert!(content.contains("Memória: "));
    }

    #[test]
    fn test_vanished_process_publishes_none_without_logging() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path().join("log.txt"));
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = published.clone();

        let monitor = ResourceMonitor::new(Duration::from_millis(20), Duration::from_millis(20));
        let handle = monitor.start(
            ProcessSampler::new(Pid::from_u32(u32::MAX - 1)),
            log.clone(),
            move |s| sink.lock().unwrap().push(s),
        );
        thread::sleep(Duration::from_millis(100));
        handle.stop();

        assert!(published.lock().unwrap().iter().all(Option::is_none));
        assert!(!log.path().exists());
    }
}
