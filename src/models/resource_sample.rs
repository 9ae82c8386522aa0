use std::fmt;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// CPU and resident memory of the backup process at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

impl ResourceSample {
    pub fn from_bytes(cpu_percent: f32, resident_bytes: u64) -> Self {
        Self {
            cpu_percent,
            memory_mb: resident_bytes as f64 / BYTES_PER_MB,
        }
    }

    /// Activity-log line for this sample
    pub fn log_line(&self) -> String {
        format!(
            "CPU: {:.2}% | Memória: {:.2} MB",
            self.cpu_percent, self.memory_mb
        )
    }

    /// Above 80% CPU or 500 MB resident the status panel highlights the values
    pub fn is_high(&self) -> bool {
        self.cpu_percent > 80.0 || self.memory_mb > 500.0
    }
}

impl fmt::Display for ResourceSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CPU: {:.2}% | Memory: {:.2} MB",
            self.cpu_percent, self.memory_mb
        )
    }
}

/// Renders an optional sample, `N/A` when nothing is being measured
pub fn describe_sample(sample: Option<&ResourceSample>) -> String {
    match sample {
        Some(sample) => sample.to_string(),
        None => "CPU: N/A | Memory: N/A".to_string(),
    }
}
