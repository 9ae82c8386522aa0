use crate::models::error::BackupError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

static TIME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{2}):(\d{2})$").unwrap());

/// Time of day at which the daily backup fires, in 24h local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackupTime {
    hour: u32,
    minute: u32,
}

impl BackupTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// Cron expression (with seconds field) firing once a day at this time.
    pub fn cron_expression(&self) -> String {
        format!("0 {} {} * * *", self.minute, self.hour)
    }
}

impl FromStr for BackupTime {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = TIME_PATTERN
            .captures(value)
            .ok_or_else(|| BackupError::InvalidTime(value.to_string()))?;

        let hour: u32 = captures[1]
            .parse()
            .map_err(|_| BackupError::InvalidTime(value.to_string()))?;
        let minute: u32 = captures[2]
            .parse()
            .map_err(|_| BackupError::InvalidTime(value.to_string()))?;

        BackupTime::new(hour, minute).ok_or_else(|| BackupError::InvalidTime(value.to_string()))
    }
}

impl fmt::Display for BackupTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_valid_times() {
        let time: BackupTime = "14:30".parse().unwrap();
        assert_eq!(time, BackupTime::new(14, 30).unwrap());

        let midnight: BackupTime = "00:00".parse().unwrap();
        assert_eq!(midnight, BackupTime::new(0, 0).unwrap());
    }

    #[test]
    fn test_rejects_missing_leading_zero() {
        let result = "9:30".parse::<BackupTime>();
        assert!(matches!(result, Err(BackupError::InvalidTime(_))));
    }

    #[test]
    fn test_rejects_out_of_range_and_garbage() {
        for raw in ["24:00", "12:60", "ab:cd", "12:30:00", " 12:30", ""] {
            assert!(raw.parse::<BackupTime>().is_err(), "accepted '{}'", raw);
        }
    }

    #[test]
    fn test_display_pads_with_zeros() {
        assert_eq!(BackupTime::new(7, 5).unwrap().to_string(), "07:05");
    }

    #[test]
    fn test_cron_expression_fires_daily() {
        let time = BackupTime::new(14, 30).unwrap();
        assert_eq!(time.cron_expression(), "0 30 14 * * *");
    }
}
