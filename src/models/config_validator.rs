use crate::models::backup_time::BackupTime;
use crate::models::config::{BackupConfig, Config, ImporterConfig};
use crate::models::error::{BackupError, Result};
use log::{info, warn};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Validates the backup part of the configuration
pub fn validate_config(config: &Config) -> Result<()> {
    info!("Validating configuration...");

    // Presence of all three inputs and the HH:MM format
    let backup = config.backup_config()?;

    validate_numeric_values(config)?;

    validate_source(&backup)?;

    validate_destination(&backup)?;

    validate_schedule(&backup.time)?;

    validate_importer_config(&config.importer)?;

    info!("Configuration validation passed");
    Ok(())
}

/// Validate numeric configuration values
fn validate_numeric_values(config: &Config) -> Result<()> {
    if config.retained_archives == 0 {
        return Err(BackupError::InvalidConfig(
            "retained_archives must be greater than 0".to_string(),
        ));
    }

    if config.scheduler_poll_seconds == 0 {
        return Err(BackupError::InvalidConfig(
            "scheduler_poll_seconds must be greater than 0".to_string(),
        ));
    }

    if config.monitor_ui_interval_ms == 0 || config.monitor_log_interval_seconds == 0 {
        return Err(BackupError::InvalidConfig(
            "monitor intervals must be greater than 0".to_string(),
        ));
    }

    if config.scheduler_poll_seconds > 60 {
        warn!(
            "scheduler_poll_seconds ({}) is over a minute. Scheduled backups may start late.",
            config.scheduler_poll_seconds
        );
    }

    Ok(())
}

/// Validate the source directory
fn validate_source(backup: &BackupConfig) -> Result<()> {
    let path = backup.source.as_path();

    if !path.exists() {
        return Err(BackupError::SourceNotFound(path.to_path_buf()));
    }

    if !path.is_dir() {
        return Err(BackupError::InvalidConfig(format!(
            "Backup source is not a directory: {}",
            path.display()
        )));
    }

    if let Err(e) = fs::read_dir(path) {
        return Err(BackupError::InvalidConfig(format!(
            "Backup source is not readable: {}\nError: {}",
            path.display(),
            e
        )));
    }

    Ok(())
}

/// Validate the destination directory, which may be created later
fn validate_destination(backup: &BackupConfig) -> Result<()> {
    let path = backup.destination.as_path();

    if path.exists() {
        if !path.is_dir() {
            return Err(BackupError::InvalidConfig(format!(
                "Backup destination exists but is not a directory: {}",
                path.display()
            )));
        }

        if let Err(e) = check_writable(path) {
            return Err(BackupError::InvalidConfig(format!(
                "Backup destination is not writable: {}\nError: {}",
                path.display(),
                e
            )));
        }

        if path.starts_with(&backup.source) {
            warn!(
                "Backup destination {} is inside the source directory; archives will be included in later backups",
                path.display()
            );
        }

        return Ok(());
    }

    let parent = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => {
            return Err(BackupError::InvalidConfig(format!(
                "Backup destination has no parent directory: {}",
                path.display()
            )))
        }
    };

    if !parent.exists() {
        #[cfg(windows)]
        let suggestion = format!("mkdir \"{}\"", parent.display());
        #[cfg(not(windows))]
        let suggestion = format!("mkdir -p \"{}\"", parent.display());

        return Err(BackupError::InvalidConfig(format!(
            "Backup destination parent directory does not exist: {}\nSuggestion: Create the parent directory with: {}",
            path.display(),
            suggestion
        )));
    }

    if let Err(e) = check_writable(parent) {
        return Err(BackupError::InvalidConfig(format!(
            "Backup destination parent directory is not writable: {}\nError: {}",
            path.display(),
            e
        )));
    }

    warn!(
        "Backup destination does not exist but will be created: {}",
        path.display()
    );
    Ok(())
}

/// Validate that the time of day turns into a usable daily schedule
fn validate_schedule(time: &BackupTime) -> Result<()> {
    let expression = time.cron_expression();
    match cron::Schedule::from_str(&expression) {
        Ok(_) => {
            info!("Schedule validated: daily at {}", time);
            Ok(())
        }
        Err(cause) => Err(BackupError::InvalidSchedule { expression, cause }),
    }
}

/// Validate the quote importer settings
pub fn validate_importer_config(importer: &ImporterConfig) -> Result<()> {
    if importer.max_attempts == 0 {
        return Err(BackupError::InvalidConfig(
            "importer.max_attempts must be greater than 0".to_string(),
        ));
    }

    if importer.stock_base_url.trim().is_empty() || importer.crypto_base_url.trim().is_empty() {
        return Err(BackupError::InvalidConfig(
            "importer base URLs cannot be empty".to_string(),
        ));
    }

    if importer.database_file.trim().is_empty() {
        return Err(BackupError::InvalidConfig(
            "importer.database_file cannot be empty. Use ':memory:' for an in-memory database."
                .to_string(),
        ));
    }

    if !importer.stocks.is_empty() && importer.stock_api_token.is_none() {
        warn!("No stock_api_token configured; the stock quote API may reject requests");
    }

    Ok(())
}

/// Check if a directory is writable by attempting to create a temporary file
fn check_writable(path: &Path) -> std::io::Result<()> {
    let test_file = path.join(".rustyzipbackup_write_test");

    fs::write(&test_file, b"test")?;

    fs::remove_file(&test_file)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config(source: &Path, destination: &Path) -> Config {
        Config {
            source_directory: source.to_str().unwrap().to_string(),
            destination_directory: destination.to_str().unwrap().to_string(),
            backup_time: "14:30".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_check_writable_temp_dir() {
        let temp_dir = std::env::temp_dir();
        assert!(check_writable(&temp_dir).is_ok());
    }

    #[test]
    fn test_validate_config_passes_for_valid_config() {
        let temp_source = TempDir::new().unwrap();
        let temp_dest = TempDir::new().unwrap();

        let config = create_test_config(temp_source.path(), temp_dest.path());

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_accepts_creatable_destination() {
        let temp_source = TempDir::new().unwrap();
        let temp_dest = TempDir::new().unwrap();

        let config = create_test_config(temp_source.path(), &temp_dest.path().join("new"));

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_nonexistent_source_directory() {
        let temp_dest = TempDir::new().unwrap();

        let config = create_test_config(Path::new("/this/does/not/exist"), temp_dest.path());

        let result = validate_config(&config);
        assert!(matches!(result, Err(BackupError::SourceNotFound(_))));
    }

    #[test]
    fn test_rejects_destination_without_parent() {
        let temp_source = TempDir::new().unwrap();

        let config =
            create_test_config(temp_source.path(), Path::new("/this/does/not/exist/dest"));

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("parent directory does not exist"));
    }

    #[test]
    fn test_rejects_destination_that_is_a_file() {
        let temp_source = TempDir::new().unwrap();
        let temp_dest = TempDir::new().unwrap();
        let file = temp_dest.path().join("not_a_dir");
        fs::write(&file, b"x").unwrap();

        let config = create_test_config(temp_source.path(), &file);

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }

    #[test]
    fn test_rejects_time_without_leading_zero() {
        let temp_source = TempDir::new().unwrap();
        let temp_dest = TempDir::new().unwrap();

        let mut config = create_test_config(temp_source.path(), temp_dest.path());
        config.backup_time = "9:30".to_string();

        assert!(matches!(
            validate_config(&config),
            Err(BackupError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_rejects_zero_retained_archives() {
        let temp_source = TempDir::new().unwrap();
        let temp_dest = TempDir::new().unwrap();

        let mut config = create_test_config(temp_source.path(), temp_dest.path());
        config.retained_archives = 0;

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("retained_archives"));
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let temp_source = TempDir::new().unwrap();
        let temp_dest = TempDir::new().unwrap();

        let mut config = create_test_config(temp_source.path(), temp_dest.path());
        config.scheduler_poll_seconds = 0;

        let result = validate_config(&config);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("scheduler_poll_seconds"));
    }

    #[test]
    fn test_validate_schedule_for_every_minute_of_day() {
        for hour in [0, 6, 12, 23] {
            for minute in [0, 15, 59] {
                let time = BackupTime::new(hour, minute).unwrap();
                assert!(validate_schedule(&time).is_ok(), "rejected {}", time);
            }
        }
    }

    #[test]
    fn test_rejects_importer_with_zero_attempts() {
        let importer = ImporterConfig {
            max_attempts: 0,
            ..ImporterConfig::default()
        };

        let result = validate_importer_config(&importer);
        assert!(result.unwrap_err().to_string().contains("max_attempts"));
    }

    #[test]
    fn test_rejects_importer_with_empty_database_file() {
        let importer = ImporterConfig {
            database_file: " ".to_string(),
            ..ImporterConfig::default()
        };

        assert!(validate_importer_config(&importer).is_err());
    }
}
