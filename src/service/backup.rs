use crate::models::backup_run::{progress_percentage, BackupRun, RunStatus};
use crate::models::config::BackupConfig;
use crate::models::error::{BackupError, Result};
use crate::service::archive::{next_archive_path, write_archive};
use crate::service::retention::prune_archives;
use crate::utils::activity_log::{ActivityLog, BACKUP_COMPLETED, BACKUP_FAILED, BACKUP_STARTED};
use crate::utils::directory::get_files_in_path;
use crate::utils::progress::format_bytes;
use chrono::Local;
use log::{error, info, warn};
use std::fs;
use std::mem;

/// Runs one backup from start to finish. The returned run is always
/// `Completed` or `Failed`; `on_update` sees every state change, including
/// one call per archived file.
pub fn run_backup<F>(config: &BackupConfig, activity_log: &ActivityLog, mut on_update: F) -> BackupRun
where
    F: FnMut(&BackupRun),
{
    let mut run = BackupRun::new(Local::now());
    activity_log.record(BACKUP_STARTED);
    run.status = RunStatus::Running;
    on_update(&run);

    match execute(config, &mut run, &mut on_update) {
        Ok(()) => {
            run.status = RunStatus::Completed;
            let archive = run
                .archive_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            activity_log.record(&format!("{}: {}", BACKUP_COMPLETED, archive));
        }
        Err(e) => {
            run.status = RunStatus::Failed;
            run.error = Some(e.to_string());
            error!("Backup {} failed: {}", run.id, e);
            activity_log.record(&format!("{}: {}", BACKUP_FAILED, e));
        }
    }

    run.completed_at = Some(Local::now());
    on_update(&run);
    run
}

fn execute<F>(config: &BackupConfig, run: &mut BackupRun, on_update: &mut F) -> Result<()>
where
    F: FnMut(&BackupRun),
{
    if !config.source.is_dir() {
        return Err(BackupError::SourceNotFound(config.source.clone()));
    }

    let listing = get_files_in_path(&config.source, config.file_error_policy)?;
    run.skipped_files.extend(listing.unreadable);
    run.files = listing.files;
    run.total_files = run.files.len() as u64;
    info!(
        "Found {} files ({}) in {}",
        run.total_files,
        format_bytes(run.total_bytes()),
        config.source.display()
    );

    fs::create_dir_all(&config.destination).map_err(|cause| BackupError::DestinationCreate {
        path: config.destination.clone(),
        cause,
    })?;

    let archive_path = next_archive_path(&config.destination, &run.id);
    on_update(run);

    let files = mem::take(&mut run.files);
    let mut last_milestone = 0;
    let outcome = write_archive(
        &files,
        &archive_path,
        config.file_error_policy,
        |written, total| {
            run.files_written = written;
            let percentage = progress_percentage(written, total);
            if percentage / 25 > last_milestone {
                last_milestone = percentage / 25;
                info!("Backup {}: {}% ({}/{} files)", run.id, percentage, written, total);
            }
            on_update(run);
        },
    );
    run.files = files;
    let outcome = outcome?;

    info!(
        "Backup {} archived {} of {} files into {}",
        run.id,
        outcome.entries,
        run.total_files,
        archive_path.display()
    );
    run.files_archived = outcome.entries;
    run.skipped_files.extend(outcome.skipped);
    run.archive_path = Some(archive_path);
    if !run.skipped_files.is_empty() {
        warn!(
            "Backup {} left out {} unreadable file(s)",
            run.id,
            run.skipped_files.len()
        );
    }

    prune_archives(&config.destination, config.retained_archives)?;
    Ok(())
}
