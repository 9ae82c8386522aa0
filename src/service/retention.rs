use crate::models::error::{BackupError, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// True for names this tool writes: `backup_<timestamp>.zip`
pub fn is_archive_name(name: &str) -> bool {
    name.starts_with("backup_") && name.ends_with(".zip") && name.len() > "backup_.zip".len()
}

/// Archives in `destination`, newest first by modification time. Ties are
/// broken by name, which embeds the run timestamp.
pub fn list_archives(destination: &Path) -> Result<Vec<(PathBuf, SystemTime)>> {
    let mut archives = Vec::new();

    for entry in fs::read_dir(destination)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_archive_name(name) {
            continue;
        }

        let metadata = entry
            .metadata()
            .map_err(|cause| BackupError::MetadataError {
                path: entry.path(),
                cause,
            })?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata
            .modified()
            .map_err(|cause| BackupError::MetadataError {
                path: entry.path(),
                cause,
            })?;
        archives.push((entry.path(), modified));
    }

    archives.sort_by(|(a_path, a_time), (b_path, b_time)| {
        b_time.cmp(a_time).then_with(|| b_path.cmp(a_path))
    });
    Ok(archives)
}

/// Deletes all but the `keep` most recent archives and returns what was removed
pub fn prune_archives(destination: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let archives = list_archives(destination)?;
    let mut removed = Vec::new();

    for (path, _) in archives.into_iter().skip(keep) {
        debug!("Removing old archive {}", path.display());
        fs::remove_file(&path).map_err(|cause| BackupError::ArchiveRemove {
            path: path.clone(),
            cause,
        })?;
        removed.push(path);
    }

    if !removed.is_empty() {
        info!(
            "Retention removed {} old archive(s) from {}",
            removed.len(),
            destination.display()
        );
    }
    Ok(removed)
}
