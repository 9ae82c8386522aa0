use crate::models::backup_run::DiscoveredFile;
use crate::models::error::{BackupError, Result};
use crate::models::file_error_policy::FileErrorPolicy;
use log::warn;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Regular files under a source root, plus entries that could not be read
/// when the policy allows skipping them.
#[derive(Debug, Default)]
pub struct SourceListing {
    pub files: Vec<DiscoveredFile>,
    pub unreadable: Vec<PathBuf>,
}

/// Walks `root` recursively. Symlinks are not followed and anything that is
/// not a regular file is left out.
pub fn get_files_in_path(root: &Path, policy: FileErrorPolicy) -> Result<SourceListing> {
    let mut listing = SourceListing::default();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if policy.skips_unreadable() {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!("Skipping unreadable entry {}: {}", path.display(), e);
                    listing.unreadable.push(path);
                    continue;
                }
                return Err(BackupError::DirectoryRead(e.to_string()));
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                if policy.skips_unreadable() {
                    warn!("Skipping {}: {}", entry.path().display(), e);
                    listing.unreadable.push(entry.path().to_path_buf());
                    continue;
                }
                return Err(BackupError::DirectoryRead(e.to_string()));
            }
        };

        let relative_path = archive_path(root, entry.path())?;
        listing.files.push(DiscoveredFile {
            path: entry.path().to_path_buf(),
            relative_path,
            size,
        });
    }

    Ok(listing)
}

/// `path` relative to `root`, joined with `/` whatever the platform separator
pub fn archive_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        BackupError::DirectoryRead(format!(
            "{} is not under {}",
            path.display(),
            root.display()
        ))
    })?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    Ok(parts.join("/"))
}
