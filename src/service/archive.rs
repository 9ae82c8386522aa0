use crate::models::backup_run::DiscoveredFile;
use crate::models::error::{BackupError, Result};
use crate::models::file_error_policy::FileErrorPolicy;
use log::{debug, warn};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const COPY_BUFFER_SIZE: usize = 64 * 1024;
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Default)]
pub struct ArchiveOutcome {
    pub entries: u64,
    pub skipped: Vec<PathBuf>,
}

/// Removes the in-progress file unless the archive was completed
struct PartialArchive {
    path: PathBuf,
    completed: bool,
}

impl Drop for PartialArchive {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial archive {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove partial archive {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Picks `backup_<id>.zip` in `destination`, adding `-2`, `-3`, ... when a
/// run in the same second already used the name.
pub fn next_archive_path(destination: &Path, run_id: &str) -> PathBuf {
    let first = destination.join(format!("backup_{}.zip", run_id));
    if !first.exists() {
        return first;
    }
    (2u32..)
        .map(|n| destination.join(format!("backup_{}-{}.zip", run_id, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

fn partial_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn entry_options(size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= u64::from(u32::MAX))
}

fn archive_error(path: &Path, cause: ZipError) -> BackupError {
    BackupError::ArchiveWrite {
        path: path.to_path_buf(),
        cause,
    }
}

/// Writes every file into a deflate zip at `archive_path`.
///
/// The archive is built next to its final location with a `.partial` suffix
/// and renamed into place only once it is complete, so a failed run never
/// leaves a `backup_*.zip` behind. `on_progress(written, total)` is called
/// after each file; skipped files count as written.
pub fn write_archive<F>(
    files: &[DiscoveredFile],
    archive_path: &Path,
    policy: FileErrorPolicy,
    mut on_progress: F,
) -> Result<ArchiveOutcome>
where
    F: FnMut(u64, u64),
{
    let total = files.len() as u64;
    let partial = partial_path(archive_path);
    let mut guard = PartialArchive {
        path: partial.clone(),
        completed: false,
    };

    let file = File::create(&partial)
        .map_err(|cause| archive_error(&partial, ZipError::Io(cause)))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let mut outcome = ArchiveOutcome::default();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    for (index, entry) in files.iter().enumerate() {
        match add_entry(&mut zip, entry, &mut buffer, &partial) {
            Ok(()) => outcome.entries += 1,
            Err(BackupError::FileRead { path, cause }) if policy.skips_unreadable() => {
                warn!("Skipping unreadable file {}: {}", path.display(), cause);
                outcome.skipped.push(path);
            }
            Err(e) => return Err(e),
        }
        on_progress(index as u64 + 1, total);
    }

    let writer = zip.finish().map_err(|cause| archive_error(&partial, cause))?;
    let file = writer
        .into_inner()
        .map_err(|e| archive_error(&partial, ZipError::Io(e.into_error())))?;
    file.sync_all()
        .map_err(|cause| archive_error(&partial, ZipError::Io(cause)))?;
    drop(file);

    fs::rename(&partial, archive_path)
        .map_err(|cause| archive_error(archive_path, ZipError::Io(cause)))?;
    guard.completed = true;

    Ok(outcome)
}

fn add_entry<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    entry: &DiscoveredFile,
    buffer: &mut [u8],
    archive_path: &Path,
) -> Result<()> {
    let read_error = |cause| BackupError::FileRead {
        path: entry.path.clone(),
        cause,
    };

    let mut source = File::open(&entry.path).map_err(read_error)?;

    zip.start_file(entry.relative_path.as_str(), entry_options(entry.size))
        .map_err(|cause| archive_error(archive_path, cause))?;

    loop {
        let count = match source.read(buffer) {
            Ok(0) => break,
            Ok(count) => count,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(cause) => {
                // Drop the half-written entry so the archive stays consistent
                zip.abort_file()
                    .map_err(|abort| archive_error(archive_path, abort))?;
                return Err(read_error(cause));
            }
        };
        zip.write_all(&buffer[..count])
            .map_err(|cause| archive_error(archive_path, ZipError::Io(cause)))?;
    }

    Ok(())
}
