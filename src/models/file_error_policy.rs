use serde::{Deserialize, Serialize};

/// Defines what a backup run does when a single source file cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileErrorPolicy {
    /// Fail the whole run on the first unreadable file
    #[default]
    Abort,

    /// Log the unreadable file, leave it out of the archive and keep going
    Skip,
}

impl FileErrorPolicy {
    /// Returns true if unreadable files are left out of the archive
    pub fn skips_unreadable(&self) -> bool {
        matches!(self, FileErrorPolicy::Skip)
    }
}
