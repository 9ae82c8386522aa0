use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Failed to read config file '{path}': {cause}")]
    ConfigRead { path: PathBuf, cause: io::Error },

    #[error("Failed to parse config file '{path}': {cause}")]
    ConfigParse {
        path: PathBuf,
        cause: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid backup time '{0}': expected HH:MM (24h)")]
    InvalidTime(String),

    #[error("Invalid schedule expression '{expression}': {cause}")]
    InvalidSchedule {
        expression: String,
        cause: cron::error::Error,
    },

    #[error("Source directory '{0}' was not found")]
    SourceNotFound(PathBuf),

    #[error("Failed to create destination directory '{path}': {cause}")]
    DestinationCreate { path: PathBuf, cause: io::Error },

    #[error("Failed to read directory entry: {0}")]
    DirectoryRead(String),

    #[error("Failed to read source file '{path}': {cause}")]
    FileRead { path: PathBuf, cause: io::Error },

    #[error("Failed to get metadata for '{path}': {cause}")]
    MetadataError { path: PathBuf, cause: io::Error },

    #[error("Failed to write archive '{path}': {cause}")]
    ArchiveWrite {
        path: PathBuf,
        cause: zip::result::ZipError,
    },

    #[error("Failed to remove old archive '{path}': {cause}")]
    ArchiveRemove { path: PathBuf, cause: io::Error },

    #[error("No backup is configured")]
    NotConfigured,

    #[error("Failed to open or create database file '{path}': {cause}")]
    DatabaseConnection { path: String, cause: String },

    #[error("Database query failed for '{operation}': {cause}")]
    DatabaseQuery {
        operation: String,
        cause: rusqlite::Error,
    },

    #[error("Failed to upsert into {table} for {code}: {cause}")]
    DatabaseUpsert {
        table: String,
        code: String,
        cause: rusqlite::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Request to '{url}' was abandoned: {reason}")]
    RequestAbandoned { url: String, reason: String },

    #[error("Unexpected response from '{url}': {reason}")]
    UnexpectedResponse { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
