pub mod archive;
pub mod backup;
pub mod monitor;
pub mod quotes;
pub mod retention;
pub mod scheduler;
