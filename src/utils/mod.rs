pub mod activity_log;
pub mod directory;
pub mod progress;
pub mod status_panel;
pub mod threads;
