pub mod backup_run;
pub mod backup_time;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod file_error_policy;
pub mod quote_row;
pub mod resource_sample;
pub mod status;
