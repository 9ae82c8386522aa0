use log::error;
use std::any::Any;
use std::thread::JoinHandle;

/// Joins `handle`, logging a panic instead of dropping it. `None` when the
/// thread panicked.
pub fn join_logged<T>(handle: JoinHandle<T>, name: &str) -> Option<T> {
    match handle.join() {
        Ok(value) => Some(value),
        Err(payload) => {
            error!("{} thread panicked: {}", name, panic_message(payload.as_ref()));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
