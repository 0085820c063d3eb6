mod task;
mod status;
mod identity;
mod error;

pub use task::{TaskRequest, TaskResult, LogEvent, now_millis};
pub use status::WorkerStatus;
pub use identity::{WorkerIdentity, WORKER_KIND, WORKER_LANGUAGE};
pub use error::{WorkerError, Result};
