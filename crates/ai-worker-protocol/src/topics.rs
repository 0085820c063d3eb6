/// Workers announce themselves here once connected
pub const REGISTER_TOPIC: &str = "upb/workers/register";

/// Every idle/busy transition
pub const STATUS_TOPIC: &str = "upb/workers/status";

/// Shared log stream for all workers and the coordinator
pub const LOG_TOPIC: &str = "upb/logs";

/// Topic on which the coordinator sends tasks to one worker
pub fn task_topic(worker_id: &str) -> String {
    format!("upb/workers/{}/tasks", worker_id)
}
