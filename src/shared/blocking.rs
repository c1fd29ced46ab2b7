use tokio::task;

use crate::errors::SandboxError;

/// Runs repository work on the blocking pool. A panicking task surfaces as
/// an error instead of tearing down the caller.
pub async fn run_blocking<T, F>(label: &str, work: F) -> Result<T, SandboxError>
where
    F: FnOnce() -> Result<T, SandboxError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|e| SandboxError::io("worker task", label, format!("task panicked: {e}")))?
}
