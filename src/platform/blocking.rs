use tokio::task;

use crate::error::{GridError, GridResult};

/// Runs synchronous engine work off the async executor.
pub async fn run_blocking<F, T>(f: F) -> GridResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|err| GridError::config(format!("blocking task failed: {err}")))
}
