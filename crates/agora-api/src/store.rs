use std::sync::Arc;
use std::time::Duration;

use agora_db::Database;

use crate::error::ServiceError;

/// Baseline bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(3);

/// Runs a blocking store call off the async runtime, bounded by `timeout`.
///
/// On timeout the caller gets [`ServiceError::Timeout`] right away; the
/// statement itself finishes on the blocking pool. A panic inside `f` (an
/// unvalidated filter reaching query construction) is re-raised here.
pub async fn run_blocking<F, T>(db: &Arc<Database>, timeout: Duration, f: F) -> Result<T, ServiceError>
where
    F: FnOnce(&Database) -> agora_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    let task = tokio::task::spawn_blocking(move || f(&db));

    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(ServiceError::Timeout),
        Ok(Err(join)) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
        Ok(Err(join)) => Err(ServiceError::Internal(format!("spawn_blocking join error: {join}"))),
        Ok(Ok(result)) => result.map_err(ServiceError::from),
    }
}
