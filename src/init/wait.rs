// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::error;

type BoxError = Box<dyn Error + Send + Sync>;

/// Wait for the next task to finish, flattening join and task errors.
/// Returns `None` when the set is empty.
pub async fn wait_for_any_task<T: 'static>(
    tasks: &mut JoinSet<Result<T, BoxError>>,
) -> Result<Option<T>, BoxError> {
    match tasks.join_next().await {
        None => Ok(None),
        Some(res) => res?.map(Some),
    }
}

pub async fn wait_for_tasks_with_timeout<T: 'static + std::fmt::Debug>(
    tasks: &mut JoinSet<Result<T, BoxError>>,
    timeout: Duration,
) -> Result<Option<T>, BoxError> {
    let stop_at = Instant::now() + timeout;

    let mut result = Ok(None);
    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => {
                result = Err("timed out waiting for tasks to complete".into());
                break;
            }
            Ok(None) => break,
            Ok(Some(v)) => match v {
                Ok(Ok(out)) => result = Ok(Some(out)),
                Ok(Err(e)) => result = Err(e),
                e => {
                    error!("Failed to join with task: {:?}", e)
                }
            },
        }
    }

    result
}
