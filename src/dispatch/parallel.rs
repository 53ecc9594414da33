//! Bounded-parallel dispatch: one spawned task per input.

use std::sync::Arc;

use tokio::sync::Semaphore;

use super::PreparedInput;
use crate::error::DispatchResult;
use crate::request::{Generation, RequestExecutor};

/// Run every input on its own task, at most `workers` at a time.
///
/// Results keep input order. The first failing input (in input order)
/// fails the batch once every task has finished.
pub(super) async fn run(
    executor: &RequestExecutor,
    inputs: Vec<PreparedInput>,
    workers: usize,
) -> DispatchResult<Vec<Generation>> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));

    let handles: Vec<_> = inputs
        .into_iter()
        .map(|input| {
            let semaphore = semaphore.clone();
            let executor = executor.clone();
            tokio::spawn(async move {
                // Hold the permit until the request completes (RAII)
                let _permit = semaphore.acquire_owned().await;
                input.run(&executor).await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for joined in futures::future::join_all(handles).await {
        results.push(joined??);
    }
    Ok(results)
}
