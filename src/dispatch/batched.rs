//! Batched dispatch: one future group on the calling task.

use futures::future::try_join_all;
use tokio::sync::Semaphore;

use super::PreparedInput;
use crate::error::DispatchResult;
use crate::request::{Generation, RequestExecutor};

/// Drive up to `width` inputs at once without spawning.
///
/// Results come back in submission order; the first terminal error stops
/// the batch and drops the requests still pending.
pub(super) async fn run(
    executor: &RequestExecutor,
    inputs: Vec<PreparedInput>,
    width: usize,
) -> DispatchResult<Vec<Generation>> {
    let semaphore = Semaphore::new(width.max(1));
    try_join_all(inputs.into_iter().map(|input| {
        let semaphore = &semaphore;
        async move {
            let _permit = semaphore.acquire().await;
            input.run(executor).await
        }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialPool;
    use crate::error::DispatchError;
    use crate::ratelimit::RateLimiter;
    use crate::request::{
        ApiMode, Envelope, GenerationParams, HttpRequest, HttpResponse, PayloadBuilder, Transport,
        TransportError,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct QuotaGone;

    #[async_trait]
    impl Transport for QuotaGone {
        async fn post(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse {
                status: 429,
                body: json!({"error": {"code": "insufficient_quota"}}).to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_terminal_error_fails_batch() {
        let executor = RequestExecutor::new(
            "http://mock",
            Arc::new(QuotaGone),
            CredentialPool::new(vec!["k".into()], vec![]).unwrap(),
            Arc::new(RateLimiter::new(0.0)),
            PayloadBuilder::new("gpt-4", ApiMode::Chat),
        );
        let inputs = vec![
            PreparedInput::Skip,
            PreparedInput::Send {
                envelope: Envelope::from_text("x"),
                params: GenerationParams::new(8, 0.0),
            },
        ];
        let err = run(&executor, inputs, 2).await.unwrap_err();
        assert!(matches!(err, DispatchError::AllCredentialsInvalid));
    }

    #[test]
    fn test_runs_without_a_spawning_runtime() {
        let executor = RequestExecutor::new(
            "http://mock",
            Arc::new(QuotaGone),
            CredentialPool::new(vec!["k".into()], vec![]).unwrap(),
            Arc::new(RateLimiter::new(0.0)),
            PayloadBuilder::new("gpt-4", ApiMode::Chat),
        );
        let out = tokio_test::block_on(run(&executor, vec![PreparedInput::Skip; 3], 1)).unwrap();
        assert_eq!(out.len(), 3);
    }
}
