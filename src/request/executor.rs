//! The retry loop around one provider call.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::envelope::Envelope;
use super::payload::{GenerationParams, PayloadBuilder};
use super::policy::RetryPolicy;
use super::response::{classify, Generation, Outcome};
use super::transport::{HttpRequest, Transport};
use crate::credentials::{redact, Credential, CredentialPool};
use crate::error::{DispatchError, DispatchResult};
use crate::metrics::DispatchStats;
use crate::ratelimit::RateLimiter;

/// Sends envelopes to the provider, rotating credentials and retrying.
///
/// Cloning yields another handle on the same pool, limiter and stats.
#[derive(Clone)]
pub struct RequestExecutor {
    url: String,
    transport: Arc<dyn Transport>,
    credentials: CredentialPool,
    limiter: Arc<RateLimiter>,
    payload: PayloadBuilder,
    policy: RetryPolicy,
    stats: Arc<DispatchStats>,
}

impl RequestExecutor {
    pub fn new(
        url: impl Into<String>,
        transport: Arc<dyn Transport>,
        credentials: CredentialPool,
        limiter: Arc<RateLimiter>,
        payload: PayloadBuilder,
    ) -> Self {
        Self {
            url: url.into(),
            transport,
            credentials,
            limiter,
            payload,
            policy: RetryPolicy::default(),
            stats: Arc::new(DispatchStats::new()),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_stats(mut self, stats: Arc<DispatchStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    pub fn credentials(&self) -> &CredentialPool {
        &self.credentials
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn headers(credential: &Credential) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Authorization", format!("Bearer {}", credential.key)),
            ("content-type", "application/json".to_string()),
            ("api-key", credential.key.clone()),
        ];
        if let Some(org) = &credential.organization {
            headers.push(("OpenAI-Organization", org.clone()));
        }
        headers
    }

    /// Send `envelope` until it succeeds, is rejected, or the policy runs out.
    ///
    /// Returns an empty [`Generation::Text`] when the provider rejects the
    /// prompt itself. Fails when every key is quota-exhausted or when
    /// `max_attempts` attempts went by without a result.
    pub async fn execute(
        &self,
        envelope: &Envelope,
        params: &GenerationParams,
    ) -> DispatchResult<Generation> {
        let max_attempts = self.policy.max_attempts;
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            self.limiter.acquire().await;

            let credential = self.credentials.next_credential()?;
            let body = self.payload.build(envelope, params).to_body()?;
            let request = HttpRequest {
                url: self.url.clone(),
                headers: Self::headers(&credential),
                body,
            };

            self.stats.record_attempt();
            let response = match self.transport.post(request).await {
                Ok(response) => response,
                Err(e) => {
                    self.stats.record_connection_error();
                    error!(attempt = attempts, max_attempts, error = %e, "got connection error, retrying");
                    continue;
                }
            };

            let outcome = classify(
                response.status,
                &response.body,
                self.payload.mode(),
                params.logprobs,
            );
            match outcome {
                Outcome::Success { generation, usage } => {
                    self.stats.record_success(usage);
                    debug!(attempt = attempts, status = response.status, "request succeeded");
                    return Ok(generation);
                }
                Outcome::Malformed(snippet) => {
                    self.stats.record_malformed();
                    error!(attempt = attempts, status = response.status, body = %snippet, "response is not valid JSON, retrying");
                }
                Outcome::RateLimited => {
                    self.stats.record_rate_limited();
                    warn!(
                        attempt = attempts,
                        backoff_secs = self.policy.rate_limit_backoff.as_secs_f64(),
                        "rate limit exceeded, retrying"
                    );
                    tokio::time::sleep(self.policy.rate_limit_backoff).await;
                }
                Outcome::QuotaExhausted => {
                    self.stats.record_quota_exhausted();
                    self.credentials.mark_invalid(&credential.key);
                    if !self.credentials.has_valid() {
                        error!(key = %redact(&credential.key), "no API key with remaining quota");
                        return Err(DispatchError::AllCredentialsInvalid);
                    }
                }
                Outcome::InvalidPrompt => {
                    self.stats.record_invalid_prompt();
                    warn!(prompt = %envelope.joined_content(), "invalid prompt, skipping input");
                    return Ok(Generation::skipped());
                }
                Outcome::ApiError(err) => {
                    self.stats.record_api_error();
                    error!(attempt = attempts, status = response.status, error = %err, "found error message in response");
                }
            }
        }

        Err(DispatchError::RetriesExhausted { attempts })
    }
}
