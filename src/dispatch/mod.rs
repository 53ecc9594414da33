//! Batch dispatch over the request executor.
//!
//! [`Dispatcher`] turns a batch of prompts into one result per prompt, in
//! input order. Each prompt is prepared first (temperature override,
//! truncation, output ceiling) and then sent with one of two disciplines:
//!
//! - **BoundedParallel**: one spawned task per input, a semaphore caps how
//!   many are in flight
//! - **BatchedAsync**: one joined future group driven by the caller

mod batched;
mod parallel;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::credentials::CredentialPool;
use crate::error::DispatchResult;
use crate::metrics::DispatchStats;
use crate::ratelimit::RateLimiter;
use crate::request::{
    ApiMode, Envelope, Generation, GenerationParams, PayloadBuilder, Prompt, RequestExecutor,
    ReqwestTransport, Transport,
};
use crate::tokens::{context_window, output_ceiling, TokenEstimator, Truncator, PROMPT_BUFFER_TOKENS};

/// How a batch is spread over concurrent requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchStrategy {
    /// Spawned tasks bounded by a worker count.
    #[default]
    #[serde(rename = "parallel")]
    BoundedParallel,
    /// A single cooperative future group on the calling task.
    #[serde(rename = "batched")]
    BatchedAsync,
}

/// One input after preparation.
#[derive(Debug, Clone)]
pub(crate) enum PreparedInput {
    Send {
        envelope: Envelope,
        params: GenerationParams,
    },
    /// Cannot fit; answered with an empty result and never sent.
    Skip,
}

impl PreparedInput {
    pub(crate) async fn run(self, executor: &RequestExecutor) -> DispatchResult<Generation> {
        match self {
            PreparedInput::Send { envelope, params } => executor.execute(&envelope, &params).await,
            PreparedInput::Skip => Ok(Generation::skipped()),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Sends prompt batches to one model endpoint.
pub struct Dispatcher {
    config: DispatcherConfig,
    executor: RequestExecutor,
    estimator: TokenEstimator,
    truncator: Truncator,
}

impl Dispatcher {
    /// Create a dispatcher backed by a reqwest client.
    pub fn new(config: DispatcherConfig) -> DispatchResult<Self> {
        let policy = config.retry_policy()?;
        let proxy = config.resolve_proxy()?;
        let transport = ReqwestTransport::new(policy.request_timeout, proxy.as_deref())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a dispatcher that sends through `transport`.
    pub fn with_transport(config: DispatcherConfig, transport: Arc<dyn Transport>) -> DispatchResult<Self> {
        config.validate()?;

        let credentials = CredentialPool::new(config.resolve_keys()?, config.orgs())?;
        let key_count = credentials.len();
        let limiter = Arc::new(
            RateLimiter::new(config.query_per_second).with_verbose(config.rpm_verbose),
        );
        let payload = PayloadBuilder::new(config.model.clone(), ApiMode::from_is_chat(config.is_chat));
        let policy = config.retry_policy()?;
        let executor = RequestExecutor::new(config.api_base.clone(), transport, credentials, limiter, payload)
            .with_policy(policy);

        let estimator = TokenEstimator::new(config.estimator, &config.model, config.tokenizer_path.as_deref());
        let truncator = Truncator::new(estimator.clone(), config.mode);

        warn!(
            model = %config.model,
            max_completion_tokens = config.max_completion_tokens,
            "output length is capped at max_completion_tokens"
        );
        info!(
            model = %config.model,
            api_base = %config.api_base,
            keys = key_count,
            strategy = ?config.strategy,
            "dispatcher ready"
        );

        Ok(Self {
            config,
            executor,
            estimator,
            truncator,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Counters shared by every request this dispatcher sends.
    pub fn stats(&self) -> &Arc<DispatchStats> {
        self.executor.stats()
    }

    /// Generate one result per prompt, in input order.
    ///
    /// `temperature` is ignored when the config fixes one. Inputs that
    /// cannot fit their model window come back as empty text. Fails only
    /// when every key is out of quota or an input runs out of retries.
    pub async fn generate(
        &self,
        prompts: &[Prompt],
        max_out_len: u32,
        temperature: f64,
    ) -> DispatchResult<Vec<Generation>> {
        if prompts.is_empty() {
            error!("received an empty batch of prompts");
            return Ok(Vec::new());
        }

        let temperature = self.config.temperature.unwrap_or(temperature);
        let mut params = GenerationParams::new(max_out_len, temperature)
            .with_logprobs(self.config.logprobs, self.config.top_logprobs);
        if let Some(extra) = &self.config.extra_body {
            params = params.with_extra(extra.clone());
        }

        let inputs: Vec<PreparedInput> = prompts
            .iter()
            .map(|prompt| self.prepare(prompt, max_out_len, &params))
            .collect();
        debug!(inputs = inputs.len(), strategy = ?self.config.strategy, "dispatching batch");

        match self.config.strategy {
            DispatchStrategy::BoundedParallel => {
                let workers = self.config.workers.unwrap_or_else(default_workers);
                parallel::run(&self.executor, inputs, workers).await
            }
            DispatchStrategy::BatchedAsync => {
                let width = self.config.workers.unwrap_or(inputs.len());
                batched::run(&self.executor, inputs, width).await
            }
        }
    }

    /// Like [`generate`](Self::generate), rendering choice lists as JSON text.
    pub async fn generate_text(
        &self,
        prompts: &[Prompt],
        max_out_len: u32,
        temperature: f64,
    ) -> DispatchResult<Vec<String>> {
        let generations = self.generate(prompts, max_out_len, temperature).await?;
        Ok(generations.into_iter().map(Generation::into_text).collect())
    }

    fn prepare(&self, prompt: &Prompt, max_out_len: u32, params: &GenerationParams) -> PreparedInput {
        let requested = i64::from(max_out_len);

        let (envelope, window) = match prompt {
            Prompt::Text(text) if self.truncator.mode().is_enabled() => {
                let window = self.config.max_seq_len;
                let budget = window - PROMPT_BUFFER_TOKENS - requested;
                if budget <= 0 {
                    self.stats().record_skipped();
                    warn!(max_seq_len = window, max_out_len, "no room left for the prompt, skipping input");
                    return PreparedInput::Skip;
                }
                (Envelope::from_text(self.truncator.truncate(text, budget)), window)
            }
            other => (Envelope::from(other), context_window(&self.config.model)),
        };

        let input_tokens = self.estimator.estimate(&envelope.joined_content());
        let ceiling = output_ceiling(requested, window, input_tokens)
            .min(i64::from(self.config.max_completion_tokens));
        if ceiling <= 0 {
            self.stats().record_skipped();
            warn!(input_tokens, window, "prompt leaves no room for output, skipping input");
            return PreparedInput::Skip;
        }

        PreparedInput::Send {
            envelope,
            params: params.with_max_tokens(ceiling as u32),
        }
    }
}
