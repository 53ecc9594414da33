//! Dispatcher configuration.
//!
//! Settings can be built in code with the `with_*` methods or loaded from a
//! TOML file overlaid with `PROMPTFLUX_*` environment variables. Keys and the
//! proxy URL accept the `"ENV"` sentinel, which defers to `OPENAI_API_KEY`
//! (comma-separated) and `OPENAI_PROXY_URL`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dispatch::DispatchStrategy;
use crate::error::{DispatchError, DispatchResult};
use crate::request::RetryPolicy;
use crate::tokens::{EstimationMethod, TruncationMode};

/// Sentinel meaning "read this from the environment".
pub const ENV_SENTINEL: &str = "ENV";
/// Comma-separated API keys.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Proxy URL.
pub const PROXY_URL_ENV: &str = "OPENAI_PROXY_URL";
/// Base of the default endpoint.
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
/// Slowest accepted rate limit: one request per day.
pub const MIN_QUERY_PER_SECOND: f64 = 1.0 / 86_400.0;
/// Prefix for environment overrides of file settings.
pub const CONFIG_ENV_PREFIX: &str = "PROMPTFLUX";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

/// A single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    One(String),
    Many(Vec<String>),
}

impl StringList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            StringList::One(s) => vec![s.clone()],
            StringList::Many(v) => v.clone(),
        }
    }
}

impl Default for StringList {
    fn default() -> Self {
        StringList::One(ENV_SENTINEL.to_string())
    }
}

/// Endpoint URL: `$OPENAI_BASE_URL` (or the public API) plus `chat/completions`.
pub fn default_api_base_with(env: impl Fn(&str) -> Option<String>) -> String {
    let base = env(BASE_URL_ENV)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    if base.ends_with('/') {
        format!("{base}{CHAT_COMPLETIONS_PATH}")
    } else {
        format!("{base}/{CHAT_COMPLETIONS_PATH}")
    }
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Configuration for one dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Model identifier sent with every request
    pub model: String,

    /// Maximum prompt + output length; the truncation window when `mode` is set
    pub max_seq_len: i64,

    /// Requests per second across all workers (<= 0 disables limiting)
    pub query_per_second: f64,

    /// Log the measured request rate on every grant
    pub rpm_verbose: bool,

    /// Attempts per input
    pub retry: u32,

    /// API key(s), or `"ENV"`
    pub key: StringList,

    /// Organization(s) rotated alongside the keys
    pub org: Option<StringList>,

    /// Full endpoint URL
    pub api_base: String,

    /// Proxy URL, or `"ENV"`
    pub proxy_url: Option<String>,

    /// Which part of an over-long prompt to keep
    pub mode: TruncationMode,

    /// Request log-probabilities and return raw choices
    pub logprobs: bool,

    /// Alternatives per position when `logprobs` is set
    pub top_logprobs: Option<u32>,

    /// Fixed temperature overriding the per-call value
    pub temperature: Option<f64>,

    /// Tokenizer name or `tokenizer.json` path used instead of the model id
    pub tokenizer_path: Option<String>,

    /// Extra JSON fields merged into every request body
    pub extra_body: Option<Map<String, Value>>,

    /// Upper bound on requested output tokens
    pub max_completion_tokens: u32,

    /// Chat endpoint when true, legacy completion endpoint otherwise
    pub is_chat: bool,

    /// Bounded-parallel or batched-async dispatch
    pub strategy: DispatchStrategy,

    /// Exact or heuristic token counting
    pub estimator: EstimationMethod,

    /// Concurrent requests (default: available parallelism)
    pub workers: Option<usize>,

    /// HTTP timeout per attempt, in seconds
    pub request_timeout_secs: u64,

    /// Pause after a rate-limit error, in seconds
    pub rate_limit_backoff_secs: f64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            max_seq_len: 4096,
            query_per_second: 1.0,
            rpm_verbose: false,
            retry: 2,
            key: StringList::default(),
            org: None,
            api_base: default_api_base_with(process_env),
            proxy_url: None,
            mode: TruncationMode::None,
            logprobs: false,
            top_logprobs: None,
            temperature: Some(0.0),
            tokenizer_path: None,
            extra_body: None,
            max_completion_tokens: 16_384,
            is_chat: true,
            strategy: DispatchStrategy::default(),
            estimator: EstimationMethod::default(),
            workers: None,
            request_timeout_secs: 60,
            rate_limit_backoff_secs: 10.0,
        }
    }
}

/// `[extra_body]` read straight from the file, keys untouched.
#[derive(Deserialize)]
struct RawExtraBody {
    #[serde(default)]
    extra_body: Option<Map<String, Value>>,
}

impl DispatcherConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file, then apply `PROMPTFLUX_*` environment overrides.
    ///
    /// The `[extra_body]` table is taken from the file as written, since the
    /// provider expects its keys with their original case.
    pub fn from_file(path: impl AsRef<Path>) -> DispatchResult<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(CONFIG_ENV_PREFIX))
            .build()?;
        let mut config: Self = settings.try_deserialize()?;

        let raw: RawExtraBody = toml::from_str(&fs::read_to_string(path)?)?;
        if let Some(extra_body) = raw.extra_body {
            config.extra_body = Some(extra_body);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_seq_len(mut self, len: i64) -> Self {
        self.max_seq_len = len;
        self
    }

    pub fn with_query_per_second(mut self, qps: f64) -> Self {
        self.query_per_second = qps;
        self
    }

    pub fn with_rpm_verbose(mut self, verbose: bool) -> Self {
        self.rpm_verbose = verbose;
        self
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = StringList::One(key.into());
        self
    }

    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.key = StringList::Many(keys);
        self
    }

    pub fn with_orgs(mut self, orgs: Vec<String>) -> Self {
        self.org = Some(StringList::Many(orgs));
        self
    }

    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }

    pub fn with_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub fn with_mode(mut self, mode: TruncationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_logprobs(mut self, logprobs: bool, top_logprobs: Option<u32>) -> Self {
        self.logprobs = logprobs;
        self.top_logprobs = top_logprobs;
        self
    }

    /// Fixed temperature; `None` lets each call choose.
    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_tokenizer_path(mut self, path: impl Into<String>) -> Self {
        self.tokenizer_path = Some(path.into());
        self
    }

    pub fn with_extra_body(mut self, extra: Map<String, Value>) -> Self {
        self.extra_body = Some(extra);
        self
    }

    pub fn with_max_completion_tokens(mut self, tokens: u32) -> Self {
        self.max_completion_tokens = tokens;
        self
    }

    pub fn with_is_chat(mut self, is_chat: bool) -> Self {
        self.is_chat = is_chat;
        self
    }

    pub fn with_strategy(mut self, strategy: DispatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_estimator(mut self, estimator: EstimationMethod) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_rate_limit_backoff_secs(mut self, secs: f64) -> Self {
        self.rate_limit_backoff_secs = secs;
        self
    }

    /// Reject settings the dispatcher cannot run with.
    pub fn validate(&self) -> DispatchResult<()> {
        let invalid = |msg: &str| Err(DispatchError::InvalidConfig(msg.to_string()));
        if self.model.trim().is_empty() {
            return invalid("model must not be empty");
        }
        if self.api_base.trim().is_empty() {
            return invalid("api_base must not be empty");
        }
        if self.retry == 0 {
            return invalid("retry must be at least 1");
        }
        if self.max_seq_len <= 0 {
            return invalid("max_seq_len must be positive");
        }
        if self.workers == Some(0) {
            return invalid("workers must be at least 1");
        }
        if Duration::try_from_secs_f64(self.rate_limit_backoff_secs).is_err() {
            return invalid("rate_limit_backoff_secs must be a non-negative number of seconds");
        }
        if self.query_per_second > 0.0 && self.query_per_second < MIN_QUERY_PER_SECOND {
            return invalid("query_per_second must be 0 (unlimited) or at least one request per day");
        }
        Ok(())
    }

    /// Retry and timing settings for the request executor and its transport.
    pub fn retry_policy(&self) -> DispatchResult<RetryPolicy> {
        let backoff = Duration::try_from_secs_f64(self.rate_limit_backoff_secs).map_err(|e| {
            DispatchError::InvalidConfig(format!("rate_limit_backoff_secs: {e}"))
        })?;
        Ok(RetryPolicy::new()
            .with_max_attempts(self.retry)
            .with_rate_limit_backoff(backoff)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs)))
    }

    /// API keys, resolving `"ENV"` through the process environment.
    pub fn resolve_keys(&self) -> DispatchResult<Vec<String>> {
        self.resolve_keys_with(process_env)
    }

    /// API keys, resolving `"ENV"` through `env`.
    pub fn resolve_keys_with(&self, env: impl Fn(&str) -> Option<String>) -> DispatchResult<Vec<String>> {
        let keys = match &self.key {
            StringList::One(key) if key == ENV_SENTINEL => {
                let raw = env(API_KEY_ENV).ok_or_else(|| DispatchError::MissingEnv(API_KEY_ENV.to_string()))?;
                raw.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            other => other.to_vec(),
        };
        if keys.is_empty() {
            return Err(DispatchError::InvalidConfig("no API key configured".to_string()));
        }
        Ok(keys)
    }

    /// Proxy URL, resolving `"ENV"` through the process environment.
    pub fn resolve_proxy(&self) -> DispatchResult<Option<String>> {
        self.resolve_proxy_with(process_env)
    }

    /// Proxy URL, resolving `"ENV"` through `env`.
    pub fn resolve_proxy_with(&self, env: impl Fn(&str) -> Option<String>) -> DispatchResult<Option<String>> {
        match self.proxy_url.as_deref() {
            Some(ENV_SENTINEL) => env(PROXY_URL_ENV)
                .map(Some)
                .ok_or_else(|| DispatchError::MissingEnv(PROXY_URL_ENV.to_string())),
            other => Ok(other.map(str::to_string)),
        }
    }

    /// Configured organizations, possibly none.
    pub fn orgs(&self) -> Vec<String> {
        self.org.as_ref().map(StringList::to_vec).unwrap_or_default()
    }
}
