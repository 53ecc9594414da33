//! Provider request bodies.
//!
//! The endpoint flavor is picked once when the executor is built; every
//! request then goes through the matching [`ApiRequest`] variant. Optional
//! fields left as `None` are omitted from the JSON body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::envelope::{Envelope, Message};

/// Reasoning models that take `max_completion_tokens` instead of `max_tokens`.
pub const REASONING_MODELS: &[&str] = &[
    "o1-preview-2024-09-12",
    "o1-mini-2024-09-12",
    "o1-preview",
    "o1-mini",
];

/// Endpoint flavor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    /// `/chat/completions` with a message list.
    #[default]
    Chat,
    /// Legacy `/completions` with a single prompt string.
    Completion,
}

impl ApiMode {
    pub fn from_is_chat(is_chat: bool) -> Self {
        if is_chat {
            ApiMode::Chat
        } else {
            ApiMode::Completion
        }
    }
}

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Output token ceiling for this input.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Request per-token log-probabilities.
    pub logprobs: bool,
    /// Number of alternatives per position when `logprobs` is set.
    pub top_logprobs: Option<u32>,
    /// Provider-specific fields merged into the body.
    pub extra: Map<String, Value>,
}

impl GenerationParams {
    pub fn new(max_tokens: u32, temperature: f64) -> Self {
        Self {
            max_tokens,
            temperature,
            logprobs: false,
            top_logprobs: None,
            extra: Map::new(),
        }
    }

    pub fn with_logprobs(mut self, logprobs: bool, top_logprobs: Option<u32>) -> Self {
        self.logprobs = logprobs;
        self.top_logprobs = top_logprobs;
        self
    }

    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    /// Same settings with a different output ceiling.
    pub fn with_max_tokens(&self, max_tokens: u32) -> Self {
        Self {
            max_tokens,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    pub n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Request body for either endpoint flavor.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ApiRequest {
    Chat(ChatRequest),
    Completion(CompletionRequest),
}

impl ApiRequest {
    /// JSON body. Extra fields override built-in ones with the same name.
    pub fn to_body(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Builds [`ApiRequest`]s for one model and endpoint flavor.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    model: String,
    mode: ApiMode,
}

impl PayloadBuilder {
    pub fn new(model: impl Into<String>, mode: ApiMode) -> Self {
        Self {
            model: model.into(),
            mode,
        }
    }

    pub fn mode(&self) -> ApiMode {
        self.mode
    }

    fn is_reasoning_model(&self) -> bool {
        REASONING_MODELS.contains(&self.model.as_str())
    }

    pub fn build(&self, envelope: &Envelope, params: &GenerationParams) -> ApiRequest {
        match self.mode {
            ApiMode::Chat => {
                let (max_tokens, max_completion_tokens) = if self.is_reasoning_model() {
                    (None, Some(params.max_tokens))
                } else {
                    (Some(params.max_tokens), None)
                };
                ApiRequest::Chat(ChatRequest {
                    model: self.model.clone(),
                    messages: envelope.messages().to_vec(),
                    max_tokens,
                    max_completion_tokens,
                    n: 1,
                    logprobs: Some(params.logprobs),
                    top_logprobs: params.top_logprobs,
                    stop: None,
                    temperature: Some(params.temperature),
                    extra: params.extra.clone(),
                })
            }
            ApiMode::Completion => ApiRequest::Completion(CompletionRequest {
                model: self.model.clone(),
                prompt: envelope.joined_content(),
                max_tokens: params.max_tokens,
                temperature: Some(params.temperature),
                extra: params.extra.clone(),
            }),
        }
    }
}
