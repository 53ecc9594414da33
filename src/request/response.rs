//! Response classification.

use serde::Serialize;
use serde_json::Value;

use super::payload::ApiMode;
use crate::metrics::usage::{parse_usage, TokenUsage};

/// What one input produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Generation {
    /// Generated text, trimmed. Empty when the input was skipped.
    Text(String),
    /// Raw `choices` records, returned when log-probabilities were requested.
    Choices(Vec<Value>),
}

impl Generation {
    /// The empty result used for skipped inputs.
    pub fn skipped() -> Self {
        Generation::Text(String::new())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Generation::Text(text) => Some(text),
            Generation::Choices(_) => None,
        }
    }

    /// Text as-is, or the choice list rendered as JSON.
    pub fn into_text(self) -> String {
        match self {
            Generation::Text(text) => text,
            Generation::Choices(choices) => Value::Array(choices).to_string(),
        }
    }
}

/// Classified result of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        generation: Generation,
        usage: Option<TokenUsage>,
    },
    /// Body is not JSON.
    Malformed(String),
    RateLimited,
    QuotaExhausted,
    InvalidPrompt,
    /// Any other error or unexpected shape.
    ApiError(Value),
}

const RATE_LIMIT_CODE: &str = "rate_limit_exceeded";
const QUOTA_CODE: &str = "insufficient_quota";
const INVALID_PROMPT_CODE: &str = "invalid_prompt";
const HTTP_TOO_MANY_REQUESTS: u16 = 429;

/// Classify a provider response.
pub fn classify(status: u16, body: &str, mode: ApiMode, logprobs: bool) -> Outcome {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return Outcome::Malformed(body.chars().take(200).collect()),
    };

    if let Some(generation) = extract_generation(&value, mode, logprobs) {
        return Outcome::Success {
            generation,
            usage: parse_usage(&value),
        };
    }

    if let Some(error) = value.get("error") {
        let code = error.get("code").and_then(Value::as_str);
        let kind = error.get("type").and_then(Value::as_str);
        return match (code, kind) {
            (Some(RATE_LIMIT_CODE), _) => Outcome::RateLimited,
            (Some(QUOTA_CODE), _) => Outcome::QuotaExhausted,
            (Some(INVALID_PROMPT_CODE), _) | (_, Some(INVALID_PROMPT_CODE)) => Outcome::InvalidPrompt,
            _ if status == HTTP_TOO_MANY_REQUESTS => Outcome::RateLimited,
            _ => Outcome::ApiError(error.clone()),
        };
    }

    if status == HTTP_TOO_MANY_REQUESTS {
        return Outcome::RateLimited;
    }
    Outcome::ApiError(value)
}

fn extract_generation(value: &Value, mode: ApiMode, logprobs: bool) -> Option<Generation> {
    if logprobs {
        return value
            .get("choices")
            .and_then(Value::as_array)
            .map(|choices| Generation::Choices(choices.clone()));
    }
    let pointer = match mode {
        ApiMode::Chat => "/choices/0/message/content",
        ApiMode::Completion => "/choices/0/text",
    };
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(|text| Generation::Text(text.trim().to_string()))
}
