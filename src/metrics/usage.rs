//! Token usage reported by the provider.
//!
//! Chat and completion responses carry a `usage` object:
//!
//! - **OpenAI-compatible**: `{"prompt_tokens": N, "completion_tokens": N, "total_tokens": N}`
//! - **Anthropic-style proxies**: `{"input_tokens": N, "output_tokens": N}`
//!
//! Either shape is accepted; anything else yields `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token counts for one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input/prompt tokens
    pub prompt_tokens: u64,
    /// Output/completion tokens
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Extract the `usage` object of a response body.
pub fn parse_usage(response: &Value) -> Option<TokenUsage> {
    let usage = response.get("usage")?;

    if let Ok(openai) = OpenAiUsage::deserialize(usage) {
        return Some(TokenUsage::new(openai.prompt_tokens, openai.completion_tokens));
    }
    if let Ok(anthropic) = AnthropicUsage::deserialize(usage) {
        return Some(TokenUsage::new(anthropic.input_tokens, anthropic.output_tokens));
    }
    None
}
