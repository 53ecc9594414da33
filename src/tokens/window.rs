//! Context window sizes by model family.

/// Tokens held back for estimation error when sizing the output.
pub const PROMPT_BUFFER_TOKENS: i64 = 100;

/// Window assumed for models whose name gives no hint.
pub const DEFAULT_CONTEXT_WINDOW: i64 = 32_768;

/// Maximum combined input and output tokens the model accepts.
pub fn context_window(model: &str) -> i64 {
    if model.contains("32k") {
        32_768
    } else if model.contains("16k") {
        16_384
    } else if model.contains("gpt-4") {
        8_192
    } else if model.contains("gpt-3.5") {
        4_097
    } else {
        DEFAULT_CONTEXT_WINDOW
    }
}

/// Output ceiling for one input, leaving [`PROMPT_BUFFER_TOKENS`] of slack.
///
/// A result `<= 0` means the input cannot fit even a minimal response.
pub fn output_ceiling(requested: i64, window: i64, input_tokens: usize) -> i64 {
    let room = window - input_tokens as i64 - PROMPT_BUFFER_TOKENS;
    requested.min(room)
}
