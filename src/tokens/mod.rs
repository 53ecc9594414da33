//! Token accounting for outgoing prompts.
//!
//! - **TokenEstimator**: counts tokens, exactly or heuristically
//! - **Truncator**: shrinks over-long prompts to a token budget
//! - **context_window / output_ceiling**: per-model input+output limits
//!
//! # Example
//!
//! ```ignore
//! use promptflux::tokens::{TokenEstimator, Truncator, TruncationMode};
//!
//! let truncator = Truncator::new(TokenEstimator::heuristic(), TruncationMode::Front);
//! let prompt = truncator.truncate(&long_prompt, 2_000);
//! ```

mod estimator;
mod truncate;
mod window;

pub use estimator::{heuristic_count, EstimationMethod, TokenEstimator};
pub use truncate::{TruncationMode, Truncator};
pub use window::{context_window, output_ceiling, DEFAULT_CONTEXT_WINDOW, PROMPT_BUFFER_TOKENS};
