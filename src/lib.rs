//! promptflux - inference request dispatcher for LLM evaluation runs.
//!
//! Sends batches of prompts to an OpenAI-compatible endpoint while
//! rotating API keys, pacing requests to a fixed rate, retrying transient
//! failures and fitting prompts into the model's context window.
//!
//! ```ignore
//! use promptflux::{Dispatcher, DispatcherConfig, Prompt};
//!
//! let config = DispatcherConfig::from_file("promptflux.toml")?;
//! let dispatcher = Dispatcher::new(config)?;
//! let answers = dispatcher
//!     .generate_text(&[Prompt::from("hello")], 256, 0.0)
//!     .await?;
//! ```

pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod ratelimit;
pub mod request;
pub mod tokens;

pub use config::DispatcherConfig;
pub use credentials::{Credential, CredentialPool};
pub use dispatch::{DispatchStrategy, Dispatcher};
pub use error::{DispatchError, DispatchResult};
pub use metrics::{DispatchStats, StatsSnapshot, TokenUsage};
pub use ratelimit::RateLimiter;
pub use request::{Generation, Prompt, PromptRole, Transport, Turn};
pub use tokens::{EstimationMethod, TokenEstimator, TruncationMode, Truncator};
