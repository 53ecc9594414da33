//! Building, sending and classifying provider requests.
//!
//! - **Envelope**: normalized role-tagged message list
//! - **PayloadBuilder**: chat or completion body for one model
//! - **Transport**: HTTP seam, reqwest in production
//! - **RequestExecutor**: rate limiting, key rotation and the retry loop

mod envelope;
mod executor;
mod payload;
mod policy;
mod response;
mod transport;

pub use envelope::{Envelope, Message, Prompt, PromptRole, Role, Turn};
pub use executor::RequestExecutor;
pub use payload::{
    ApiMode, ApiRequest, ChatRequest, CompletionRequest, GenerationParams, PayloadBuilder,
    REASONING_MODELS,
};
pub use policy::RetryPolicy;
pub use response::{classify, Generation, Outcome};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
