//! Shared mock transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use promptflux::request::{HttpRequest, HttpResponse, Transport, TransportError};
use serde_json::{json, Value};

type Handler = dyn Fn(&HttpRequest) -> (Duration, Result<HttpResponse, TransportError>) + Send + Sync;

/// Transport whose replies come from a closure; every request is recorded.
pub struct MockProvider {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockProvider {
    pub fn new(
        handler: impl Fn(&HttpRequest) -> (Duration, Result<HttpResponse, TransportError>) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Always answer `reply` immediately.
    pub fn replying(reply: &'static str) -> Arc<Self> {
        Self::new(move |_| (Duration::ZERO, Ok(chat_reply(reply))))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockProvider {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let (delay, reply) = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}

pub fn chat_reply(content: &str) -> HttpResponse {
    json_reply(200, json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
}

pub fn json_reply(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        body: body.to_string(),
    }
}

/// Content of the last chat message in a request body.
pub fn last_message(request: &HttpRequest) -> String {
    request.body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string()
}
