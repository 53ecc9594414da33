//! End-to-end dispatch scenarios.

use std::io::Write;
use std::time::{Duration, Instant};

use promptflux::request::TransportError;
use promptflux::{
    DispatchError, DispatchStrategy, Dispatcher, DispatcherConfig, EstimationMethod, Generation,
    Prompt, PromptRole, TruncationMode, Turn,
};
use serde_json::json;

use crate::support::{chat_reply, json_reply, last_message, MockProvider};

fn base_config() -> DispatcherConfig {
    DispatcherConfig::new()
        .with_key("sk-test-0001")
        .with_api_base("http://mock.local/v1/chat/completions")
        .with_estimator(EstimationMethod::Heuristic)
        .with_query_per_second(0.0)
}

#[tokio::test]
async fn test_single_prompt_round_trip() {
    let provider = MockProvider::replying("hi there");
    let config = base_config().with_query_per_second(2.0).with_retry(1);
    let dispatcher = Dispatcher::with_transport(config, provider.clone()).unwrap();

    let out = dispatcher
        .generate_text(&[Prompt::from("hello")], 64, 0.0)
        .await
        .unwrap();
    assert_eq!(out, vec!["hi there".to_string()]);

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://mock.local/v1/chat/completions");
    assert_eq!(requests[0].header("Authorization"), Some("Bearer sk-test-0001"));
    assert_eq!(
        requests[0].body["messages"],
        json!([{"role": "user", "content": "hello"}])
    );
    assert_eq!(requests[0].body["n"], json!(1));
    assert_eq!(requests[0].body["model"], json!("gpt-3.5-turbo"));

    let stats = dispatcher.stats().snapshot();
    assert_eq!(stats.attempts, 1);
    assert_eq!(stats.successes, 1);
}

#[tokio::test]
async fn test_single_key_out_of_quota_fails_after_one_attempt() {
    let provider = MockProvider::new(|_| {
        (
            Duration::ZERO,
            Ok(json_reply(
                429,
                json!({"error": {"code": "insufficient_quota", "message": "quota"}}),
            )),
        )
    });
    let config = base_config().with_retry(3);
    let dispatcher = Dispatcher::with_transport(config, provider.clone()).unwrap();

    let err = dispatcher
        .generate(&[Prompt::from("hello")], 64, 0.0)
        .await
        .unwrap_err();
    assert!(err.is_exhaustion());
    assert!(matches!(err, DispatchError::AllCredentialsInvalid));
    assert_eq!(provider.requests().len(), 1);
}

fn staggered_provider() -> std::sync::Arc<MockProvider> {
    MockProvider::new(|request| {
        let prompt = last_message(request);
        let delay = match prompt.as_str() {
            "A" => Duration::from_millis(120),
            "B" => Duration::from_millis(60),
            _ => Duration::ZERO,
        };
        (delay, Ok(chat_reply(&prompt)))
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_keeps_input_order_under_staggered_latency() {
    let provider = staggered_provider();
    let config = base_config()
        .with_strategy(DispatchStrategy::BoundedParallel)
        .with_workers(3);
    let dispatcher = Dispatcher::with_transport(config, provider.clone()).unwrap();

    let prompts = [Prompt::from("A"), Prompt::from("B"), Prompt::from("C")];
    let out = dispatcher.generate_text(&prompts, 8, 0.0).await.unwrap();
    assert_eq!(out, vec!["A", "B", "C"]);
    assert_eq!(provider.requests().len(), 3);
}

#[tokio::test]
async fn test_batched_keeps_input_order_under_staggered_latency() {
    let provider = staggered_provider();
    let config = base_config().with_strategy(DispatchStrategy::BatchedAsync);
    let dispatcher = Dispatcher::with_transport(config, provider.clone()).unwrap();

    let prompts = [Prompt::from("A"), Prompt::from("B"), Prompt::from("C")];
    let started = Instant::now();
    let out = dispatcher.generate_text(&prompts, 8, 0.0).await.unwrap();
    assert_eq!(out, vec!["A", "B", "C"]);
    // all three were in flight together
    assert!(started.elapsed() < Duration::from_millis(180 + 60));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rate_limit_spaces_requests_across_workers() {
    let provider = MockProvider::replying("ok");
    let config = base_config().with_query_per_second(10.0).with_workers(5);
    let dispatcher = Dispatcher::with_transport(config, provider.clone()).unwrap();

    let prompts: Vec<Prompt> = (0..5).map(|i| Prompt::from(format!("p{i}"))).collect();
    let started = Instant::now();
    let out = dispatcher.generate(&prompts, 8, 0.0).await.unwrap();
    assert_eq!(out.len(), 5);
    // (5 - 1) / 10 QPS
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn test_keys_rotate_across_a_batch() {
    let provider = MockProvider::replying("ok");
    let config = base_config()
        .with_keys(vec!["sk-a".into(), "sk-b".into()])
        .with_strategy(DispatchStrategy::BatchedAsync)
        .with_workers(1);
    let dispatcher = Dispatcher::with_transport(config, provider.clone()).unwrap();

    let prompts: Vec<Prompt> = (0..4).map(|i| Prompt::from(format!("p{i}"))).collect();
    dispatcher.generate(&prompts, 8, 0.0).await.unwrap();

    let keys: Vec<String> = provider
        .requests()
        .iter()
        .map(|r| r.header("api-key").unwrap_or_default().to_string())
        .collect();
    assert_eq!(keys, vec!["sk-a", "sk-b", "sk-a", "sk-b"]);
}

#[tokio::test]
async fn test_front_truncation_sends_a_suffix() {
    let provider = MockProvider::new(|request| (Duration::ZERO, Ok(chat_reply(&last_message(request)))));
    let original: Vec<String> = (1..=200).map(|i| format!("word{i}")).collect();
    let original = original.join(" ");
    let config = base_config()
        .with_mode(TruncationMode::Front)
        .with_max_seq_len(200);
    let dispatcher = Dispatcher::with_transport(config, provider.clone()).unwrap();

    // budget = 200 - 100 - 20 = 80 tokens
    let out = dispatcher
        .generate_text(&[Prompt::from(original.clone())], 20, 0.0)
        .await
        .unwrap();
    let sent = &out[0];
    assert!(!sent.is_empty());
    assert!(original.ends_with(sent.as_str()));
    assert!(sent.split_whitespace().count() <= 80);
}

#[tokio::test]
async fn test_connection_errors_degrade_to_exhaustion() {
    let provider = MockProvider::new(|_| {
        (
            Duration::ZERO,
            Err(TransportError::Connection("connection refused".into())),
        )
    });
    let config = base_config().with_retry(2);
    let dispatcher = Dispatcher::with_transport(config, provider.clone()).unwrap();

    let err = dispatcher
        .generate(&[Prompt::from("x")], 8, 0.0)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::RetriesExhausted { attempts: 2 }));
    assert_eq!(provider.requests().len(), 2);
    assert_eq!(dispatcher.stats().snapshot().connection_errors, 2);
}

#[tokio::test]
async fn test_invalid_prompt_yields_empty_text() {
    let provider = MockProvider::new(|request| {
        let reply = if last_message(request) == "bad" {
            json_reply(400, json!({"error": {"code": null, "type": "invalid_prompt"}}))
        } else {
            chat_reply("fine")
        };
        (Duration::ZERO, Ok(reply))
    });
    let dispatcher = Dispatcher::with_transport(base_config().with_retry(3), provider.clone()).unwrap();

    let out = dispatcher
        .generate(&[Prompt::from("bad"), Prompt::from("good")], 8, 0.0)
        .await
        .unwrap();
    assert_eq!(out, vec![Generation::skipped(), Generation::Text("fine".into())]);
    assert_eq!(provider.requests().len(), 2);
}

#[tokio::test]
async fn test_logprobs_return_raw_choices() {
    let provider = MockProvider::new(|_| {
        (
            Duration::ZERO,
            Ok(json_reply(
                200,
                json!({"choices": [{"message": {"content": "yes"}, "logprobs": {"content": []}}]}),
            )),
        )
    });
    let config = base_config().with_logprobs(true, Some(5));
    let dispatcher = Dispatcher::with_transport(config, provider.clone()).unwrap();

    let out = dispatcher.generate(&[Prompt::from("q")], 8, 0.0).await.unwrap();
    assert!(matches!(&out[0], Generation::Choices(choices) if choices.len() == 1));

    let body = &provider.requests()[0].body;
    assert_eq!(body["logprobs"], json!(true));
    assert_eq!(body["top_logprobs"], json!(5));
}

#[tokio::test]
async fn test_completion_endpoint_joins_turns() {
    let provider = MockProvider::new(|_| {
        (
            Duration::ZERO,
            Ok(json_reply(200, json!({"choices": [{"text": "  done \n"}]}))),
        )
    });
    let config = base_config()
        .with_is_chat(false)
        .with_model("davinci-002")
        .with_api_base("http://mock.local/v1/completions");
    let dispatcher = Dispatcher::with_transport(config, provider.clone()).unwrap();

    let turns = vec![
        Turn::new(PromptRole::System, "rules"),
        Turn::new(PromptRole::Human, "question"),
    ];
    let out = dispatcher
        .generate_text(&[Prompt::from(turns)], 8, 0.0)
        .await
        .unwrap();
    assert_eq!(out, vec!["done".to_string()]);
    assert_eq!(provider.requests()[0].body["prompt"], json!("rules\nquestion"));
}

#[tokio::test]
async fn test_dispatcher_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
model = "gpt-4"
key = ["sk-file-1"]
org = ["org-1"]
api_base = "http://mock.local/v1/chat/completions"
query_per_second = 0
estimator = "heuristic"
strategy = "batched"

[extra_body]
seed = 42
"#
    )
    .unwrap();

    let config = DispatcherConfig::from_file(file.path()).unwrap();
    let provider = MockProvider::replying("ok");
    let dispatcher = Dispatcher::with_transport(config, provider.clone()).unwrap();
    dispatcher.generate(&[Prompt::from("x")], 8, 0.0).await.unwrap();

    let request = &provider.requests()[0];
    assert_eq!(request.header("OpenAI-Organization"), Some("org-1"));
    assert_eq!(request.body["seed"], json!(42));
    assert_eq!(request.body["model"], json!("gpt-4"));
}
