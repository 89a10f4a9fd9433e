//! wiremock stand-in for the video service

use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vidgen_dl::{BatchSession, Config};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const TEST_KEY: &str = "sk-test";

/// Answers with each template in turn, repeating the last one forever
pub struct Sequence {
    responses: Vec<ResponseTemplate>,
    calls: AtomicUsize,
}

impl Sequence {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(!responses.is_empty(), "sequence needs at least one response");
        Self {
            responses,
            calls: AtomicUsize::new(0),
        }
    }

    /// Status bodies, e.g. `[("queued", 0), ("in_progress", 40), ("completed", 100)]`
    pub fn statuses(steps: &[(&str, u32)]) -> Self {
        Self::new(
            steps
                .iter()
                .map(|(status, progress)| status_body(json!({"status": status, "progress": progress})))
                .collect(),
        )
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses[n.min(self.responses.len() - 1)].clone()
    }
}

pub fn status_body(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

/// Config pointed at the mock server, with a fast poll cadence
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::new(TEST_KEY);
    config.api.base_url = server.uri();
    config.polling.interval = Duration::from_millis(20);
    config
}

/// `POST /videos` for `prompt` answers with job `id`
pub async fn mount_job(server: &MockServer, prompt: &str, id: &str) {
    Mock::given(method("POST"))
        .and(path("/videos"))
        .and(header("authorization", format!("Bearer {}", TEST_KEY).as_str()))
        .and(body_partial_json(json!({"prompt": prompt})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "object": "video",
            "status": "queued",
        })))
        .mount(server)
        .await;
}

/// `POST /videos` for `prompt` answers with `response`
pub async fn mount_submit_response(server: &MockServer, prompt: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/videos"))
        .and(body_partial_json(json!({"prompt": prompt})))
        .respond_with(response)
        .mount(server)
        .await;
}

pub async fn mount_status(server: &MockServer, id: &str, sequence: Sequence) {
    Mock::given(method("GET"))
        .and(path(format!("/videos/{}", id)))
        .respond_with(sequence)
        .mount(server)
        .await;
}

pub async fn mount_content(server: &MockServer, id: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/videos/{}/content", id)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(body),
        )
        .mount(server)
        .await;
}

/// Number of requests the server received for `method` on paths starting with `prefix`
pub async fn request_count(server: &MockServer, http_method: &str, prefix: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path().starts_with(prefix))
        .count()
}

/// Drive the session to completion, failing the test after `secs` seconds
pub async fn complete_within(session: &mut BatchSession, secs: u64) -> Vec<vidgen_dl::Event> {
    tokio::time::timeout(Duration::from_secs(secs), async {
        let mut events = Vec::new();
        while let Some(event) = session.next_event().await {
            events.push(event);
        }
        events
    })
    .await
    .expect("batch did not complete in time")
}
