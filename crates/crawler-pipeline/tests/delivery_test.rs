// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crawler_pipeline::{
    DeliveryClient, DeliveryError, HttpDeliveryClient, PipelineConfig, RetryPolicy,
};
use mockito::{Matcher, Server};
use reqwest::StatusCode;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const EVENT: &str = r#"{"hostname":"gpu-node-1","metric":"power","watts":100}"#;

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(40),
        max_attempts,
    }
}

fn client_for(backend_url: String, api_key: Option<&str>, retry: RetryPolicy) -> HttpDeliveryClient {
    HttpDeliveryClient::new(&PipelineConfig {
        backend_url,
        api_key: api_key.map(str::to_string),
        retry,
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    })
}

#[test]
fn server_errors_are_retried_until_success() {
    let mut server = Server::new();
    let failing = server
        .mock("POST", "/metrics")
        .with_status(503)
        .expect(3)
        .create();
    let accepted = server
        .mock("POST", "/metrics")
        .with_status(200)
        .expect(1)
        .create();

    let client = client_for(server.url(), None, fast_retry(10));
    let started = Instant::now();
    let attempts = client.deliver(EVENT).unwrap();

    assert_eq!(attempts, 4);
    // 20 ms, then 40 ms twice once the cap is reached.
    assert!(started.elapsed() >= Duration::from_millis(100));
    failing.assert();
    accepted.assert();
}

#[test]
fn retries_are_exhausted_on_persistent_server_errors() {
    let mut server = Server::new();
    let failing = server
        .mock("POST", "/metrics")
        .with_status(500)
        .expect(3)
        .create();

    let client = client_for(server.url(), None, fast_retry(3));
    let result = client.deliver(EVENT);

    assert!(
        matches!(result, Err(DeliveryError::RetriesExhausted { attempts: 3, .. })),
        "{result:?}"
    );
    failing.assert();
}

#[test]
fn unauthorized_invokes_hook_without_retrying() {
    let mut server = Server::new();
    let unauthorized = server
        .mock("POST", "/metrics")
        .with_status(401)
        .expect(1)
        .create();

    let calls = Arc::new(AtomicUsize::new(0));
    let hook_calls = Arc::clone(&calls);
    let client = client_for(server.url(), Some("revoked"), fast_retry(10))
        .with_auth_rejected_hook(Arc::new(move || {
            hook_calls.fetch_add(1, Ordering::SeqCst);
        }));

    client.send(EVENT);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    unauthorized.assert();
    assert!(matches!(
        client.deliver(EVENT),
        Err(DeliveryError::AuthRejected)
    ));
}

#[test]
fn client_errors_are_dropped_after_one_attempt() {
    let mut server = Server::new();
    let rejected = server
        .mock("POST", "/metrics")
        .with_status(400)
        .expect(1)
        .create();

    let client = client_for(server.url(), None, fast_retry(10));
    let result = client.deliver(EVENT);

    match result {
        Err(e @ DeliveryError::Rejected(StatusCode::BAD_REQUEST)) => assert!(e.is_fatal()),
        other => panic!("unexpected result: {other:?}"),
    }
    rejected.assert();
}

#[test]
fn request_carries_headers_and_body() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/metrics")
        .match_header("Content-Type", "application/json")
        .match_header("X-API-Key", "secret-key")
        .match_body(Matcher::Exact(EVENT.to_string()))
        .with_status(202)
        .expect(1)
        .create();

    let client = client_for(format!("{}/", server.url()), Some("secret-key"), fast_retry(1));
    assert_eq!(client.deliver(EVENT).unwrap(), 1);
    mock.assert();
}

#[test]
fn api_key_header_is_omitted_when_not_configured() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/metrics")
        .match_header("X-API-Key", Matcher::Missing)
        .with_status(200)
        .expect(1)
        .create();

    let client = client_for(server.url(), Some(""), fast_retry(1));
    client.deliver(EVENT).unwrap();
    mock.assert();
}

#[test]
fn connection_failures_are_retryable() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let client = client_for(format!("http://127.0.0.1:{port}"), None, fast_retry(2));
    let result = client.deliver(EVENT);

    assert!(
        matches!(result, Err(DeliveryError::RetriesExhausted { attempts: 2, .. })),
        "{result:?}"
    );
}

#[test]
fn malformed_url_returns_promptly() {
    let client = client_for("::not-a-url::".to_string(), None, RetryPolicy::default());
    let started = Instant::now();
    client.send(EVENT);
    assert!(started.elapsed() < Duration::from_secs(1));
}
