// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crawler_pipeline::cursor::cursor_path_for;
use crawler_pipeline::{
    HttpDeliveryClient, Orchestrator, PipelineConfig, PipelineState, PollConfig, RetryPolicy,
};
use mockito::{Matcher, Server};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn append(path: &Path, content: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

fn config_for(backend_url: String, sources: Vec<PathBuf>) -> PipelineConfig {
    PipelineConfig {
        backend_url,
        api_key: Some("test-key".to_string()),
        sources,
        hostname: Some("H".to_string()),
        poll: PollConfig {
            active_interval: Duration::from_millis(5),
            idle_interval: Duration::from_millis(20),
            adaptive_backoff: Some(2.0),
        },
        retry: RetryPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            max_attempts: 3,
        },
        ..Default::default()
    }
}

/// Cancels `token` once the cursor of `source` covers the whole file.
fn cancel_when_consumed(source: PathBuf, token: CancellationToken) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            let saved = fs::read_to_string(cursor_path_for(&source)).unwrap_or_default();
            if saved.parse::<u64>().ok() == fs::metadata(&source).ok().map(|m| m.len()) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        token.cancel();
    })
}

#[test]
fn ships_enriched_objects_and_drops_non_json() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("gpumon_0.log");
    append(&source, "{\"metric\":\"power\",\"watts\":100}\nnot-json\n");

    let mut server = Server::new();
    let unexpected = server
        .mock("POST", "/metrics")
        .match_body(Matcher::Any)
        .with_status(200)
        .expect(0)
        .create();
    let power = server
        .mock("POST", "/metrics")
        .match_header("X-API-Key", "test-key")
        .match_body(Matcher::Exact(
            r#"{"hostname":"H","metric":"power","watts":100}"#.to_string(),
        ))
        .with_status(200)
        .expect(1)
        .create();

    let config = config_for(server.url(), vec![source.clone()]);
    let mut orchestrator = Orchestrator::start(&config, HttpDeliveryClient::new(&config)).unwrap();

    let token = CancellationToken::new();
    let canceller = cancel_when_consumed(source, token.clone());
    let stats = orchestrator.run(&token);
    canceller.join().unwrap();

    assert_eq!(orchestrator.state(), PipelineState::Stopped);
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.rejected, 1);
    power.assert();
    unexpected.assert();
}

#[test]
fn restart_resumes_from_saved_cursor() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("gpumon_0.log");
    append(&source, "{\"seq\":1}\n");

    let mut server = Server::new();
    let first = server
        .mock("POST", "/metrics")
        .match_body(Matcher::Exact(r#"{"hostname":"H","seq":1}"#.to_string()))
        .with_status(200)
        .expect(1)
        .create();
    let second = server
        .mock("POST", "/metrics")
        .match_body(Matcher::Exact(r#"{"hostname":"H","seq":2}"#.to_string()))
        .with_status(200)
        .expect(1)
        .create();

    let config = config_for(server.url(), vec![source.clone()]);
    for _ in 0..2 {
        let mut orchestrator =
            Orchestrator::start(&config, HttpDeliveryClient::new(&config)).unwrap();
        let token = CancellationToken::new();
        let canceller = cancel_when_consumed(source.clone(), token.clone());
        orchestrator.run(&token);
        canceller.join().unwrap();

        append(&source, "{\"seq\":2}\n");
    }

    first.assert();
    // The second run picked up seq 2; the line appended after it stopped is
    // left for the next run.
    second.assert();
    assert_eq!(
        fs::read_to_string(cursor_path_for(&source)).unwrap(),
        "20"
    );
}
