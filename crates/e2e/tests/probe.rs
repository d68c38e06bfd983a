//! HTTP preflight against a local mock server

use std::net::TcpListener;
use std::time::Duration;

use httpmock::prelude::*;
use quoteform_e2e::mock::{FakeBehavior, FakeBrowser};
use quoteform_e2e::probe::wait_for_target;
use quoteform_e2e::{E2eError, HarnessConfig, ScenarioSpec, TestRunner};

#[tokio::test]
async fn reachable_target_passes() {
    let server = MockServer::start_async().await;
    let page = server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("<form id=\"quoteForm\"></form>");
        })
        .await;

    let status = wait_for_target(&server.url("/"), Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(status, 200);
    page.assert_async().await;
}

#[tokio::test]
async fn client_error_counts_as_reachable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(404);
        })
        .await;

    let status = wait_for_target(&server.url("/missing"), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(status, 404);
}

#[tokio::test]
async fn server_error_times_out_as_setup_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(503);
        })
        .await;

    let err = wait_for_target(&server.url("/"), Duration::from_millis(800))
        .await
        .unwrap_err();

    assert!(matches!(err, E2eError::SessionSetup(_)), "{:?}", err);
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn closed_port_is_setup_failure() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = wait_for_target(&format!("http://127.0.0.1:{}/", port), Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unreachable"));
}

#[tokio::test]
async fn runner_preflight_blocks_unreachable_target() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = HarnessConfig {
        target_url: format!("http://127.0.0.1:{}/", port),
        ..Default::default()
    };
    config.timeouts.preflight_ms = 300;

    let browser = FakeBrowser::new(FakeBehavior::default());
    let mut runner = TestRunner::new(config, browser.clone());

    let err = runner.run_all(&ScenarioSpec::builtin()).await.unwrap_err();
    assert!(matches!(err, E2eError::SessionSetup(_)));
    assert_eq!(browser.log().launches, 0);
}
