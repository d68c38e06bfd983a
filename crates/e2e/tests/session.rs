//! Browser session lifecycle and diagnostics hooks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quoteform_e2e::config::DiagnosticsSettings;
use quoteform_e2e::diagnostics::{Capture, Diagnostics};
use quoteform_e2e::mock::{FakeBehavior, FakeBrowser};
use quoteform_e2e::session::SessionOptions;
use quoteform_e2e::{BrowserSession, E2eError, HarnessConfig, QuoteForm, QuoteFormSchema, QuoteSubmission};

fn options() -> SessionOptions {
    SessionOptions::from_config(&HarnessConfig::default())
}

fn valid_submission() -> QuoteSubmission {
    QuoteSubmission {
        name: Some("John Doe".to_string()),
        email: Some("test@example.com".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn open_leaves_page_ready() {
    let browser = FakeBrowser::new(FakeBehavior::default());
    let session = BrowserSession::open(&browser, &options()).await.unwrap();

    let log = browser.log();
    assert_eq!(log.navigations, vec!["https://qatest.datasub.com".to_string()]);
    assert!(log.actions.iter().any(|a| a.starts_with("evaluate:")));
    assert!(log.actions.contains(&"wait:#name".to_string()));

    let other = BrowserSession::open(&browser, &options()).await.unwrap();
    assert_ne!(session.id(), other.id());

    session.close().await.unwrap();
    other.close().await.unwrap();
    assert_eq!(browser.log().closes, 2);
}

#[tokio::test]
async fn unready_session_is_closed_before_error() {
    let browser = FakeBrowser::new(FakeBehavior {
        anchor_visible: false,
        ..Default::default()
    });

    let err = BrowserSession::open(&browser, &options()).await.err().unwrap();

    match err {
        E2eError::SessionNotReady { selector, timeout_ms } => {
            assert_eq!(selector, "#name");
            assert_eq!(timeout_ms, 60_000);
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(browser.log().closes, 1);
}

#[tokio::test]
async fn navigation_failure_is_session_setup() {
    let browser = FakeBrowser::new(FakeBehavior {
        navigation_fails: true,
        ..Default::default()
    });

    let err = BrowserSession::open(&browser, &options()).await.err().unwrap();
    assert!(matches!(err, E2eError::SessionSetup(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn dropped_session_aborts_browser() {
    let browser = FakeBrowser::new(FakeBehavior::default());
    let session = BrowserSession::open(&browser, &options()).await.unwrap();

    drop(session);

    let log = browser.log();
    assert_eq!(log.aborts, 1);
    assert_eq!(log.closes, 0);
}

#[tokio::test]
async fn network_trace_sees_form_traffic_until_detached() {
    let browser = FakeBrowser::new(FakeBehavior::default());
    let mut session = BrowserSession::open(&browser, &options()).await.unwrap();
    let schema = QuoteFormSchema::default();
    let form = QuoteForm::new(&schema);

    let requests = Arc::new(AtomicUsize::new(0));
    let statuses = Arc::new(AtomicUsize::new(0));
    let (req, resp) = (requests.clone(), statuses.clone());
    let trace = session
        .attach_network_trace(
            "/api/subscribe",
            move |r| {
                assert_eq!(r.method, "POST");
                req.fetch_add(1, Ordering::SeqCst);
            },
            move |r| {
                assert_eq!(r.status, 200);
                resp.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

    form.populate(session.page(), &valid_submission()).await.unwrap();
    form.submit(session.page()).await.unwrap();
    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert_eq!(statuses.load(Ordering::SeqCst), 1);

    session.detach_network_trace(trace).await.unwrap();
    form.submit(session.page()).await.unwrap();
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    session.close().await.unwrap();
}

#[tokio::test]
async fn capture_records_observed_response() {
    let dir = tempfile::tempdir().unwrap();
    let capture = Capture::new(&DiagnosticsSettings::default(), dir.path());
    let browser = FakeBrowser::new(FakeBehavior::default());
    let mut session = BrowserSession::open(&browser, &options()).await.unwrap();
    let schema = QuoteFormSchema::default();
    let form = QuoteForm::new(&schema);

    capture.on_session_open(&mut session).await;
    assert!(!capture.request_observed());

    form.populate(session.page(), &valid_submission()).await.unwrap();
    form.submit(session.page()).await.unwrap();

    assert!(capture.request_observed());
    assert!(capture.response_observed());
    assert!(!capture.missing_response());
    capture.finish("capture-test");
    session.close().await.unwrap();
}

#[tokio::test]
async fn capture_notices_missing_response() {
    let dir = tempfile::tempdir().unwrap();
    let capture = Capture::new(&DiagnosticsSettings::default(), dir.path());
    let browser = FakeBrowser::new(FakeBehavior {
        backend_responds: false,
        ..Default::default()
    });
    let mut session = BrowserSession::open(&browser, &options()).await.unwrap();
    let schema = QuoteFormSchema::default();
    let form = QuoteForm::new(&schema);

    capture.on_session_open(&mut session).await;
    form.populate(session.page(), &valid_submission()).await.unwrap();
    form.submit(session.page()).await.unwrap();

    assert!(capture.request_observed());
    assert!(!capture.response_observed());
    assert!(capture.missing_response());

    // Flags do not carry over into a scenario whose session never opened
    capture.finish("unanswered");
    assert!(!capture.missing_response());
    assert!(!capture.request_observed());
    session.close().await.unwrap();
}

#[tokio::test]
async fn screenshot_creates_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let browser = FakeBrowser::new(FakeBehavior::default());
    let mut session = BrowserSession::open(&browser, &options()).await.unwrap();

    let path = dir.path().join("nested/reports/shot.png");
    let saved = session.capture_screenshot(&path).await;

    assert_eq!(saved.as_deref(), Some(path.as_path()));
    assert!(path.exists());
    session.close().await.unwrap();
}

#[tokio::test]
async fn screenshot_failure_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let browser = FakeBrowser::new(FakeBehavior {
        screenshots_fail: true,
        ..Default::default()
    });
    let mut session = BrowserSession::open(&browser, &options()).await.unwrap();

    let saved = session.capture_screenshot(&dir.path().join("shot.png")).await;

    assert!(saved.is_none());
    session.close().await.unwrap();
}
