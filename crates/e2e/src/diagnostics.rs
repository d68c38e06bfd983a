//! Optional scenario instrumentation
//!
//! Scenarios run the same flow with or without diagnostics; the strategy is
//! picked from configuration. Nothing here can fail a scenario.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::DiagnosticsSettings;
use crate::session::BrowserSession;

pub const SETUP_SCREENSHOT: &str = "setup_screenshot.png";
pub const ERROR_SCREENSHOT: &str = "error_screenshot.png";

#[async_trait]
pub trait Diagnostics: Send + Sync {
    /// Called once the session is ready, before any form input
    async fn on_session_open(&self, _session: &mut BrowserSession) {}

    /// Called after a negative scenario's submit attempt
    async fn after_rejected_submit(&self, _session: &mut BrowserSession) {}

    /// Called in the scenario's finalisation step, before the session closes
    fn finish(&self, _scenario: &str) {}
}

/// No instrumentation
#[derive(Debug, Default, Clone, Copy)]
pub struct Quiet;

impl Diagnostics for Quiet {}

/// Screenshots into the reports directory and a trace of one API endpoint
#[derive(Debug)]
pub struct Capture {
    reports_dir: PathBuf,
    screenshots: bool,
    trace_filter: Option<String>,
    /// Set once a trace is attached for the current scenario
    attached: AtomicBool,
    responded: Arc<AtomicBool>,
    requested: Arc<AtomicBool>,
}

impl Capture {
    pub fn new(settings: &DiagnosticsSettings, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            screenshots: settings.screenshots,
            trace_filter: settings
                .network_trace
                .then(|| settings.trace_filter.clone()),
            attached: AtomicBool::new(false),
            responded: Arc::new(AtomicBool::new(false)),
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn response_observed(&self) -> bool {
        self.responded.load(Ordering::SeqCst)
    }

    pub fn request_observed(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// A trace ran for the current scenario and saw no response
    pub fn missing_response(&self) -> bool {
        self.attached.load(Ordering::SeqCst) && !self.response_observed()
    }

    fn reset(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.responded.store(false, Ordering::SeqCst);
        self.requested.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Diagnostics for Capture {
    async fn on_session_open(&self, session: &mut BrowserSession) {
        self.reset();

        if self.screenshots {
            session
                .capture_screenshot(&self.reports_dir.join(SETUP_SCREENSHOT))
                .await;
        }

        if let Some(filter) = &self.trace_filter {
            let requested = self.requested.clone();
            let responded = self.responded.clone();
            let attached = session
                .attach_network_trace(
                    filter,
                    move |req| {
                        info!("Form request sent: {} [{}]", req.url, req.method);
                        requested.store(true, Ordering::SeqCst);
                    },
                    move |resp| {
                        info!("Form response status: {}", resp.status);
                        match &resp.body {
                            Some(body) => info!("Form response body: {}", body),
                            None => info!("Form response body unavailable"),
                        }
                        responded.store(true, Ordering::SeqCst);
                    },
                )
                .await;
            match attached {
                Ok(_) => self.attached.store(true, Ordering::SeqCst),
                Err(e) => warn!("Could not attach network trace for {}: {}", filter, e),
            }
        }
    }

    async fn after_rejected_submit(&self, session: &mut BrowserSession) {
        if self.screenshots {
            session
                .capture_screenshot(&self.reports_dir.join(ERROR_SCREENSHOT))
                .await;
        }
    }

    fn finish(&self, scenario: &str) {
        if let Some(filter) = self.trace_filter.as_deref().filter(|_| self.missing_response()) {
            warn!(
                "No response observed for {} in '{}' (CORS, client-side validation or wrong URL?)",
                filter, scenario
            );
        }
        self.reset();
    }
}

/// Build the strategy selected by configuration
pub fn from_settings(settings: &DiagnosticsSettings, reports_dir: impl Into<PathBuf>) -> Box<dyn Diagnostics> {
    if settings.enabled && (settings.screenshots || settings.network_trace) {
        Box::new(Capture::new(settings, reports_dir))
    } else {
        Box::new(Quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_filter_follows_settings() {
        let settings = DiagnosticsSettings {
            network_trace: false,
            ..Default::default()
        };
        let capture = Capture::new(&settings, "reports");
        assert!(capture.trace_filter.is_none());
        assert!(capture.screenshots);

        let capture = Capture::new(&DiagnosticsSettings::default(), "reports");
        assert_eq!(capture.trace_filter.as_deref(), Some("/api/subscribe"));
        assert!(!capture.response_observed());
    }

    #[test]
    fn test_finish_without_open_reports_nothing() {
        let capture = Capture::new(&DiagnosticsSettings::default(), "reports");
        // Leftovers from an earlier scenario
        capture.attached.store(true, Ordering::SeqCst);
        capture.finish("earlier");
        assert!(!capture.missing_response());

        capture.finish("setup-failed");
        assert!(!capture.missing_response());
        assert!(!capture.request_observed());
    }
}
