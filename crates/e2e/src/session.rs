//! Browser session lifecycle
//!
//! A [`BrowserSession`] is one launched browser with one page, owned by a
//! single scenario. `open` leaves the page loaded and the anchor element
//! visible; `close` releases everything. A session dropped without `close`
//! aborts its driver so no browser process outlives it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::driver::{
    BrowserLauncher, LaunchOptions, ListenerId, LoadState, NetworkEvent, PageDriver,
    RequestInfo, ResponseInfo, WaitState,
};
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub target_url: String,
    pub launch: LaunchOptions,
    /// Element that must be visible before the page counts as ready
    pub anchor_selector: String,
    pub readiness_timeout: Duration,
    pub strip_animation_class: Option<String>,
}

impl SessionOptions {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            target_url: config.target_url.clone(),
            launch: config.launch_options(),
            anchor_selector: config.form.name.clone(),
            readiness_timeout: config.timeouts.readiness(),
            strip_animation_class: config.browser.strip_animation_class.clone(),
        }
    }
}

/// Handle for an attached network trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTrace {
    id: ListenerId,
}

pub struct BrowserSession {
    id: Uuid,
    page: Box<dyn PageDriver>,
    traces: Vec<ListenerId>,
    closed: bool,
}

impl BrowserSession {
    /// Launch, navigate and wait until the anchor element is visible.
    ///
    /// The browser is closed again before any error is returned.
    pub async fn open(launcher: &dyn BrowserLauncher, options: &SessionOptions) -> E2eResult<Self> {
        let id = Uuid::new_v4();
        info!(session = %id, "Opening session for {}", options.target_url);

        let page = launcher.launch(&options.launch).await?;
        let mut session = Self {
            id,
            page,
            traces: Vec::new(),
            closed: false,
        };

        match session.prepare(options).await {
            Ok(()) => {
                info!(session = %id, "Session ready");
                Ok(session)
            }
            Err(e) => {
                warn!(session = %id, "Session setup failed: {}", e);
                if let Err(close_err) = session.close().await {
                    warn!(session = %id, "Failed to close unready session: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn prepare(&mut self, options: &SessionOptions) -> E2eResult<()> {
        self.page
            .navigate(&options.target_url, LoadState::NetworkIdle, options.readiness_timeout)
            .await
            .map_err(|e| {
                E2eError::SessionSetup(format!("navigation to {} failed: {}", options.target_url, e))
            })?;

        if let Some(class) = &options.strip_animation_class {
            let removed = self.page.evaluate(&strip_class_script(class)).await?;
            debug!(session = %self.id, "Stripped '{}' from {} element(s)", class, removed);
        }

        // Best effort; the visibility wait below is the real gate
        if let Err(e) = self.page.scroll_into_view(&options.anchor_selector).await {
            debug!(session = %self.id, "Could not scroll to {}: {}", options.anchor_selector, e);
        }

        self.page
            .wait_for_selector(&options.anchor_selector, WaitState::Visible, options.readiness_timeout)
            .await
            .map_err(|e| match e {
                E2eError::Timeout(_) => E2eError::SessionNotReady {
                    selector: options.anchor_selector.clone(),
                    timeout_ms: options.readiness_timeout.as_millis() as u64,
                },
                other => other,
            })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn page(&mut self) -> &mut dyn PageDriver {
        self.page.as_mut()
    }

    /// Full-page screenshot; failures are logged and reported as `None`
    pub async fn capture_screenshot(&mut self, path: &Path) -> Option<PathBuf> {
        match self.try_capture(path).await {
            Ok(()) => {
                info!(session = %self.id, "Screenshot saved: {}", path.display());
                Some(path.to_path_buf())
            }
            Err(e) => {
                let err = E2eError::DiagnosticCapture(format!("{}: {}", path.display(), e));
                warn!(session = %self.id, "{}", err);
                None
            }
        }
    }

    async fn try_capture(&mut self, path: &Path) -> E2eResult<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        self.page.screenshot(path, true).await
    }

    /// Observe traffic for URLs containing `url_filter` for the rest of the
    /// session, or until detached
    pub async fn attach_network_trace<Req, Resp>(
        &mut self,
        url_filter: &str,
        mut on_request: Req,
        mut on_response: Resp,
    ) -> E2eResult<NetworkTrace>
    where
        Req: FnMut(&RequestInfo) + Send + 'static,
        Resp: FnMut(&ResponseInfo) + Send + 'static,
    {
        let listener = Box::new(move |event: &NetworkEvent| match event {
            NetworkEvent::Request(req) => on_request(req),
            NetworkEvent::Response(resp) => on_response(resp),
        });
        let id = self.page.subscribe_network(url_filter, listener).await?;
        self.traces.push(id);
        debug!(session = %self.id, "Network trace attached for {}", url_filter);
        Ok(NetworkTrace { id })
    }

    pub async fn detach_network_trace(&mut self, trace: NetworkTrace) -> E2eResult<()> {
        self.traces.retain(|id| *id != trace.id);
        self.page.unsubscribe_network(trace.id).await
    }

    /// Release page and browser
    pub async fn close(mut self) -> E2eResult<()> {
        self.shutdown().await
    }

    async fn shutdown(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        for id in std::mem::take(&mut self.traces) {
            if let Err(e) = self.page.unsubscribe_network(id).await {
                debug!(session = %self.id, "Failed to detach trace: {}", e);
            }
        }

        let result = self.page.close().await;
        info!(session = %self.id, "Session closed");
        result
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!(session = %self.id, "Session dropped without close, aborting browser");
            self.page.abort();
        }
    }
}

/// Script removing `class` from every element, returning how many matched
fn strip_class_script(class: &str) -> String {
    let class = serde_json::Value::String(class.to_string());
    format!(
        "(() => {{ const els = document.querySelectorAll('.' + CSS.escape({class})); \
         els.forEach(el => el.classList.remove({class})); return els.length; }})()"
    )
}
