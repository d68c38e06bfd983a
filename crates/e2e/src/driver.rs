//! Browser engine seam
//!
//! The harness talks to a browser only through [`PageDriver`] and obtains
//! pages through a [`BrowserLauncher`]. The Playwright bridge in
//! [`crate::playwright`] is the production implementation; [`crate::mock`]
//! provides a scripted page for tests.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

/// Browser engine to launch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Some(Browser::Chromium),
            "firefox" => Some(Browser::Firefox),
            "webkit" => Some(Browser::Webkit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Options used to launch one isolated browser + page
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,
    /// Default timeout applied to individual page actions
    pub action_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
            action_timeout: Duration::from_secs(30),
        }
    }
}

/// Page load milestone to wait for after navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub url: String,
    pub status: u16,
    /// Response body, when the engine could read it
    #[serde(default)]
    pub body: Option<String>,
}

/// Network traffic observed by the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NetworkEvent {
    Request(RequestInfo),
    Response(ResponseInfo),
}

impl NetworkEvent {
    pub fn url(&self) -> &str {
        match self {
            NetworkEvent::Request(r) => &r.url,
            NetworkEvent::Response(r) => &r.url,
        }
    }
}

pub type NetworkListener = Box<dyn FnMut(&NetworkEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener registry shared by driver implementations.
///
/// Listeners are called on the task that reads the event, in registration
/// order, and only for URLs containing their filter.
#[derive(Default)]
pub struct NetworkListeners {
    next_id: u64,
    entries: Vec<(ListenerId, String, NetworkListener)>,
}

impl NetworkListeners {
    pub fn add(&mut self, url_filter: impl Into<String>, listener: NetworkListener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, url_filter.into(), listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn filters(&self) -> Vec<String> {
        self.entries.iter().map(|(_, f, _)| f.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn dispatch(&mut self, event: &NetworkEvent) {
        for (_, filter, listener) in self.entries.iter_mut() {
            if event.url().contains(filter.as_str()) {
                listener(event);
            }
        }
    }
}

/// One open page in a launched browser.
///
/// Every call suspends the caller until the engine finishes or its timeout
/// elapses. `fill`, `select_option`, `check` and `click` fail with
/// [`crate::E2eError::ElementNotInteractable`] when the target is missing,
/// hidden or disabled at call time.
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str, wait_until: LoadState, timeout: Duration) -> E2eResult<()>;

    async fn evaluate(&mut self, script: &str) -> E2eResult<serde_json::Value>;

    /// Fails with [`crate::E2eError::Timeout`] when the state is not reached in time
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()>;

    async fn scroll_into_view(&mut self, selector: &str) -> E2eResult<()>;

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()>;

    /// Select by visible option label
    async fn select_option(&mut self, selector: &str, label: &str) -> E2eResult<()>;

    async fn check(&mut self, selector: &str) -> E2eResult<()>;

    async fn click(&mut self, selector: &str) -> E2eResult<()>;

    /// Missing elements are reported as not visible
    async fn is_visible(&mut self, selector: &str) -> E2eResult<bool>;

    async fn is_disabled(&mut self, selector: &str) -> E2eResult<bool>;

    async fn text_content(&mut self, selector: &str) -> E2eResult<Option<String>>;

    async fn attribute(&mut self, selector: &str, name: &str) -> E2eResult<Option<String>>;

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> E2eResult<()>;

    async fn subscribe_network(
        &mut self,
        url_filter: &str,
        listener: NetworkListener,
    ) -> E2eResult<ListenerId>;

    async fn unsubscribe_network(&mut self, id: ListenerId) -> E2eResult<()>;

    /// Close page and browser. Calling it more than once is a no-op.
    async fn close(&mut self) -> E2eResult<()>;

    /// Synchronous last-resort teardown used from `Drop`
    fn abort(&mut self);
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> E2eResult<Box<dyn PageDriver>>;
}
