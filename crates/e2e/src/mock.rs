//! Scripted in-memory quote form
//!
//! [`FakeBrowser`] launches [`FakePage`]s that model the quote form closely
//! enough to exercise sessions, the form sequencer and scenarios without a
//! real browser. Behaviour is tuned through [`FakeBehavior`] and every call
//! is recorded in a shared [`FakeLog`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::driver::{
    BrowserLauncher, LaunchOptions, ListenerId, LoadState, NetworkEvent, NetworkListener,
    NetworkListeners, PageDriver, RequestInfo, ResponseInfo, WaitState,
};
use crate::error::{E2eError, E2eResult};
use crate::form::QuoteFormSchema;

pub const SUBSCRIBE_URL: &str = "https://qatest.datasub.com/api/subscribe";

/// How client-side validation reacts to an invalid email on submit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// The invalid class is set during the submit click
    OnSubmit,
    /// The class lands only after the first wait for it has expired
    Late,
    /// The class is never toggled
    Never,
}

#[derive(Debug, Clone)]
pub struct FakeBehavior {
    pub navigation_fails: bool,
    /// Whether the anchor (`#name`) becomes visible after load
    pub anchor_visible: bool,
    pub submit_disabled: bool,
    pub validation: ValidationMode,
    /// Whether the backend answers the subscribe request
    pub backend_responds: bool,
    pub success_text: String,
    pub screenshots_fail: bool,
    /// Selectors removed from the page entirely
    pub missing: Vec<String>,
    /// Selectors present but hidden
    pub hidden: Vec<String>,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            navigation_fails: false,
            anchor_visible: true,
            submit_disabled: false,
            validation: ValidationMode::OnSubmit,
            backend_responds: true,
            success_text: "Форма отправлена.".to_string(),
            screenshots_fail: false,
            missing: Vec::new(),
            hidden: Vec::new(),
        }
    }
}

/// Everything the fake pages saw, shared across launches
#[derive(Debug, Default, Clone)]
pub struct FakeLog {
    pub launches: usize,
    pub closes: usize,
    pub aborts: usize,
    pub navigations: Vec<String>,
    pub actions: Vec<String>,
    pub screenshots: Vec<PathBuf>,
    pub submissions: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub visible: bool,
    pub disabled: bool,
    pub value: String,
    pub checked: bool,
    pub classes: Vec<String>,
    pub text: String,
    pub options: Vec<String>,
}

impl FakeElement {
    fn shown() -> Self {
        Self {
            visible: true,
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct FakeBrowser {
    schema: QuoteFormSchema,
    behavior: FakeBehavior,
    log: Arc<Mutex<FakeLog>>,
}

impl FakeBrowser {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self::with_schema(QuoteFormSchema::default(), behavior)
    }

    pub fn with_schema(schema: QuoteFormSchema, behavior: FakeBehavior) -> Self {
        Self {
            schema,
            behavior,
            log: Arc::new(Mutex::new(FakeLog::default())),
        }
    }

    pub fn log(&self) -> FakeLog {
        self.log.lock().clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(&self, _options: &LaunchOptions) -> E2eResult<Box<dyn PageDriver>> {
        self.log.lock().launches += 1;
        Ok(Box::new(FakePage::new(
            self.schema.clone(),
            self.behavior.clone(),
            self.log.clone(),
        )))
    }
}

pub struct FakePage {
    schema: QuoteFormSchema,
    behavior: FakeBehavior,
    log: Arc<Mutex<FakeLog>>,
    elements: HashMap<String, FakeElement>,
    listeners: NetworkListeners,
    pending_invalid: bool,
    closed: bool,
}

impl FakePage {
    fn new(schema: QuoteFormSchema, behavior: FakeBehavior, log: Arc<Mutex<FakeLog>>) -> Self {
        Self {
            schema,
            behavior,
            log,
            elements: HashMap::new(),
            listeners: NetworkListeners::default(),
            pending_invalid: false,
            closed: false,
        }
    }

    fn build_dom(&mut self) {
        let s = &self.schema;
        let mut elements = HashMap::new();

        for selector in [&s.name, &s.email, &s.message] {
            elements.insert(selector.clone(), FakeElement::shown());
        }
        elements.insert(
            s.service.clone(),
            FakeElement {
                options: vec![
                    "Select A Service".to_string(),
                    "Select B Service".to_string(),
                    "Select C Service".to_string(),
                ],
                ..FakeElement::shown()
            },
        );
        for selector in s.account_purpose.options.values().chain(s.withdrawal.options.values()) {
            elements.insert(selector.clone(), FakeElement::shown());
        }
        elements.insert(
            s.submit.clone(),
            FakeElement {
                disabled: self.behavior.submit_disabled,
                ..FakeElement::shown()
            },
        );
        elements.insert(s.status.clone(), FakeElement::default());

        if let Some(anchor) = elements.get_mut(&s.name) {
            anchor.visible = self.behavior.anchor_visible;
        }
        for selector in &self.behavior.hidden {
            if let Some(el) = elements.get_mut(selector) {
                el.visible = false;
            }
        }
        for selector in &self.behavior.missing {
            elements.remove(selector);
        }

        self.elements = elements;
    }

    fn record(&self, action: String) {
        self.log.lock().actions.push(action);
    }

    fn ensure_open(&self) -> E2eResult<()> {
        if self.closed {
            Err(E2eError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Resolve `#id` or `#id.class` to the element and required class
    fn lookup<'s, 'q>(&'s self, selector: &'q str) -> Option<(&'s FakeElement, Option<&'q str>)> {
        if let Some(el) = self.elements.get(selector) {
            return Some((el, None));
        }
        let (base, class) = split_class(selector)?;
        self.elements.get(base).map(|el| (el, Some(class)))
    }

    fn matches(&self, selector: &str) -> Option<&FakeElement> {
        match self.lookup(selector)? {
            (el, None) => Some(el),
            (el, Some(class)) if el.classes.iter().any(|c| c == class) => Some(el),
            _ => None,
        }
    }

    fn interactable(&mut self, selector: &str) -> E2eResult<&mut FakeElement> {
        let not_interactable = |reason: &str| E2eError::ElementNotInteractable {
            selector: selector.to_string(),
            reason: reason.to_string(),
        };
        let el = self
            .elements
            .get_mut(selector)
            .ok_or_else(|| not_interactable("element not present"))?;
        if !el.visible {
            return Err(not_interactable("element not visible"));
        }
        if el.disabled {
            return Err(not_interactable("element disabled"));
        }
        Ok(el)
    }

    fn value_of(&self, selector: &str) -> String {
        self.elements
            .get(selector)
            .map(|el| el.value.clone())
            .unwrap_or_default()
    }

    fn handle_submit(&mut self) {
        self.log.lock().submissions += 1;

        let email = self.value_of(&self.schema.email);
        if !looks_like_email(&email) {
            match self.behavior.validation {
                ValidationMode::OnSubmit => self.mark_email_invalid(),
                ValidationMode::Late => self.pending_invalid = true,
                ValidationMode::Never => {}
            }
            return;
        }

        self.listeners.dispatch(&NetworkEvent::Request(RequestInfo {
            url: SUBSCRIBE_URL.to_string(),
            method: "POST".to_string(),
        }));

        if !self.behavior.backend_responds {
            return;
        }

        self.listeners.dispatch(&NetworkEvent::Response(ResponseInfo {
            url: SUBSCRIBE_URL.to_string(),
            status: 200,
            body: Some(r#"{"status":"ok"}"#.to_string()),
        }));

        let text = self.behavior.success_text.clone();
        if let Some(status) = self.elements.get_mut(&self.schema.status) {
            status.visible = true;
            status.text = text;
        }
    }

    fn mark_email_invalid(&mut self) {
        let class = self.schema.invalid_class.clone();
        if let Some(el) = self.elements.get_mut(&self.schema.email) {
            if !el.classes.contains(&class) {
                el.classes.push(class);
            }
        }
    }
}

fn split_class(selector: &str) -> Option<(&str, &str)> {
    let rest = selector.strip_prefix('#')?;
    let dot = rest.find('.')?;
    Some((&selector[..dot + 1], &rest[dot + 1..]))
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&mut self, url: &str, _wait_until: LoadState, _timeout: Duration) -> E2eResult<()> {
        self.ensure_open()?;
        self.log.lock().navigations.push(url.to_string());
        if self.behavior.navigation_fails {
            return Err(E2eError::Playwright(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)));
        }
        self.build_dom();
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> E2eResult<Value> {
        self.ensure_open()?;
        self.record(format!("evaluate:{}", script.len()));
        Ok(Value::from(0))
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()> {
        self.ensure_open()?;
        self.record(format!("wait:{}", selector));
        let found = self.matches(selector);
        let reached = match state {
            WaitState::Visible => found.map(|el| el.visible).unwrap_or(false),
            WaitState::Hidden => found.map(|el| !el.visible).unwrap_or(true),
            WaitState::Attached => found.is_some(),
            WaitState::Detached => found.is_none(),
        };
        if reached {
            Ok(())
        } else {
            if self.pending_invalid {
                self.pending_invalid = false;
                self.mark_email_invalid();
            }
            Err(E2eError::Timeout(format!(
                "{} to be {} after {} ms",
                selector,
                state.as_str(),
                timeout.as_millis()
            )))
        }
    }

    async fn scroll_into_view(&mut self, selector: &str) -> E2eResult<()> {
        self.ensure_open()?;
        self.record(format!("scroll:{}", selector));
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        self.ensure_open()?;
        self.interactable(selector)?.value = value.to_string();
        self.record(format!("fill:{}={}", selector, value));
        Ok(())
    }

    async fn select_option(&mut self, selector: &str, label: &str) -> E2eResult<()> {
        self.ensure_open()?;
        let el = self.interactable(selector)?;
        if !el.options.iter().any(|o| o == label) {
            return Err(E2eError::Playwright(format!("no option with label '{}'", label)));
        }
        el.value = label.to_string();
        self.record(format!("select:{}={}", selector, label));
        Ok(())
    }

    async fn check(&mut self, selector: &str) -> E2eResult<()> {
        self.ensure_open()?;
        self.interactable(selector)?.checked = true;
        self.record(format!("check:{}", selector));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> E2eResult<()> {
        self.ensure_open()?;
        self.interactable(selector)?;
        self.record(format!("click:{}", selector));
        if selector == self.schema.submit {
            self.handle_submit();
        }
        Ok(())
    }

    async fn is_visible(&mut self, selector: &str) -> E2eResult<bool> {
        self.ensure_open()?;
        Ok(self.matches(selector).map(|el| el.visible).unwrap_or(false))
    }

    async fn is_disabled(&mut self, selector: &str) -> E2eResult<bool> {
        self.ensure_open()?;
        self.matches(selector)
            .map(|el| el.disabled)
            .ok_or_else(|| E2eError::ElementNotInteractable {
                selector: selector.to_string(),
                reason: "element not present".to_string(),
            })
    }

    async fn text_content(&mut self, selector: &str) -> E2eResult<Option<String>> {
        self.ensure_open()?;
        Ok(self.matches(selector).map(|el| el.text.clone()))
    }

    async fn attribute(&mut self, selector: &str, name: &str) -> E2eResult<Option<String>> {
        self.ensure_open()?;
        let el = match self.matches(selector) {
            Some(el) => el,
            None => return Ok(None),
        };
        Ok(match name {
            "class" if el.classes.is_empty() => None,
            "class" => Some(el.classes.join(" ")),
            "value" => Some(el.value.clone()),
            _ => None,
        })
    }

    async fn screenshot(&mut self, path: &Path, _full_page: bool) -> E2eResult<()> {
        self.ensure_open()?;
        if self.behavior.screenshots_fail {
            return Err(E2eError::Playwright("screenshot failed: target crashed".to_string()));
        }
        // PNG signature only; enough for existence checks
        std::fs::write(path, [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'])?;
        self.log.lock().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn subscribe_network(
        &mut self,
        url_filter: &str,
        listener: NetworkListener,
    ) -> E2eResult<ListenerId> {
        self.ensure_open()?;
        Ok(self.listeners.add(url_filter, listener))
    }

    async fn unsubscribe_network(&mut self, id: ListenerId) -> E2eResult<()> {
        self.listeners.remove(id);
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.listeners = NetworkListeners::default();
        self.log.lock().closes += 1;
        Ok(())
    }

    fn abort(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.lock().aborts += 1;
        }
    }
}
