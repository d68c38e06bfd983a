//! Playwright browser automation
//!
//! Playwright is driven through a small Node.js bridge script. The harness
//! writes the script to a temp dir, spawns `node` on it and exchanges one
//! JSON object per line over stdio:
//!
//! ```text
//! harness -> bridge   {"id": 3, "cmd": "fill", "args": {"selector": "#name", "value": "John"}}
//! bridge  -> harness  {"type": "response", "id": 3, "ok": true, "value": null}
//! bridge  -> harness  {"type": "event", "event": {"kind": "request", "url": "...", "method": "POST"}}
//! ```
//!
//! Network events arrive interleaved with responses and are handed to the
//! registered listeners while a command is awaited.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::driver::{
    BrowserLauncher, LaunchOptions, ListenerId, LoadState, NetworkEvent, NetworkListener,
    NetworkListeners, PageDriver, WaitState,
};
use crate::error::{E2eError, E2eResult};

/// Extra time granted on top of a command's own timeout before the bridge
/// is considered hung
const RESPONSE_GRACE: Duration = Duration::from_secs(30);

/// Time the bridge gets to exit after a `close` command
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const playwright = require('playwright');

let browser = null;
let page = null;
let filters = [];

function send(msg) {
  process.stdout.write(JSON.stringify(msg) + '\n');
}

class HarnessError extends Error {
  constructor(kind, message) {
    super(message);
    this.kind = kind;
  }
}

function traced(url) {
  return filters.some((f) => url.includes(f));
}

async function interactable(selector) {
  const all = page.locator(selector);
  if ((await all.count()) === 0) throw new HarnessError('not_interactable', 'element not present');
  const loc = all.first();
  if (!(await loc.isVisible())) throw new HarnessError('not_interactable', 'element not visible');
  if (await loc.isDisabled()) throw new HarnessError('not_interactable', 'element disabled');
  return loc;
}

async function existing(selector) {
  const all = page.locator(selector);
  if ((await all.count()) === 0) return null;
  return all.first();
}

const handlers = {
  async launch(a) {
    browser = await playwright[a.browser].launch({ headless: a.headless });
    const context = await browser.newContext({ viewport: { width: a.width, height: a.height } });
    page = await context.newPage();
    page.setDefaultTimeout(a.action_timeout_ms);
    page.on('request', (req) => {
      if (traced(req.url())) send({ type: 'event', event: { kind: 'request', url: req.url(), method: req.method() } });
    });
    page.on('response', async (res) => {
      if (!traced(res.url())) return;
      let body = null;
      try { body = await res.text(); } catch (e) { body = null; }
      send({ type: 'event', event: { kind: 'response', url: res.url(), status: res.status(), body } });
    });
    return null;
  },
  async navigate(a) {
    await page.goto(a.url, { waitUntil: a.wait_until, timeout: a.timeout_ms });
    return null;
  },
  async evaluate(a) {
    const value = await page.evaluate(a.script);
    return value === undefined ? null : value;
  },
  async wait_for_selector(a) {
    await page.waitForSelector(a.selector, { state: a.state, timeout: a.timeout_ms });
    return null;
  },
  async scroll_into_view(a) {
    await page.locator(a.selector).first().scrollIntoViewIfNeeded();
    return null;
  },
  async fill(a) {
    await (await interactable(a.selector)).fill(a.value);
    return null;
  },
  async select_option(a) {
    await (await interactable(a.selector)).selectOption({ label: a.label });
    return null;
  },
  async check(a) {
    await (await interactable(a.selector)).check();
    return null;
  },
  async click(a) {
    await (await interactable(a.selector)).click();
    return null;
  },
  async is_visible(a) {
    const loc = await existing(a.selector);
    return loc ? await loc.isVisible() : false;
  },
  async is_disabled(a) {
    const loc = await existing(a.selector);
    if (!loc) throw new HarnessError('not_interactable', 'element not present');
    return await loc.isDisabled();
  },
  async text_content(a) {
    const loc = await existing(a.selector);
    return loc ? await loc.textContent() : null;
  },
  async attribute(a) {
    const loc = await existing(a.selector);
    return loc ? await loc.getAttribute(a.name) : null;
  },
  async screenshot(a) {
    await page.screenshot({ path: a.path, fullPage: a.full_page });
    return null;
  },
  async trace(a) {
    filters = a.filters;
    return null;
  },
  async close() {
    if (browser) await browser.close();
    browser = null;
    return null;
  },
};

let queue = Promise.resolve();
const rl = readline.createInterface({ input: process.stdin });

rl.on('line', (line) => {
  queue = queue.then(async () => {
    let msg;
    try {
      msg = JSON.parse(line);
    } catch (e) {
      send({ type: 'response', id: null, ok: false, error: { kind: 'protocol', message: e.message } });
      return;
    }
    try {
      const handler = handlers[msg.cmd];
      if (!handler) throw new HarnessError('protocol', 'unknown command: ' + msg.cmd);
      const value = await handler(msg.args || {});
      send({ type: 'response', id: msg.id, ok: true, value });
    } catch (e) {
      const kind = e.kind || (e.name === 'TimeoutError' ? 'timeout' : 'browser');
      send({ type: 'response', id: msg.id, ok: false, error: { kind, message: e.message } });
    }
    if (msg.cmd === 'close') process.exit(0);
  });
});

rl.on('close', () => {
  queue.then(async () => {
    if (browser) await browser.close();
    process.exit(0);
  });
});
"#;

/// Configuration for the Playwright bridge process
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    /// Node.js executable
    pub node_binary: PathBuf,

    /// Directory holding the `playwright` package, exported as `NODE_PATH`
    pub node_path: Option<PathBuf>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            node_binary: PathBuf::from("node"),
            node_path: None,
        }
    }
}

/// Launches one bridge process (one browser, one page) per session
pub struct PlaywrightLauncher {
    config: PlaywrightConfig,
}

impl PlaywrightLauncher {
    /// Create a launcher after verifying Playwright is installed
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        Ok(Self { config })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self, options: &LaunchOptions) -> E2eResult<Box<dyn PageDriver>> {
        let mut driver = PlaywrightDriver::spawn(&self.config).await?;
        driver.action_timeout = options.action_timeout;
        let launched = driver
            .request(
                "launch",
                json!({
                    "browser": options.browser.as_str(),
                    "headless": options.headless,
                    "width": options.viewport.width,
                    "height": options.viewport.height,
                    "action_timeout_ms": options.action_timeout.as_millis() as u64,
                }),
                // Cold browser start
                Duration::from_secs(60),
            )
            .await;

        if let Err(e) = launched {
            driver.abort();
            return Err(E2eError::SessionSetup(format!(
                "failed to launch {}: {}",
                options.browser.as_str(),
                e
            )));
        }

        info!(
            "Launched {} ({}x{}, headless={})",
            options.browser.as_str(),
            options.viewport.width,
            options.viewport.height,
            options.headless
        );
        Ok(Box::new(driver))
    }
}

#[derive(Debug, Deserialize)]
struct BridgeFailure {
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeMessage {
    Response {
        id: Option<u64>,
        ok: bool,
        #[serde(default)]
        value: Value,
        #[serde(default)]
        error: Option<BridgeFailure>,
    },
    Event {
        event: NetworkEvent,
    },
}

/// A running bridge process owning one browser and one page
pub struct PlaywrightDriver {
    child: Child,
    reader: Lines<BufReader<ChildStdout>>,
    writer: BufWriter<ChildStdin>,
    seq: u64,
    listeners: NetworkListeners,
    action_timeout: Duration,
    closed: bool,
    // Holds the bridge script for the process lifetime
    _script_dir: tempfile::TempDir,
}

impl PlaywrightDriver {
    async fn spawn(config: &PlaywrightConfig) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut cmd = TokioCommand::new(&config.node_binary);
        cmd.arg(&script_path)
            .current_dir(script_dir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(node_path) = &config.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::SessionSetup(format!(
                "Failed to spawn {}: {}",
                config.node_binary.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::SessionSetup("Failed to get bridge stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::SessionSetup("Failed to get bridge stdout".to_string()))?;

        Ok(Self {
            child,
            reader: BufReader::new(stdout).lines(),
            writer: BufWriter::new(stdin),
            seq: 0,
            listeners: NetworkListeners::default(),
            action_timeout: LaunchOptions::default().action_timeout,
            closed: false,
            _script_dir: script_dir,
        })
    }

    /// Send a command and wait for its response, dispatching any network
    /// events that arrive first
    async fn request(&mut self, cmd: &str, args: Value, timeout: Duration) -> E2eResult<Value> {
        if self.closed {
            return Err(E2eError::SessionClosed);
        }

        self.seq += 1;
        let id = self.seq;
        let line = serde_json::to_string(&json!({ "id": id, "cmd": cmd, "args": &args }))?;
        debug!("bridge >>> {}", line);

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let deadline = timeout + RESPONSE_GRACE;
        match tokio::time::timeout(deadline, self.read_response(id)).await {
            Ok(result) => result.map_err(|e| Self::contextualize(e, &args)),
            Err(_) => Err(E2eError::Playwright(format!(
                "bridge did not answer '{}' within {:?}",
                cmd, deadline
            ))),
        }
    }

    async fn read_response(&mut self, id: u64) -> E2eResult<Value> {
        loop {
            let line = self
                .reader
                .next_line()
                .await?
                .ok_or_else(|| E2eError::Playwright("bridge exited unexpectedly".to_string()))?;
            debug!("bridge <<< {}", line);

            let msg: BridgeMessage = serde_json::from_str(&line)
                .map_err(|e| E2eError::Protocol(format!("invalid bridge message: {}", e)))?;

            match msg {
                BridgeMessage::Event { event } => self.listeners.dispatch(&event),
                BridgeMessage::Response { id: Some(got), ok, value, error } if got == id => {
                    if ok {
                        return Ok(value);
                    }
                    let failure = error.unwrap_or(BridgeFailure {
                        kind: "browser".to_string(),
                        message: "unknown error".to_string(),
                    });
                    return Err(match failure.kind.as_str() {
                        "timeout" => E2eError::Timeout(failure.message),
                        "not_interactable" => E2eError::ElementNotInteractable {
                            selector: String::new(),
                            reason: failure.message,
                        },
                        "protocol" => E2eError::Protocol(failure.message),
                        _ => E2eError::Playwright(failure.message),
                    });
                }
                BridgeMessage::Response { id, .. } => {
                    warn!("Discarding stale bridge response {:?}", id);
                }
            }
        }
    }

    /// Attach the selector from the command arguments to element errors
    fn contextualize(err: E2eError, args: &Value) -> E2eError {
        match err {
            E2eError::ElementNotInteractable { reason, .. } => E2eError::ElementNotInteractable {
                selector: args
                    .get("selector")
                    .and_then(Value::as_str)
                    .unwrap_or("<unknown>")
                    .to_string(),
                reason,
            },
            other => other,
        }
    }

    fn action_timeout(&self) -> Duration {
        self.action_timeout
    }

    async fn sync_trace_filters(&mut self) -> E2eResult<()> {
        let filters = self.listeners.filters();
        let timeout = self.action_timeout();
        self.request("trace", json!({ "filters": filters }), timeout).await?;
        Ok(())
    }

    /// Stop the bridge process, escalating to signals if it does not exit
    async fn stop(&mut self) {
        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Playwright bridge exited with {}", status);
                return;
            }
            Ok(Err(e)) => warn!("Failed waiting for Playwright bridge: {}", e),
            Err(_) => warn!("Playwright bridge did not exit, terminating"),
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && tokio::time::timeout(Duration::from_millis(500), self.child.wait())
                        .await
                        .is_ok()
                {
                    return;
                }
            }
        }

        let _ = self.child.kill().await;
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn navigate(&mut self, url: &str, wait_until: LoadState, timeout: Duration) -> E2eResult<()> {
        self.request(
            "navigate",
            json!({
                "url": url,
                "wait_until": wait_until.as_str(),
                "timeout_ms": timeout.as_millis() as u64,
            }),
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> E2eResult<Value> {
        let timeout = self.action_timeout();
        self.request("evaluate", json!({ "script": script }), timeout).await
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()> {
        self.request(
            "wait_for_selector",
            json!({
                "selector": selector,
                "state": state.as_str(),
                "timeout_ms": timeout.as_millis() as u64,
            }),
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, selector: &str) -> E2eResult<()> {
        let timeout = self.action_timeout();
        self.request("scroll_into_view", json!({ "selector": selector }), timeout)
            .await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        let timeout = self.action_timeout();
        self.request("fill", json!({ "selector": selector, "value": value }), timeout)
            .await?;
        Ok(())
    }

    async fn select_option(&mut self, selector: &str, label: &str) -> E2eResult<()> {
        let timeout = self.action_timeout();
        self.request(
            "select_option",
            json!({ "selector": selector, "label": label }),
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn check(&mut self, selector: &str) -> E2eResult<()> {
        let timeout = self.action_timeout();
        self.request("check", json!({ "selector": selector }), timeout).await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> E2eResult<()> {
        let timeout = self.action_timeout();
        self.request("click", json!({ "selector": selector }), timeout).await?;
        Ok(())
    }

    async fn is_visible(&mut self, selector: &str) -> E2eResult<bool> {
        let timeout = self.action_timeout();
        let value = self
            .request("is_visible", json!({ "selector": selector }), timeout)
            .await?;
        value
            .as_bool()
            .ok_or_else(|| E2eError::Protocol(format!("is_visible returned {}", value)))
    }

    async fn is_disabled(&mut self, selector: &str) -> E2eResult<bool> {
        let timeout = self.action_timeout();
        let value = self
            .request("is_disabled", json!({ "selector": selector }), timeout)
            .await?;
        value
            .as_bool()
            .ok_or_else(|| E2eError::Protocol(format!("is_disabled returned {}", value)))
    }

    async fn text_content(&mut self, selector: &str) -> E2eResult<Option<String>> {
        let timeout = self.action_timeout();
        let value = self
            .request("text_content", json!({ "selector": selector }), timeout)
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn attribute(&mut self, selector: &str, name: &str) -> E2eResult<Option<String>> {
        let timeout = self.action_timeout();
        let value = self
            .request("attribute", json!({ "selector": selector, "name": name }), timeout)
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> E2eResult<()> {
        let timeout = self.action_timeout();
        let path = std::path::absolute(path)?;
        self.request(
            "screenshot",
            json!({ "path": path.to_string_lossy(), "full_page": full_page }),
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn subscribe_network(
        &mut self,
        url_filter: &str,
        listener: NetworkListener,
    ) -> E2eResult<ListenerId> {
        let id = self.listeners.add(url_filter, listener);
        if let Err(e) = self.sync_trace_filters().await {
            self.listeners.remove(id);
            return Err(e);
        }
        Ok(id)
    }

    async fn unsubscribe_network(&mut self, id: ListenerId) -> E2eResult<()> {
        if self.listeners.remove(id) && !self.closed {
            self.sync_trace_filters().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = self
            .request("close", Value::Null, SHUTDOWN_GRACE)
            .await
            .map(|_| ());
        self.closed = true;
        self.listeners = NetworkListeners::default();
        self.stop().await;
        result
    }

    fn abort(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to kill Playwright bridge: {}", e);
        }
    }
}
