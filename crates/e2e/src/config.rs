//! Harness configuration
//!
//! Values are resolved in three layers: built-in defaults, an optional TOML
//! file, then `QUOTEFORM_*` environment variables. The `e2e` test binary
//! applies its command-line flags on top.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `QUOTEFORM_TARGET_URL` | `target_url` |
//! | `QUOTEFORM_SUCCESS_PHRASE` | `success_phrase` |
//! | `QUOTEFORM_BROWSER` | `browser.engine` |
//! | `QUOTEFORM_HEADLESS` | `browser.headless` |
//! | `QUOTEFORM_NODE_PATH` | `browser.node_path` |
//! | `QUOTEFORM_REPORTS_DIR` | `reports.dir` |
//! | `QUOTEFORM_DIAGNOSTICS` | `diagnostics.enabled` |
//! | `QUOTEFORM_STRICT_VALIDATION` | `strict_validation_timing` |

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::{Browser, LaunchOptions, Viewport};
use crate::error::{E2eError, E2eResult};
use crate::form::QuoteFormSchema;
use crate::playwright::PlaywrightConfig;

pub const DEFAULT_TARGET_URL: &str = "https://qatest.datasub.com";
pub const DEFAULT_SUCCESS_PHRASE: &str = "Форма отправлена.";
pub const DEFAULT_REPORTS_DIR: &str = "reports";
pub const DEFAULT_RESULTS_FILE: &str = "test_results.csv";
pub const DEFAULT_TRACE_FILTER: &str = "/api/subscribe";

pub const ENV_TARGET_URL: &str = "QUOTEFORM_TARGET_URL";
pub const ENV_SUCCESS_PHRASE: &str = "QUOTEFORM_SUCCESS_PHRASE";
pub const ENV_BROWSER: &str = "QUOTEFORM_BROWSER";
pub const ENV_HEADLESS: &str = "QUOTEFORM_HEADLESS";
pub const ENV_NODE_PATH: &str = "QUOTEFORM_NODE_PATH";
pub const ENV_REPORTS_DIR: &str = "QUOTEFORM_REPORTS_DIR";
pub const ENV_DIAGNOSTICS: &str = "QUOTEFORM_DIAGNOSTICS";
pub const ENV_STRICT_VALIDATION: &str = "QUOTEFORM_STRICT_VALIDATION";

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Page the form lives on
    pub target_url: String,

    /// Text the status element shows after a successful submission
    pub success_phrase: String,

    /// Probe the target over HTTP before launching any browser
    pub preflight: bool,

    /// Fail invalid-input scenarios when the validation class never appears
    pub strict_validation_timing: bool,

    pub browser: BrowserSettings,
    pub timeouts: TimeoutSettings,
    pub reports: ReportSettings,
    pub diagnostics: DiagnosticsSettings,
    pub form: QuoteFormSchema,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            success_phrase: DEFAULT_SUCCESS_PHRASE.to_string(),
            preflight: true,
            strict_validation_timing: false,
            browser: BrowserSettings::default(),
            timeouts: TimeoutSettings::default(),
            reports: ReportSettings::default(),
            diagnostics: DiagnosticsSettings::default(),
            form: QuoteFormSchema::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub engine: Browser,
    pub headless: bool,
    pub viewport: Viewport,

    /// Node.js executable running the Playwright bridge
    pub node_binary: PathBuf,

    /// Directory containing the `playwright` package
    pub node_path: Option<PathBuf>,

    /// Class removed from every element after load to skip entrance animations
    pub strip_animation_class: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            engine: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
            node_binary: PathBuf::from("node"),
            node_path: None,
            strip_animation_class: Some("wow".to_string()),
        }
    }
}

/// All values in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Navigation plus anchor visibility; expiry aborts the scenario
    pub readiness_ms: u64,

    /// Poll for the validation class; expiry is only logged
    pub validation_ms: u64,

    /// Default for individual fill/click/select actions
    pub action_ms: u64,

    /// HTTP preflight budget
    pub preflight_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            readiness_ms: 60_000,
            validation_ms: 5_000,
            action_ms: 30_000,
            preflight_ms: 30_000,
        }
    }
}

impl TimeoutSettings {
    pub fn readiness(&self) -> Duration {
        Duration::from_millis(self.readiness_ms)
    }

    pub fn validation(&self) -> Duration {
        Duration::from_millis(self.validation_ms)
    }

    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn preflight(&self) -> Duration {
        Duration::from_millis(self.preflight_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub dir: PathBuf,
    pub results_file: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_REPORTS_DIR),
            results_file: DEFAULT_RESULTS_FILE.to_string(),
        }
    }
}

impl ReportSettings {
    pub fn results_path(&self) -> PathBuf {
        self.dir.join(&self.results_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSettings {
    /// Master switch; when off no diagnostics hooks run
    pub enabled: bool,
    pub screenshots: bool,
    pub network_trace: bool,
    pub trace_filter: String,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            screenshots: true,
            network_trace: true,
            trace_filter: DEFAULT_TRACE_FILTER.to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file (defaults when it does not exist), then
    /// apply environment overrides
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        Self::load_with(path, |key| env::var(key).ok())
    }

    fn load_with(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> E2eResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `QUOTEFORM_*` environment overrides
    pub fn apply_env(&mut self) -> E2eResult<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> E2eResult<()> {
        if let Some(url) = lookup(ENV_TARGET_URL) {
            self.target_url = url;
        }
        if let Some(phrase) = lookup(ENV_SUCCESS_PHRASE) {
            self.success_phrase = phrase;
        }
        if let Some(name) = lookup(ENV_BROWSER) {
            self.browser.engine = Browser::parse(&name)
                .ok_or_else(|| E2eError::Config(format!("unknown browser '{}'", name)))?;
        }
        if let Some(flag) = lookup(ENV_HEADLESS) {
            self.browser.headless = parse_flag(ENV_HEADLESS, &flag)?;
        }
        if let Some(dir) = lookup(ENV_NODE_PATH) {
            self.browser.node_path = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup(ENV_REPORTS_DIR) {
            self.reports.dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup(ENV_DIAGNOSTICS) {
            self.diagnostics.enabled = parse_flag(ENV_DIAGNOSTICS, &flag)?;
        }
        if let Some(flag) = lookup(ENV_STRICT_VALIDATION) {
            self.strict_validation_timing = parse_flag(ENV_STRICT_VALIDATION, &flag)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        if !(self.target_url.starts_with("http://") || self.target_url.starts_with("https://")) {
            return Err(E2eError::Config(format!(
                "target_url must be http(s): {}",
                self.target_url
            )));
        }
        if self.reports.results_file.is_empty() {
            return Err(E2eError::Config("reports.results_file is empty".to_string()));
        }
        if self.browser.viewport.width == 0 || self.browser.viewport.height == 0 {
            return Err(E2eError::Config("viewport must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            browser: self.browser.engine,
            headless: self.browser.headless,
            viewport: self.browser.viewport,
            action_timeout: self.timeouts.action(),
        }
    }

    pub fn playwright(&self) -> PlaywrightConfig {
        PlaywrightConfig {
            node_binary: self.browser.node_binary.clone(),
            node_path: self.browser.node_path.clone(),
        }
    }
}

fn parse_flag(key: &str, value: &str) -> E2eResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(E2eError::Config(format!("{} expects a boolean, got '{}'", key, other))),
    }
}
