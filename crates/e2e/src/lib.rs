//! Quote form E2E harness
//!
//! This crate drives the public quote-request form in a real browser and
//! checks how it reacts to valid and invalid input:
//! - Launches browsers through a Playwright bridge process
//! - Fills and submits the form in a fixed order
//! - Runs declarative YAML (or built-in) scenarios
//! - Appends one CSV row per scenario to a shared result log
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Quote Form Harness (Rust)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── preflight() -> probe::wait_for_target                │
//! │    └── run_all / run_tagged / run_named -> SuiteResult      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner::run(spec) -> ScenarioReport                │
//! │    ├── BrowserSession::open(launcher) / close()             │
//! │    ├── Diagnostics hooks (screenshots, network trace)       │
//! │    ├── QuoteForm::populate / submit / read_outcome          │
//! │    └── ResultLog::append(TestResultRecord)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver / BrowserLauncher                               │
//! │    ├── PlaywrightLauncher (Node.js bridge, JSON lines)      │
//! │    └── FakeBrowser (in-memory form)                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod form;
pub mod logging;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod playwright;
pub mod probe;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod spec;

pub use config::HarnessConfig;
pub use error::{E2eError, E2eResult};
pub use form::{QuoteForm, QuoteFormSchema, QuoteSubmission};
pub use report::{ResultLog, TestResultRecord};
pub use runner::{SuiteResult, TestRunner};
pub use scenario::{ScenarioReport, ScenarioRunner, ScenarioStatus};
pub use session::BrowserSession;
pub use spec::{ScenarioKind, ScenarioSpec};
