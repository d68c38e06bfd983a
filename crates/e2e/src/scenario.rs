//! Scenario execution
//!
//! Every scenario follows one flow: open a session, fill the form, submit
//! according to the scenario kind, read the UI back, log a result row,
//! check expectations and close the session. The session is closed on every
//! path, and only failed expectations mark a scenario as failed.

use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::HarnessConfig;
use crate::diagnostics::{self, Diagnostics};
use crate::driver::BrowserLauncher;
use crate::error::{E2eError, E2eResult};
use crate::form::{FormSubmissionOutcome, QuoteForm, ValidationWait};
use crate::report::{ResultLog, TestResultRecord};
use crate::session::{BrowserSession, SessionOptions};
use crate::spec::{ScenarioKind, ScenarioSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    /// One or more expectations did not hold
    Failed,
    /// Setup or a required interaction failed before expectations ran
    Aborted,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Passed => "PASSED",
            ScenarioStatus::Failed => "FAILED",
            ScenarioStatus::Aborted => "ABORTED",
        }
    }
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    pub outcome: Option<FormSubmissionOutcome>,
    pub failures: Vec<String>,
    pub error: Option<String>,
    pub validation_timed_out: bool,
    pub logged: bool,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

/// What the scenario body produced before the session was closed
struct Observation {
    outcome: FormSubmissionOutcome,
    failures: Vec<String>,
    validation_timed_out: bool,
    logged: bool,
}

pub struct ScenarioRunner<L> {
    config: HarnessConfig,
    launcher: L,
    log: ResultLog,
    diagnostics: Box<dyn Diagnostics>,
}

impl<L: BrowserLauncher> ScenarioRunner<L> {
    pub fn new(config: HarnessConfig, launcher: L) -> Self {
        let log = ResultLog::new(&config.reports.dir, &config.reports.results_file);
        let diagnostics = diagnostics::from_settings(&config.diagnostics, &config.reports.dir);
        Self {
            config,
            launcher,
            log,
            diagnostics,
        }
    }

    /// Replace the diagnostics strategy chosen from configuration
    pub fn with_diagnostics(mut self, diagnostics: Box<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn result_log(&self) -> &ResultLog {
        &self.log
    }

    pub async fn run(&self, spec: &ScenarioSpec) -> ScenarioReport {
        let span = info_span!("scenario", name = %spec.name);
        self.run_inner(spec).instrument(span).await
    }

    async fn run_inner(&self, spec: &ScenarioSpec) -> ScenarioReport {
        let start = Instant::now();
        let options = SessionOptions::from_config(&self.config);

        let result = match BrowserSession::open(&self.launcher, &options).await {
            Ok(mut session) => {
                let body = self.drive(&mut session, spec).await;
                self.diagnostics.finish(&spec.name);
                if let Err(e) = session.close().await {
                    warn!("Session close reported: {}", e);
                }
                body
            }
            Err(e) => {
                self.diagnostics.finish(&spec.name);
                Err(e)
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let report = match result {
            Ok(obs) => ScenarioReport {
                name: spec.name.clone(),
                status: if obs.failures.is_empty() {
                    ScenarioStatus::Passed
                } else {
                    ScenarioStatus::Failed
                },
                duration_ms,
                outcome: Some(obs.outcome),
                error: (!obs.failures.is_empty())
                    .then(|| E2eError::AssertionFailed(obs.failures.join("; ")).to_string()),
                failures: obs.failures,
                validation_timed_out: obs.validation_timed_out,
                logged: obs.logged,
            },
            Err(e) => ScenarioReport {
                name: spec.name.clone(),
                status: ScenarioStatus::Aborted,
                duration_ms,
                outcome: None,
                failures: Vec::new(),
                error: Some(e.to_string()),
                validation_timed_out: false,
                logged: false,
            },
        };

        match report.status {
            ScenarioStatus::Passed => info!("Scenario '{}' PASSED", report.name),
            status => error!(
                "Scenario '{}' {}: {}",
                report.name,
                status.as_str(),
                report.error.as_deref().unwrap_or("unknown error")
            ),
        }
        report
    }

    async fn drive(&self, session: &mut BrowserSession, spec: &ScenarioSpec) -> E2eResult<Observation> {
        let form = QuoteForm::new(&self.config.form);
        self.diagnostics.on_session_open(session).await;

        form.populate(session.page(), &spec.form).await?;

        let mut validation_timed_out = false;
        let outcome = match spec.kind {
            ScenarioKind::HappyPath => {
                form.submit(session.page()).await?;
                form.read_outcome(session.page()).await?
            }
            ScenarioKind::InvalidInput => {
                if form.submit_enabled(session.page()).await? {
                    form.submit(session.page()).await?;
                    validation_timed_out = self.await_validation(&form, session).await?;
                } else {
                    info!("Submit button disabled, skipping submission");
                }
                self.diagnostics.after_rejected_submit(session).await;
                form.read_outcome(session.page()).await?
            }
        };

        let logged = spec.log_result && self.log_result(spec, &outcome);
        let failures = self.check_expectations(spec.kind, &outcome, validation_timed_out);

        Ok(Observation {
            outcome,
            failures,
            validation_timed_out,
            logged,
        })
    }

    /// Returns whether the poll timed out
    async fn await_validation(&self, form: &QuoteForm<'_>, session: &mut BrowserSession) -> E2eResult<bool> {
        let timeout = self.config.timeouts.validation();
        match form.await_validation_class(session.page(), timeout).await? {
            ValidationWait::Appeared => Ok(false),
            ValidationWait::TimedOut => {
                let warning = E2eError::ValidationTiming {
                    selector: form.schema().invalid_email_selector(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                warn!("{}", warning);
                Ok(true)
            }
        }
    }

    fn log_result(&self, spec: &ScenarioSpec, outcome: &FormSubmissionOutcome) -> bool {
        let record = TestResultRecord::from_outcome(&spec.form, outcome, &self.config.success_phrase);
        match self.log.append(&record) {
            Ok(()) => true,
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    fn check_expectations(
        &self,
        kind: ScenarioKind,
        outcome: &FormSubmissionOutcome,
        validation_timed_out: bool,
    ) -> Vec<String> {
        let mut failures = Vec::new();
        match kind {
            ScenarioKind::HappyPath => {
                if !outcome.status_visible {
                    failures.push("Form status should be visible".to_string());
                }
                if !outcome.status_contains(&self.config.success_phrase) {
                    failures.push(format!(
                        "Form status should contain '{}', got '{}'",
                        self.config.success_phrase,
                        outcome.status_text.trim()
                    ));
                }
            }
            ScenarioKind::InvalidInput => {
                if validation_timed_out && self.config.strict_validation_timing {
                    failures.push(format!(
                        "Validation class did not appear within {} ms",
                        self.config.timeouts.validation_ms
                    ));
                }
                if !outcome.email_invalid_class_present {
                    failures.push(format!(
                        "Email field should have '{}' class",
                        self.config.form.invalid_class
                    ));
                }
                if outcome.status_visible {
                    failures.push("Form status should not be visible".to_string());
                }
            }
        }
        failures
    }
}
