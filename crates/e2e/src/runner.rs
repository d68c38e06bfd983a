//! Suite runner: preflight, sequential scenario execution and summary

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};

use crate::config::HarnessConfig;
use crate::driver::BrowserLauncher;
use crate::error::{E2eError, E2eResult};
use crate::probe;
use crate::scenario::{ScenarioReport, ScenarioRunner, ScenarioStatus};
use crate::spec::ScenarioSpec;

/// Result of running a set of scenarios
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub aborted: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioReport>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.aborted == 0
    }
}

/// Runs scenarios one after another against a single target
pub struct TestRunner<L> {
    scenarios: ScenarioRunner<L>,
    preflight_done: bool,
}

impl<L: BrowserLauncher> TestRunner<L> {
    pub fn new(config: HarnessConfig, launcher: L) -> Self {
        Self::from_scenario_runner(ScenarioRunner::new(config, launcher))
    }

    pub fn from_scenario_runner(scenarios: ScenarioRunner<L>) -> Self {
        Self {
            scenarios,
            preflight_done: false,
        }
    }

    pub fn scenario_runner(&self) -> &ScenarioRunner<L> {
        &self.scenarios
    }

    /// Probe the target once per runner, if enabled
    pub async fn preflight(&mut self) -> E2eResult<()> {
        let config = self.scenarios.config();
        if !config.preflight || self.preflight_done {
            return Ok(());
        }
        probe::wait_for_target(&config.target_url, config.timeouts.preflight()).await?;
        self.preflight_done = true;
        Ok(())
    }

    pub async fn run_all(&mut self, specs: &[ScenarioSpec]) -> E2eResult<SuiteResult> {
        let all: Vec<&ScenarioSpec> = specs.iter().collect();
        self.run_specs(&all).await
    }

    /// Run scenarios carrying `tag`
    pub async fn run_tagged(&mut self, specs: &[ScenarioSpec], tag: &str) -> E2eResult<SuiteResult> {
        let filtered = ScenarioSpec::filter_by_tag(specs, tag);
        if filtered.is_empty() {
            return Err(E2eError::Config(format!("no scenario tagged '{}'", tag)));
        }
        self.run_specs(&filtered).await
    }

    /// Run a specific scenario by name
    pub async fn run_named(&mut self, specs: &[ScenarioSpec], name: &str) -> E2eResult<SuiteResult> {
        let spec = specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::Config(format!("Scenario not found: {}", name)))?;
        self.run_specs(&[spec]).await
    }

    pub async fn run_specs(&mut self, specs: &[&ScenarioSpec]) -> E2eResult<SuiteResult> {
        let start = Instant::now();
        self.preflight().await?;

        info!("Running {} scenario(s)...", specs.len());

        let mut suite = SuiteResult {
            total: specs.len(),
            ..Default::default()
        };

        for spec in specs {
            let report = self.scenarios.run(spec).await;
            match report.status {
                ScenarioStatus::Passed => {
                    suite.passed += 1;
                    info!("✓ {} ({} ms)", report.name, report.duration_ms);
                }
                ScenarioStatus::Failed => {
                    suite.failed += 1;
                    error!("✗ {} - {}", report.name, report.error.as_deref().unwrap_or("unknown error"));
                }
                ScenarioStatus::Aborted => {
                    suite.aborted += 1;
                    error!("✗ {} (aborted) - {}", report.name, report.error.as_deref().unwrap_or("unknown error"));
                }
            }
            suite.results.push(report);
        }

        suite.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Scenario results: {} passed, {} failed, {} aborted ({} ms)",
            suite.passed, suite.failed, suite.aborted, suite.duration_ms
        );
        info!("Result log: {}", self.scenarios.result_log().path().display());

        Ok(suite)
    }

    /// Write the suite summary as JSON next to the result log
    pub fn write_summary(&self, suite: &SuiteResult) -> E2eResult<PathBuf> {
        let dir = &self.scenarios.config().reports.dir;
        write_summary_to(dir, suite)
    }
}

fn write_summary_to(dir: &Path, suite: &SuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let path = dir.join("suite-summary.json");
    let json = serde_json::to_string_pretty(suite)?;
    std::fs::write(&path, json)?;

    info!("Summary written to: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_success_requires_no_failures_or_aborts() {
        let mut suite = SuiteResult {
            total: 2,
            passed: 2,
            ..Default::default()
        };
        assert!(suite.success());

        suite.aborted = 1;
        assert!(!suite.success());
    }

    #[test]
    fn test_write_summary() {
        let dir = tempfile::tempdir().unwrap();
        let suite = SuiteResult {
            total: 1,
            failed: 1,
            ..Default::default()
        };
        let path = write_summary_to(&dir.path().join("reports"), &suite).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["failed"], 1);
        assert_eq!(json["results"].as_array().unwrap().len(), 0);
    }
}
