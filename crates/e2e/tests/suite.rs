//! Suite runner over the built-in scenarios

use quoteform_e2e::mock::{FakeBehavior, FakeBrowser, ValidationMode};
use quoteform_e2e::{E2eError, HarnessConfig, ScenarioSpec, ScenarioStatus, TestRunner};

fn runner(dir: &std::path::Path, behavior: FakeBehavior) -> (TestRunner<FakeBrowser>, FakeBrowser) {
    let mut config = HarnessConfig {
        preflight: false,
        ..Default::default()
    };
    config.reports.dir = dir.join("reports");
    let browser = FakeBrowser::new(behavior);
    (TestRunner::new(config, browser.clone()), browser)
}

#[tokio::test]
async fn builtin_suite_passes() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, browser) = runner(dir.path(), FakeBehavior::default());

    let suite = runner.run_all(&ScenarioSpec::builtin()).await.unwrap();

    assert_eq!(suite.total, 2);
    assert_eq!(suite.passed, 2);
    assert!(suite.success());

    // One session per scenario, each closed once
    let log = browser.log();
    assert_eq!(log.launches, 2);
    assert_eq!(log.closes, 2);

    let log_path = runner.scenario_runner().result_log().path().to_path_buf();
    assert_eq!(log_path, dir.path().join("reports/test_results.csv"));
    let content = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(content.lines().count(), 3);

    let summary = runner.write_summary(&suite).unwrap();
    assert!(summary.exists());
}

#[tokio::test]
async fn failures_are_counted_separately_from_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, _) = runner(
        dir.path(),
        FakeBehavior {
            validation: ValidationMode::Never,
            ..Default::default()
        },
    );

    let suite = runner.run_all(&ScenarioSpec::builtin()).await.unwrap();

    assert_eq!(suite.passed, 1);
    assert_eq!(suite.failed, 1);
    assert_eq!(suite.aborted, 0);
    assert_eq!(suite.results[1].status, ScenarioStatus::Failed);
    assert!(!suite.success());
}

#[tokio::test]
async fn setup_failure_aborts_each_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, browser) = runner(
        dir.path(),
        FakeBehavior {
            anchor_visible: false,
            ..Default::default()
        },
    );

    let suite = runner.run_all(&ScenarioSpec::builtin()).await.unwrap();

    assert_eq!(suite.aborted, 2);
    assert_eq!(browser.log().closes, 2);
}

#[tokio::test]
async fn run_tagged_selects_subset() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, _) = runner(dir.path(), FakeBehavior::default());

    let suite = runner
        .run_tagged(&ScenarioSpec::builtin(), "validation")
        .await
        .unwrap();

    assert_eq!(suite.total, 1);
    assert_eq!(suite.results[0].name, "invalid-email-rejected");

    let err = runner
        .run_tagged(&ScenarioSpec::builtin(), "nightly")
        .await
        .unwrap_err();
    assert!(matches!(err, E2eError::Config(_)));
}

#[tokio::test]
async fn run_named_selects_one() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, _) = runner(dir.path(), FakeBehavior::default());

    let suite = runner
        .run_named(&ScenarioSpec::builtin(), "happy-path-successful-submission")
        .await
        .unwrap();
    assert_eq!(suite.total, 1);
    assert!(suite.results[0].passed());

    let err = runner
        .run_named(&ScenarioSpec::builtin(), "does-not-exist")
        .await
        .unwrap_err();
    assert!(matches!(err, E2eError::Config(_)));
}
