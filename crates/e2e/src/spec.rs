//! Declarative YAML scenario specification

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::form::QuoteSubmission;

/// What a scenario expects the form to do with its input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Valid input; the success status must appear
    HappyPath,
    /// Invalid email; validation must flag the field and no status appears
    InvalidInput,
}

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    pub kind: ScenarioKind,

    /// Values entered into the form
    pub form: QuoteSubmission,

    /// Append a row to the result log for this scenario
    #[serde(default = "default_log_result")]
    pub log_result: bool,
}

fn default_log_result() -> bool {
    true
}

impl ScenarioSpec {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            E2eError::Yaml(err) => E2eError::Config(format!("{}: {}", path.display(), err)),
            other => other,
        })
    }

    /// Load all scenarios from a directory, sorted by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::Config("scenario name is empty".to_string()));
        }
        if self.kind == ScenarioKind::InvalidInput && self.form.email.is_none() {
            return Err(E2eError::Config(format!(
                "scenario '{}': invalid_input needs an email value",
                self.name
            )));
        }
        Ok(())
    }

    /// The two scenarios run against the live form by default
    pub fn builtin() -> Vec<Self> {
        vec![
            ScenarioSpec {
                name: "happy-path-successful-submission".to_string(),
                description: "Valid quote request shows the success status".to_string(),
                tags: vec!["smoke".to_string()],
                kind: ScenarioKind::HappyPath,
                form: QuoteSubmission {
                    name: Some("John Doe".to_string()),
                    email: Some("test@example.com".to_string()),
                    service: Some("Select B Service".to_string()),
                    account_purpose: vec!["Business".to_string()],
                    withdrawal_options: vec!["Cash".to_string()],
                    message: Some("Test message for quote request.".to_string()),
                },
                log_result: true,
            },
            ScenarioSpec {
                name: "invalid-email-rejected".to_string(),
                description: "Invalid email is flagged and nothing is submitted".to_string(),
                tags: vec!["validation".to_string()],
                kind: ScenarioKind::InvalidInput,
                form: QuoteSubmission {
                    name: Some("John Doe".to_string()),
                    email: Some("invalid_email".to_string()),
                    service: Some("Select B Service".to_string()),
                    account_purpose: Vec::new(),
                    withdrawal_options: vec!["Cash".to_string()],
                    message: Some("Test message".to_string()),
                },
                log_result: true,
            },
        ]
    }
}
