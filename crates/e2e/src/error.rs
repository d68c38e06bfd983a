//! Error types for the quote-form harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Session setup failed: {0}")]
    SessionSetup(String),

    #[error("Session not ready: '{selector}' not visible after {timeout_ms} ms")]
    SessionNotReady { selector: String, timeout_ms: u64 },

    #[error("Element not interactable: {selector} ({reason})")]
    ElementNotInteractable { selector: String, reason: String },

    #[error("Unknown option '{label}' for {group}")]
    UnknownOption { group: String, label: String },

    #[error("Validation class '{selector}' did not appear within {timeout_ms} ms")]
    ValidationTiming { selector: String, timeout_ms: u64 },

    #[error("Failed to write result log {path}: {source}")]
    LoggingIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Diagnostic capture failed: {0}")]
    DiagnosticCapture(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Bridge protocol error: {0}")]
    Protocol(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Browser session already closed")]
    SessionClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether this error aborts the scenario that hit it.
    ///
    /// Logging, diagnostic capture and validation timing are reported and
    /// the scenario carries on; everything else ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            E2eError::LoggingIo { .. }
                | E2eError::DiagnosticCapture(_)
                | E2eError::ValidationTiming { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, E2eError::Timeout(_))
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_fatal_classes() {
        let logging = E2eError::LoggingIo {
            path: "reports/test_results.csv".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!logging.is_fatal());
        assert!(!E2eError::DiagnosticCapture("disk full".into()).is_fatal());
        assert!(!E2eError::ValidationTiming {
            selector: "#email.is-invalid".into(),
            timeout_ms: 5000
        }
        .is_fatal());
    }

    #[test]
    fn test_fatal_classes() {
        assert!(E2eError::SessionSetup("dns".into()).is_fatal());
        assert!(E2eError::SessionNotReady {
            selector: "#name".into(),
            timeout_ms: 60_000
        }
        .is_fatal());
        assert!(E2eError::ElementNotInteractable {
            selector: "#email".into(),
            reason: "element disabled".into()
        }
        .is_fatal());
    }
}
