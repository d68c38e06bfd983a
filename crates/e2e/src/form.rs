//! Quote form interaction
//!
//! [`QuoteFormSchema`] names the DOM hooks of the quote-request form and
//! [`QuoteForm`] drives them in a fixed order: text inputs, service select,
//! checkbox groups, message, then submit.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::driver::{PageDriver, WaitState};
use crate::error::{E2eError, E2eResult};

/// A set of checkboxes addressed by their visible label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckboxGroup {
    pub name: String,
    /// label -> selector
    pub options: BTreeMap<String, String>,
}

impl CheckboxGroup {
    pub fn new(name: &str, options: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            options: options
                .iter()
                .map(|(label, selector)| (label.to_string(), selector.to_string()))
                .collect(),
        }
    }

    pub fn selector(&self, label: &str) -> E2eResult<&str> {
        self.options
            .get(label)
            .map(String::as_str)
            .ok_or_else(|| E2eError::UnknownOption {
                group: self.name.clone(),
                label: label.to_string(),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteFormSchema {
    pub name: String,
    pub email: String,
    pub service: String,
    pub account_purpose: CheckboxGroup,
    pub withdrawal: CheckboxGroup,
    pub message: String,
    pub submit: String,
    pub status: String,
    /// Class client-side validation puts on an invalid field
    pub invalid_class: String,
}

impl Default for QuoteFormSchema {
    fn default() -> Self {
        Self {
            name: "#name".to_string(),
            email: "#email".to_string(),
            service: "#service".to_string(),
            account_purpose: CheckboxGroup::new("account purpose", &[("Business", "#purposeBusiness")]),
            withdrawal: CheckboxGroup::new("withdrawal options", &[("Cash", "#withdrawCash")]),
            message: "#message".to_string(),
            submit: "button[type='submit']:has-text('Request A Quote')".to_string(),
            status: "#formStatus".to_string(),
            invalid_class: "is-invalid".to_string(),
        }
    }
}

impl QuoteFormSchema {
    /// Selector matching the email input once validation has flagged it
    pub fn invalid_email_selector(&self) -> String {
        format!("{}.{}", self.email, self.invalid_class)
    }
}

/// Values entered into the form; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    pub service: Option<String>,
    pub account_purpose: Vec<String>,
    pub withdrawal_options: Vec<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormStatus {
    pub visible: bool,
    pub text: String,
}

/// UI state read back after a submission attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormSubmissionOutcome {
    pub status_visible: bool,
    pub status_text: String,
    pub email_invalid_class_present: bool,
}

impl FormSubmissionOutcome {
    pub fn status_contains(&self, phrase: &str) -> bool {
        self.status_text.contains(phrase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationWait {
    Appeared,
    TimedOut,
}

pub struct QuoteForm<'a> {
    schema: &'a QuoteFormSchema,
}

impl<'a> QuoteForm<'a> {
    pub fn new(schema: &'a QuoteFormSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &QuoteFormSchema {
        self.schema
    }

    pub async fn populate(&self, page: &mut dyn PageDriver, submission: &QuoteSubmission) -> E2eResult<()> {
        // Resolve labels up front so an unknown option fails before any input
        let purposes = submission
            .account_purpose
            .iter()
            .map(|label| self.schema.account_purpose.selector(label))
            .collect::<E2eResult<Vec<_>>>()?;
        let withdrawals = submission
            .withdrawal_options
            .iter()
            .map(|label| self.schema.withdrawal.selector(label))
            .collect::<E2eResult<Vec<_>>>()?;

        if let Some(name) = &submission.name {
            page.fill(&self.schema.name, name).await?;
        }
        if let Some(email) = &submission.email {
            page.fill(&self.schema.email, email).await?;
        }
        if let Some(service) = &submission.service {
            page.select_option(&self.schema.service, service).await?;
        }
        for selector in purposes.into_iter().chain(withdrawals) {
            page.check(selector).await?;
        }
        if let Some(message) = &submission.message {
            page.fill(&self.schema.message, message).await?;
        }

        debug!("Form populated");
        Ok(())
    }

    pub async fn submit_enabled(&self, page: &mut dyn PageDriver) -> E2eResult<bool> {
        Ok(!page.is_disabled(&self.schema.submit).await?)
    }

    pub async fn submit(&self, page: &mut dyn PageDriver) -> E2eResult<()> {
        page.click(&self.schema.submit).await?;
        info!("Form submitted");
        Ok(())
    }

    /// Snapshot of the status element, without waiting
    pub async fn read_form_status(&self, page: &mut dyn PageDriver) -> E2eResult<FormStatus> {
        let visible = page.is_visible(&self.schema.status).await?;
        let text = page
            .text_content(&self.schema.status)
            .await?
            .unwrap_or_default();
        Ok(FormStatus { visible, text })
    }

    /// Poll for the validation class on the email field.
    ///
    /// A timeout is not an error here; the caller decides how to treat it.
    pub async fn await_validation_class(
        &self,
        page: &mut dyn PageDriver,
        timeout: Duration,
    ) -> E2eResult<ValidationWait> {
        let selector = self.schema.invalid_email_selector();
        match page
            .wait_for_selector(&selector, WaitState::Attached, timeout)
            .await
        {
            Ok(()) => Ok(ValidationWait::Appeared),
            Err(e) if e.is_timeout() => Ok(ValidationWait::TimedOut),
            Err(e) => Err(e),
        }
    }

    pub async fn email_marked_invalid(&self, page: &mut dyn PageDriver) -> E2eResult<bool> {
        let classes = page
            .attribute(&self.schema.email, "class")
            .await?
            .unwrap_or_default();
        Ok(classes
            .split_whitespace()
            .any(|class| class == self.schema.invalid_class))
    }

    pub async fn read_outcome(&self, page: &mut dyn PageDriver) -> E2eResult<FormSubmissionOutcome> {
        let status = self.read_form_status(page).await?;
        let email_invalid_class_present = self.email_marked_invalid(page).await?;
        Ok(FormSubmissionOutcome {
            status_visible: status.visible,
            status_text: status.text,
            email_invalid_class_present,
        })
    }
}
