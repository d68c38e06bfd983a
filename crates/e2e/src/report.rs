//! CSV result log
//!
//! One row per scenario run, appended to a shared file. The header is
//! written only when the file did not exist before the append.

use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::form::{FormSubmissionOutcome, QuoteSubmission};

/// Column contract of the log; change only together with the row layout
pub const CSV_HEADER: &str = "Name,Email,Service,AccountPurpose,WithdrawalOptions,Message,FormStatusVisible,SuccessMessagePresent,Timestamp";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Separator for multi-valued checkbox selections within one cell
const MULTI_VALUE_SEPARATOR: &str = ";";

// Serialises appends from every ResultLog in the process
static APPEND_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Quote a CSV field when it contains a comma or a double quote
pub fn escape_csv(value: Option<&str>) -> Cow<'_, str> {
    match value {
        None => Cow::Borrowed(""),
        Some(v) if v.contains(',') || v.contains('"') => {
            Cow::Owned(format!("\"{}\"", v.replace('"', "\"\"")))
        }
        Some(v) => Cow::Borrowed(v),
    }
}

/// Outcome of one scenario run, as persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResultRecord {
    name: Option<String>,
    email: Option<String>,
    service: Option<String>,
    account_purpose: Option<String>,
    withdrawal_options: Option<String>,
    message: Option<String>,
    form_status_visible: bool,
    success_message_present: bool,
    timestamp: NaiveDateTime,
}

impl TestResultRecord {
    /// Build a record stamped with the current local time
    pub fn new(submission: &QuoteSubmission, form_status_visible: bool, success_message_present: bool) -> Self {
        Self::at(
            submission,
            form_status_visible,
            success_message_present,
            Local::now().naive_local(),
        )
    }

    pub fn from_outcome(submission: &QuoteSubmission, outcome: &FormSubmissionOutcome, success_phrase: &str) -> Self {
        Self::new(
            submission,
            outcome.status_visible,
            outcome.status_contains(success_phrase),
        )
    }

    pub fn at(
        submission: &QuoteSubmission,
        form_status_visible: bool,
        success_message_present: bool,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            name: submission.name.clone(),
            email: submission.email.clone(),
            service: submission.service.clone(),
            account_purpose: join_labels(&submission.account_purpose),
            withdrawal_options: join_labels(&submission.withdrawal_options),
            message: submission.message.clone(),
            form_status_visible,
            success_message_present,
            timestamp,
        }
    }

    pub fn form_status_visible(&self) -> bool {
        self.form_status_visible
    }

    pub fn success_message_present(&self) -> bool {
        self.success_message_present
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Field values in column order
    pub fn fields(&self) -> [Option<String>; 9] {
        [
            self.name.clone(),
            self.email.clone(),
            self.service.clone(),
            self.account_purpose.clone(),
            self.withdrawal_options.clone(),
            self.message.clone(),
            Some(self.form_status_visible.to_string()),
            Some(self.success_message_present.to_string()),
            Some(self.timestamp.format(TIMESTAMP_FORMAT).to_string()),
        ]
    }

    pub fn to_csv_line(&self) -> String {
        self.fields()
            .iter()
            .map(|f| escape_csv(f.as_deref()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn join_labels(labels: &[String]) -> Option<String> {
    if labels.is_empty() {
        None
    } else {
        Some(labels.join(MULTI_VALUE_SEPARATOR))
    }
}

/// Append-only CSV log at a fixed path
#[derive(Debug, Clone)]
pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    pub fn new(dir: impl AsRef<Path>, file_name: &str) -> Self {
        Self {
            path: dir.as_ref().join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &TestResultRecord) -> E2eResult<()> {
        let _guard = APPEND_LOCK.lock();
        self.append_locked(record).map_err(|source| E2eError::LoggingIo {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn append_locked(&self, record: &TestResultRecord) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let existed = self.path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);

        if !existed {
            writeln!(writer, "{}", CSV_HEADER)?;
        }
        writeln!(writer, "{}", record.to_csv_line())?;
        writer.flush()?;

        debug!("Appended result row to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use test_case::test_case;

    fn submission() -> QuoteSubmission {
        QuoteSubmission {
            name: Some("John Doe".into()),
            email: Some("test@example.com".into()),
            service: Some("Select B Service".into()),
            account_purpose: vec!["Business".into()],
            withdrawal_options: vec!["Cash".into()],
            message: Some("Test message for quote request.".into()),
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(12, 5, 7)
            .unwrap()
    }

    #[test_case(None, "" ; "null is empty")]
    #[test_case(Some("Business"), "Business" ; "plain")]
    #[test_case(Some("a,b"), "\"a,b\"" ; "comma")]
    #[test_case(Some("\""), "\"\"\"\"" ; "lone quote")]
    #[test_case(Some(r#"He said, "hi""#), r#""He said, ""hi""""# ; "comma and quotes")]
    fn test_escape(value: Option<&str>, expected: &str) {
        assert_eq!(escape_csv(value), expected);
    }

    #[test]
    fn test_escape_plain_borrows() {
        assert!(matches!(escape_csv(Some("Business")), Cow::Borrowed(_)));
    }

    #[test]
    fn test_escape_leaves_newlines_alone() {
        assert_eq!(escape_csv(Some("line one\nline two")), "line one\nline two");
    }

    #[test]
    fn test_csv_line_layout() {
        let record = TestResultRecord::at(&submission(), true, true, noon());
        assert_eq!(
            record.to_csv_line(),
            "John Doe,test@example.com,Select B Service,Business,Cash,Test message for quote request.,true,true,2024-03-09 12:05:07"
        );
        assert_eq!(record.to_csv_line().split(',').count(), CSV_HEADER.split(',').count());
    }

    #[test]
    fn test_from_outcome_checks_success_phrase() {
        let before = Local::now().naive_local();
        let outcome = FormSubmissionOutcome {
            status_visible: true,
            status_text: "Thanks! Your quote request was received.".into(),
            email_invalid_class_present: false,
        };

        let record = TestResultRecord::from_outcome(&submission(), &outcome, "quote request was received");
        assert!(record.form_status_visible());
        assert!(record.success_message_present());
        assert!(record.timestamp() >= before);

        let record = TestResultRecord::from_outcome(&submission(), &outcome, "Форма отправлена");
        assert!(record.form_status_visible());
        assert!(!record.success_message_present());
    }

    #[test]
    fn test_missing_fields_are_empty_cells() {
        let sub = QuoteSubmission {
            name: Some("John Doe".into()),
            email: Some("invalid_email".into()),
            ..Default::default()
        };
        let record = TestResultRecord::at(&sub, false, false, noon());
        assert_eq!(
            record.to_csv_line(),
            "John Doe,invalid_email,,,,,false,false,2024-03-09 12:05:07"
        );
    }

    #[test]
    fn test_multiple_labels_joined() {
        let sub = QuoteSubmission {
            withdrawal_options: vec!["Cash".into(), "Card".into()],
            ..Default::default()
        };
        let record = TestResultRecord::at(&sub, false, false, noon());
        assert_eq!(record.fields()[4].as_deref(), Some("Cash;Card"));
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = ResultLog::new(dir.path().join("reports"), "test_results.csv");
        let record = TestResultRecord::at(&submission(), true, true, noon());

        log.append(&record).unwrap();
        log.append(&record).unwrap();
        log.append(&record).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.iter().filter(|l| **l == CSV_HEADER).count(), 1);
    }

    #[test]
    fn test_existing_file_gets_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_results.csv");
        fs::write(&path, format!("{}\nolder,row,,,,,true,true,2024-01-01 00:00:00\n", CSV_HEADER)).unwrap();

        let log = ResultLog::new(dir.path(), "test_results.csv");
        log.append(&TestResultRecord::at(&submission(), true, true, noon()))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert_eq!(content.matches(CSV_HEADER).count(), 1);
    }

    #[test]
    fn test_unwritable_location_is_logging_error() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the reports directory should be
        let blocker = dir.path().join("reports");
        fs::write(&blocker, "not a directory").unwrap();

        let log = ResultLog::new(&blocker, "test_results.csv");
        let err = log
            .append(&TestResultRecord::at(&submission(), true, true, noon()))
            .unwrap_err();
        assert!(matches!(err, E2eError::LoggingIo { .. }));
        assert!(!err.is_fatal());
    }
}
