//! Result log output read back through an independent CSV parser

use std::thread;

use chrono::NaiveDateTime;
use quoteform_e2e::report::{CSV_HEADER, TIMESTAMP_FORMAT};
use quoteform_e2e::{QuoteSubmission, ResultLog, TestResultRecord};

fn parse(path: &std::path::Path) -> (Vec<String>, Vec<csv::StringRecord>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().iter().map(String::from).collect();
    let rows = reader.records().map(|r| r.unwrap()).collect();
    (headers, rows)
}

#[test]
fn awkward_values_survive_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let log = ResultLog::new(dir.path(), "test_results.csv");

    let values = [
        r#"He said, "hi""#,
        "plain",
        "trailing,",
        "\"quoted\"",
        "semi;colon",
        "Форма отправлена.",
    ];
    for value in values {
        let submission = QuoteSubmission {
            name: Some(value.to_string()),
            message: Some(value.to_string()),
            ..Default::default()
        };
        log.append(&TestResultRecord::new(&submission, false, false)).unwrap();
    }

    let (headers, rows) = parse(log.path());
    assert_eq!(headers.join(","), CSV_HEADER);
    assert_eq!(rows.len(), values.len());
    for (row, value) in rows.iter().zip(values) {
        assert_eq!(row.len(), 9);
        assert_eq!(&row[0], value);
        assert_eq!(&row[5], value);
        assert_eq!(&row[1], "");
        assert!(NaiveDateTime::parse_from_str(&row[8], TIMESTAMP_FORMAT).is_ok());
    }
}

#[test]
fn concurrent_appends_keep_rows_whole() {
    let dir = tempfile::tempdir().unwrap();
    let log = ResultLog::new(dir.path().join("reports"), "test_results.csv");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let log = log.clone();
            thread::spawn(move || {
                for j in 0..10 {
                    let submission = QuoteSubmission {
                        name: Some(format!("worker {}, row {}", i, j)),
                        withdrawal_options: vec!["Cash".to_string()],
                        ..Default::default()
                    };
                    log.append(&TestResultRecord::new(&submission, true, true)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let content = std::fs::read_to_string(log.path()).unwrap();
    assert_eq!(content.matches(CSV_HEADER).count(), 1);

    let (_, rows) = parse(log.path());
    assert_eq!(rows.len(), 80);
    assert!(rows.iter().all(|r| r.len() == 9 && &r[4] == "Cash"));
}
