//! Console and error-channel capture through the public API.

use serde_json::json;
use std::sync::Arc;

use devconsole::capture::{Capture, ConsoleCapture};
use devconsole::config::{parse_config, CaptureConfig};
use devconsole::host::{Host, LogLevel};
use devconsole::store::StoreEvent;

#[test]
fn test_mixed_levels_and_repeats() {
    let host = Host::silent();
    let capture = Capture::new(host.clone(), CaptureConfig::default());
    capture.install();

    let console = host.console();
    console.log(&[json!("starting")]);
    console.warn(&[json!("slow"), json!({"ms": 1200})]);
    console.warn(&[json!("slow"), json!({"ms": 1200})]);
    console.error(&[json!("failed")]);
    console.debug(&[json!("detail")]);
    console.info(&[json!("done")]);

    let logs = capture.logs().snapshot();
    let summary: Vec<_> = logs.iter().map(|r| (r.level, r.repeated)).collect();
    assert_eq!(
        summary,
        vec![
            (LogLevel::Log, 1),
            (LogLevel::Warn, 2),
            (LogLevel::Error, 1),
            (LogLevel::Debug, 1),
            (LogLevel::Info, 1),
        ]
    );
}

#[test]
fn test_capacity_from_toml_config() {
    let config = parse_config("max_log_number = 3").unwrap();
    let host = Host::silent();
    let capture = Capture::new(host.clone(), config);
    capture.install();

    for i in 0..5 {
        host.console().log(&[json!(i)]);
    }
    let content: Vec<_> = capture
        .logs()
        .snapshot()
        .iter()
        .map(|r| r.content[0].clone())
        .collect();
    assert_eq!(content, vec![json!(2), json!(3), json!(4)]);
}

#[test]
fn test_store_notifications() {
    let host = Host::silent();
    let capture = ConsoleCapture::new(host.clone(), 1);
    capture.install();
    let mut events = capture.logs().subscribe();

    host.console().log(&[json!("a")]);
    host.console().log(&[json!("a")]);
    host.console().log(&[json!("b")]);
    capture.logs().clear();

    let received: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(matches!(received[0], StoreEvent::Appended(_)));
    assert!(matches!(received[1], StoreEvent::Updated(_)));
    assert!(matches!(received[2], StoreEvent::Appended(_)));
    assert!(matches!(received[3], StoreEvent::Evicted(_)));
    assert!(matches!(received[4], StoreEvent::Cleared));
}

#[test]
fn test_snapshot_is_stable_while_logging_continues() {
    let host = Host::silent();
    let capture = ConsoleCapture::new(host.clone(), 10);
    capture.install();

    host.console().log(&[json!(1)]);
    let before = capture.logs().snapshot();
    host.console().log(&[json!(2)]);

    assert_eq!(before.len(), 1);
    assert_eq!(capture.logs().len(), 2);
}

#[test]
fn test_logging_from_many_threads() {
    let host = Host::silent();
    let capture = Arc::new(ConsoleCapture::new(host.clone(), 10_000));
    capture.install();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let host = host.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    host.console().info(&[json!(t), json!(i)]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let logs = capture.logs().snapshot();
    assert_eq!(logs.len(), 800);
    let mut ids: Vec<_> = logs.iter().map(|r| r.id.clone()).collect();
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    ids.dedup();
    assert_eq!(ids.len(), 800);
}

#[test]
fn test_uncaught_error_without_value_records_message() {
    let host = Host::silent();
    let capture = Capture::new(host.clone(), CaptureConfig::default());
    capture.install();

    host.events().report_error("Script error.", None);
    let record = capture.logs().snapshot().first().cloned().unwrap();
    assert_eq!(record.level, LogLevel::Error);
    assert_eq!(record.content, vec![json!("Script error.")]);

    capture.uninstall();
    host.events().report_error("after", None);
    assert_eq!(capture.logs().len(), 1);
}
