use std::fs;
use tracing_log_facade::{self as log, Context, Field, InitError, InitState, LogConfig};

#[test]
fn init_is_applied_once() {
    let dir = tempfile::tempdir().unwrap();

    let mut bad = LogConfig::new("svc");
    bad.level = "verbose".to_string();
    bad.dir = dir.path().to_path_buf();
    assert!(matches!(log::init_logger(bad), Err(InitError::Config(_))));
    assert_eq!(log::global().state(), InitState::Unconfigured);

    let mut first = LogConfig::new("orders");
    first.dir = dir.path().join("logs");
    first.enable_console = false;
    log::init_logger(first).unwrap();
    assert_eq!(log::global().state(), InitState::Ready);

    let mut second = LogConfig::new("other");
    second.dir = dir.path().join("other");
    second.level = "DEBUG".to_string();
    log::init_logger(second).unwrap();

    let applied = log::global().config().unwrap();
    assert_eq!(applied.service_name, "orders");
    assert_eq!(applied.level, "INFO");
    assert!(!dir.path().join("other").exists());

    let ctx = Context::background();
    log::debug(&ctx, "orders", "suppressed", &[]);
    log::info(&ctx, "orders", "order placed", &[Field::uint64("order_id", 42)]);

    let entries: Vec<_> = fs::read_dir(dir.path().join("logs")).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(entries.len(), 1);
    let text = fs::read_to_string(&entries[0]).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1, "{text}");

    let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["service"], "orders");
    assert_eq!(record["module"], "orders");
    assert_eq!(record["message"], "order placed");
    assert_eq!(record["order_id"], 42);
    assert_eq!(record["level"], "info");
    assert!(record["caller"].as_str().unwrap().starts_with("global_init.rs:"));
}
