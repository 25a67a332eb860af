use std::sync::Arc;
use std::time::Duration;

use tracing_log_facade::backend::make_sink;
use tracing_log_facade::remote::{RemoteConfig, RemoteLogger};
use tracing_log_facade::{self as log, BaseFields, Context, Field, RequestInfo};

/// Ships records to a collector given as a DSN, e.g.
///
/// ```text
/// LOG_DSN=http://127.0.0.1:8080/ingest cargo run --example remote_logger
/// LOG_DSN=clickhouse://default:@127.0.0.1:8123/default/logs cargo run --example remote_logger
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dsn = tracing_log_facade::env::env_or("LOG_DSN", "http://127.0.0.1:8080/ingest");
    let sink = make_sink(&dsn)?;

    let config = RemoteConfig {
        batch_size: 50,
        flush_interval: Duration::from_secs(2),
        ..RemoteConfig::default()
    };
    let facade = log::global();
    let remote = Arc::new(RemoteLogger::start(
        sink,
        BaseFields::new("remote-example", "dev"),
        Arc::clone(facade.trace_ids()),
        config,
    )?);
    log::set_logger(remote.clone());

    let ctx = Context::background();
    for i in 0..120u32 {
        log::info_with_request(
            &ctx,
            "api",
            "request served",
            RequestInfo::new(&format!("req-{i}"), 5 + i64::from(i % 20)),
            &[Field::uint32("i", i)],
        );
    }
    log::warn(&ctx, "api", "slow downstream", &[Field::duration("latency", Duration::from_millis(850))]);

    remote.shutdown().await;
    println!("sent {} records, dropped {}", remote.sent_records(), remote.dropped_records());
    Ok(())
}
