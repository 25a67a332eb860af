use std::io;
use std::sync::Arc;
use std::time::Instant;

use tracing_log_facade::writer::{JsonWriter, RecordWriter};
use tracing_log_facade::{self as log, Context, Field, LogConfig};

fn main() {
    let mut config = LogConfig::new("load-test");
    config.level = "INFO".to_string();
    let writers: Vec<Arc<dyn RecordWriter>> = vec![Arc::new(JsonWriter::new(io::sink()))];
    log::global().init_with_writers(config, writers).expect("init logger");

    let ctx = Context::background().with_trace_id("4bf92f3577b34da6a3ce929d0e0e4736");
    let n: u64 = 100_000;

    let start = Instant::now();
    for i in 0..n {
        log::debug(&ctx, "load", "suppressed", &[Field::uint64("iteration", i)]);
    }
    let suppressed = start.elapsed();

    let start = Instant::now();
    for i in 0..n {
        log::info(&ctx, "load", "default load test", &[Field::uint64("iteration", i), Field::string("kind", "info")]);
    }
    let emitted = start.elapsed();

    println!("below threshold: {} calls in {:?} (~{:.0} calls/s)", n, suppressed, n as f64 / suppressed.as_secs_f64());
    println!("emitted: {} records in {:?} (~{:.0} rec/s)", n, emitted, n as f64 / emitted.as_secs_f64());
}
