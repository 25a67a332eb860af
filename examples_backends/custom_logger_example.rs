use std::error::Error;
use std::sync::Arc;

use tracing_log_facade::{self as log, Context, Field, Logger, RequestInfo};

/// Example of plugging in a completely custom backend by implementing the
/// `Logger` trait directly. Imagine this forwards to an in-house agent; for
/// the sake of example it just prints a line per call.
struct PrintLogger;

impl PrintLogger {
    fn print(&self, level: &str, ctx: &Context, module: &str, message: &str, fields: &[Field]) {
        let trace_id = log::get_or_create_trace_id(ctx);
        let fields: Vec<String> = fields.iter().map(|f| format!("{}={}", f.key(), f.value().to_json())).collect();
        println!("[{level}] trace={trace_id} module={module} {message} {}", fields.join(" "));
    }
}

impl Logger for PrintLogger {
    fn debug(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]) {
        self.print("debug", ctx, module, message, fields);
    }

    fn info(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]) {
        self.print("info", ctx, module, message, fields);
    }

    fn warn(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]) {
        self.print("warn", ctx, module, message, fields);
    }

    fn error(&self, ctx: &Context, module: &str, message: &str, err: Option<&dyn Error>, fields: &[Field]) {
        let mut fields = fields.to_vec();
        if let Some(err) = err {
            fields.push(Field::error(err));
        }
        self.print("error", ctx, module, message, &fields);
    }

    fn error_with_code(
        &self,
        ctx: &Context,
        module: &str,
        message: &str,
        error_code: &str,
        err: Option<&dyn Error>,
        fields: &[Field],
    ) {
        let mut fields = fields.to_vec();
        fields.push(Field::string("error_code", error_code));
        self.error(ctx, module, message, err, &fields);
    }

    fn fatal(&self, ctx: &Context, module: &str, message: &str, err: Option<&dyn Error>, fields: &[Field]) {
        self.error(ctx, module, message, err, fields);
        std::process::exit(1);
    }

    fn info_with_request(&self, ctx: &Context, module: &str, message: &str, request: RequestInfo<'_>, fields: &[Field]) {
        let mut fields = fields.to_vec();
        if let Some(id) = request.request_id() {
            fields.push(Field::string("request_id", id));
        }
        self.info(ctx, module, message, &fields);
    }

    fn error_with_request(
        &self,
        ctx: &Context,
        module: &str,
        message: &str,
        request: RequestInfo<'_>,
        err: Option<&dyn Error>,
        fields: &[Field],
    ) {
        let mut fields = fields.to_vec();
        if let Some(id) = request.request_id() {
            fields.push(Field::string("request_id", id));
        }
        self.error(ctx, module, message, err, &fields);
    }
}

fn main() {
    log::set_logger(Arc::new(PrintLogger));

    let ctx = Context::background();
    log::info(&ctx, "example", "custom logger example started", &[]);

    let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "db unreachable");
    log::error_with_code(&ctx, "db", "simulated error sent via custom logger", "DB_001", Some(&err), &[
        Field::string("db", "my-custom-db"),
    ]);
    log::info_with_request(&ctx, "api", "request served", RequestInfo::new("req-1", 12), &[]);
}
