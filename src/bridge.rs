use crate::context::{Context, TRACEPARENT_KEY, TRACE_ID_KEY};
use crate::facade::LogFacade;
use crate::field::Field;
use crate::init::InitError;
use crate::level::Level;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field as TracingField, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Registry;

/// Events from these targets are never forwarded, so the facade's own
/// diagnostics cannot loop back into it.
const SELF_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Configuration for [`install_tracing_bridge`].
///
/// **Fields**
/// - `level`: minimum severity forwarded to the facade.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is added
///   next to the bridge and every event is also printed to the console.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub level: Level,
    pub enable_stdout: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { level: Level::Debug, enable_stdout: false }
    }
}

/// `tracing_subscriber` layer that turns `tracing` events into facade calls.
///
/// The event target becomes the module tag, `message` becomes the message,
/// an `error` field becomes the record's error and `trace_id` or
/// `traceparent` fields feed trace-id resolution. Every other field is
/// forwarded under its own name, plus `source` with the event's `file:line`.
pub struct FacadeLayer {
    facade: Arc<LogFacade>,
    min_level: Level,
    /// Events handed to the facade.
    pub forwarded_events: Arc<AtomicU64>,
}

impl FacadeLayer {
    pub fn new(facade: Arc<LogFacade>) -> Self {
        Self { facade, min_level: Level::Debug, forwarded_events: Arc::new(AtomicU64::new(0)) }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

impl<S> Layer<S> for FacadeLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(SELF_TARGET) {
            return;
        }
        let level = Level::from_tracing(meta.level());
        if level < self.min_level {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            let file = file.rsplit(['/', '\\']).next().unwrap_or(file);
            visitor.fields.push(Field::string("source", format!("{file}:{line}")));
        }

        let mut ctx = Context::background();
        if let Some(id) = visitor.trace_id.take() {
            ctx = ctx.with_trace_id(id);
        }
        if let Some(header) = visitor.traceparent.take() {
            ctx = ctx.with_traceparent(header);
        }

        let module = meta.target();
        let message = visitor.message.unwrap_or_default();
        let err = visitor.error.as_ref().map(|e| e as &dyn Error);
        match level {
            Level::Debug => self.facade.debug(&ctx, module, &message, &visitor.fields),
            Level::Info => self.facade.info(&ctx, module, &message, &visitor.fields),
            Level::Warn => self.facade.warn(&ctx, module, &message, &visitor.fields),
            Level::Error | Level::Fatal => self.facade.error(&ctx, module, &message, err, &visitor.fields),
        }
        self.forwarded_events.fetch_add(1, Ordering::Relaxed);
    }
}

/// Error value rebuilt from an event's `error` field.
#[derive(Debug)]
struct EventError(String);

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for EventError {}

#[derive(Default)]
struct FieldVisitor {
    fields: Vec<Field>,
    message: Option<String>,
    error: Option<EventError>,
    trace_id: Option<String>,
    traceparent: Option<String>,
}

impl FieldVisitor {
    fn record_text(&mut self, field: &TracingField, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            "error" => self.error = Some(EventError(value)),
            TRACE_ID_KEY => self.trace_id = Some(value),
            TRACEPARENT_KEY => self.traceparent = Some(value),
            name => self.fields.push(Field::string(name, value)),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &TracingField, value: &str) {
        self.record_text(field, value.to_string());
    }

    fn record_error(&mut self, field: &TracingField, value: &(dyn Error + 'static)) {
        if field.name() == "error" {
            self.error = Some(EventError(crate::field::error_chain(value)));
        } else {
            self.fields.push(Field::named_error(field.name(), value));
        }
    }

    fn record_i64(&mut self, field: &TracingField, value: i64) {
        self.fields.push(Field::int64(field.name(), value));
    }

    fn record_u64(&mut self, field: &TracingField, value: u64) {
        self.fields.push(Field::uint64(field.name(), value));
    }

    fn record_f64(&mut self, field: &TracingField, value: f64) {
        self.fields.push(Field::float64(field.name(), value));
    }

    fn record_bool(&mut self, field: &TracingField, value: bool) {
        self.fields.push(Field::bool(field.name(), value));
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn fmt::Debug) {
        self.record_text(field, format!("{:?}", value));
    }
}

/// Install a global `tracing` subscriber that forwards every event to
/// `facade`.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with [`FacadeLayer`] (and, with
/// `enable_stdout`, a `fmt` layer) as the global default subscriber.
/// Fails if another global subscriber is already set.
pub fn install_tracing_bridge(facade: Arc<LogFacade>, config: BridgeConfig) -> Result<(), InitError> {
    let layer = FacadeLayer::new(facade).with_level(config.level);

    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogConfig;
    use crate::trace_id::{ContextTraceIdProvider, TraceparentProvider};
    use crate::writer::MemoryWriter;
    use std::io;

    fn facade() -> (Arc<LogFacade>, MemoryWriter) {
        let facade = Arc::new(LogFacade::new());
        let memory = MemoryWriter::new();
        let mut config = LogConfig::new("svc");
        config.level = "DEBUG".to_string();
        facade.init_with_writers(config, vec![Arc::new(memory.clone())]).unwrap();
        (facade, memory)
    }

    fn with_layer(layer: FacadeLayer, f: impl FnOnce()) {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn events_become_facade_records() {
        let (facade, memory) = facade();
        with_layer(FacadeLayer::new(facade), || {
            tracing::info!(target: "payments", user = "bob", attempts = 3u64, ok = true, "charge accepted");
            tracing::trace!(target: "payments", "fine grained");
        });

        let records = memory.records();
        assert_eq!(records.len(), 2);
        let first = &records[0];
        assert_eq!(first.level, Level::Info);
        assert_eq!(first.message, "charge accepted");
        assert_eq!(first.str_field("module"), Some("payments"));
        assert_eq!(first.str_field("user"), Some("bob"));
        assert_eq!(first.field("attempts"), Some(&serde_json::json!(3)));
        assert_eq!(first.field("ok"), Some(&serde_json::json!(true)));
        assert!(first.str_field("source").unwrap().starts_with("bridge.rs:"));
        assert_eq!(records[1].level, Level::Debug);
    }

    #[test]
    fn error_field_becomes_record_error() {
        let (facade, memory) = facade();
        with_layer(FacadeLayer::new(facade), || {
            let err = io::Error::new(io::ErrorKind::TimedOut, "upstream timed out");
            tracing::error!(target: "gateway", error = &err as &(dyn Error + 'static), "request failed");
        });

        let record = &memory.records()[0];
        assert_eq!(record.level, Level::Error);
        assert_eq!(record.str_field("error"), Some("upstream timed out"));
    }

    #[test]
    fn trace_fields_feed_resolution() {
        let (facade, memory) = facade();
        facade.register_provider(Arc::new(ContextTraceIdProvider));
        let layer = FacadeLayer::new(Arc::clone(&facade));
        with_layer(layer, || {
            tracing::warn!(target: "jobs", trace_id = "4bf92f3577b34da6a3ce929d0e0e4736", "retrying");
        });
        assert_eq!(memory.records()[0].str_field("trace_id"), Some("4bf92f3577b34da6a3ce929d0e0e4736"));

        facade.register_provider(Arc::new(TraceparentProvider));
        with_layer(FacadeLayer::new(Arc::clone(&facade)), || {
            tracing::warn!(
                target: "jobs",
                traceparent = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
                "retrying"
            );
        });
        assert_eq!(memory.records()[1].str_field("trace_id"), Some("0af7651916cd43dd8448eb211c80319c"));
    }

    #[test]
    fn own_events_and_low_levels_are_skipped() {
        let (facade, memory) = facade();
        let layer = FacadeLayer::new(facade).with_level(Level::Warn);
        let forwarded = Arc::clone(&layer.forwarded_events);
        with_layer(layer, || {
            tracing::error!(target: "tracing_log_facade::facade", "internal");
            tracing::info!(target: "app", "too quiet");
            tracing::warn!(target: "app", "kept");
        });
        assert_eq!(memory.len(), 1);
        assert_eq!(forwarded.load(Ordering::Relaxed), 1);
    }
}
