use crate::context::{Context, TRACEPARENT_KEY, TRACE_ID_KEY};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;

/// Source of correlation ids for an external tracing system.
///
/// Any tracer (OpenTelemetry, Jaeger, SkyWalking, an in-house header
/// convention) can plug in by implementing this trait and registering it
/// with [`TraceIdResolver::register`].
pub trait TraceIdProvider: Send + Sync {
    /// Trace id carried by `ctx`, or `None` if the context has none.
    ///
    /// The value is used verbatim; validating its format is the
    /// provider's job.
    fn trace_id(&self, ctx: &Context) -> Option<String>;

    /// Human-readable provider name, for diagnostics.
    fn name(&self) -> &str;
}

/// Process-wide provider slot plus the fallback generator.
///
/// The slot sits behind a read/write lock: resolution takes a read lock
/// just long enough to clone the `Arc`, and `register` swaps the whole
/// reference under the write lock. Concurrent `register` calls serialize on
/// that lock and the last one wins; no reader ever sees a torn value.
#[derive(Default)]
pub struct TraceIdResolver {
    provider: RwLock<Option<Arc<dyn TraceIdProvider>>>,
}

impl TraceIdResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registered provider.
    pub fn register(&self, provider: Arc<dyn TraceIdProvider>) {
        tracing::debug!(provider = provider.name(), "trace id provider registered");
        *self.provider.write() = Some(provider);
    }

    pub fn clear(&self) {
        *self.provider.write() = None;
    }

    pub fn provider(&self) -> Option<Arc<dyn TraceIdProvider>> {
        self.provider.read().clone()
    }

    pub fn provider_name(&self) -> Option<String> {
        self.provider.read().as_ref().map(|p| p.name().to_string())
    }

    /// Trace id from the registered provider, or a freshly generated one.
    ///
    /// Never returns an empty string and never blocks on I/O.
    pub fn resolve_or_create(&self, ctx: &Context) -> String {
        let provider = self.provider();
        if let Some(provider) = provider {
            if let Some(id) = provider.trace_id(ctx) {
                if !id.is_empty() {
                    return id;
                }
            }
        }
        new_trace_id()
    }
}

/// Fresh W3C-compatible trace id: 128 bits from the operating system's
/// CSPRNG as 32 lowercase hex characters.
///
/// # Panics
///
/// Panics if the OS random source fails; without it no trace id can be
/// produced.
pub fn new_trace_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Reads an explicit id stored with [`Context::with_trace_id`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextTraceIdProvider;

impl TraceIdProvider for ContextTraceIdProvider {
    fn trace_id(&self, ctx: &Context) -> Option<String> {
        ctx.value(TRACE_ID_KEY).map(str::to_string)
    }

    fn name(&self) -> &str {
        "context"
    }
}

/// Extracts the trace-id component of a W3C `traceparent` header stored
/// with [`Context::with_traceparent`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceparentProvider;

impl TraceIdProvider for TraceparentProvider {
    fn trace_id(&self, ctx: &Context) -> Option<String> {
        ctx.value(TRACEPARENT_KEY).and_then(parse_traceparent)
    }

    fn name(&self) -> &str {
        "w3c-traceparent"
    }
}

/// `00-<trace_id>-<span_id>-<flags>` → `trace_id`, if well formed and not
/// the all-zero invalid id.
pub fn parse_traceparent(header: &str) -> Option<String> {
    let mut parts = header.trim().split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let is_hex = |s: &str, len: usize| {
        s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    };
    if version != "00" || !is_hex(trace_id, 32) || !is_hex(span_id, 16) || !is_hex(flags, 2) {
        return None;
    }
    if trace_id.bytes().all(|b| b == b'0') {
        return None;
    }
    Some(trace_id.to_string())
}
