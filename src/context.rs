use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Key under which [`Context::with_trace_id`] stores an explicit trace id.
pub const TRACE_ID_KEY: &str = "trace_id";

/// Key under which [`Context::with_traceparent`] stores a W3C
/// `traceparent` header value.
pub const TRACEPARENT_KEY: &str = "traceparent";

/// Request-scoped context passed to every logging call.
///
/// Carries string values set by the request plumbing (trace ids, header
/// values) for trace-id providers to read, plus an optional deadline that
/// backends honour for network work. Cloning is cheap: values are shared.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: Arc<BTreeMap<String, String>>,
    deadline: Option<Instant>,
}

impl Context {
    /// Empty context with no values and no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_value(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut values = (*self.values).clone();
        values.insert(key.into(), value.into());
        Context { values: Arc::new(values), deadline: self.deadline }
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn with_trace_id(&self, trace_id: impl Into<String>) -> Self {
        self.with_value(TRACE_ID_KEY, trace_id)
    }

    pub fn with_traceparent(&self, header: impl Into<String>) -> Self {
        self.with_value(TRACEPARENT_KEY, header)
    }

    /// Derived context whose deadline is the earlier of `deadline` and the
    /// current one.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Context { values: Arc::clone(&self.values), deadline: Some(deadline) }
    }

    /// Derived context expiring `timeout` from now. A timeout past the
    /// representable range (e.g. `Duration::MAX`) keeps the current deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_scoped_to_derived_contexts() {
        let root = Context::background();
        let child = root.with_trace_id("abc");
        assert_eq!(child.value(TRACE_ID_KEY), Some("abc"));
        assert_eq!(root.value(TRACE_ID_KEY), None);
    }

    #[test]
    fn deadline_only_tightens() {
        let now = Instant::now();
        let ctx = Context::background().with_deadline(now + Duration::from_secs(5));
        let looser = ctx.with_deadline(now + Duration::from_secs(60));
        assert_eq!(looser.deadline(), Some(now + Duration::from_secs(5)));
        let tighter = ctx.with_deadline(now + Duration::from_secs(1));
        assert_eq!(tighter.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn unbounded_timeout_keeps_deadline() {
        let open = Context::background().with_timeout(Duration::MAX);
        assert_eq!(open.deadline(), None);
        assert!(!open.is_expired());

        let bounded = Context::background().with_timeout(Duration::from_secs(30));
        let still = bounded.with_timeout(Duration::MAX);
        assert_eq!(still.deadline(), bounded.deadline());
    }

    #[test]
    fn past_deadline_is_expired() {
        let ctx = Context::background().with_deadline(Instant::now());
        assert!(ctx.is_expired());
        assert!(!Context::background().is_expired());
    }
}
