use crate::context::Context;
use crate::field::Field;
use std::error::Error;

/// Capability set every logging backend implements.
///
/// All methods are one-way: they return nothing and must not panic or
/// block on a failing sink. A backend that cannot write swallows or
/// reports the failure internally. The one exception is [`Logger::fatal`],
/// which ends the process once the record is out.
///
/// Methods are `#[track_caller]` so backends can tag records with the
/// caller's location without walking the stack.
pub trait Logger: Send + Sync {
    #[track_caller]
    fn debug(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]);

    #[track_caller]
    fn info(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]);

    #[track_caller]
    fn warn(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]);

    /// Error-level record. `err` of `None` attaches no error field.
    #[track_caller]
    fn error(&self, ctx: &Context, module: &str, message: &str, err: Option<&dyn Error>, fields: &[Field]);

    /// Error-level record tagged with an application error code.
    #[track_caller]
    fn error_with_code(
        &self,
        ctx: &Context,
        module: &str,
        message: &str,
        error_code: &str,
        err: Option<&dyn Error>,
        fields: &[Field],
    );

    /// Emit at fatal level, flush, then terminate the process with a
    /// non-zero status.
    #[track_caller]
    fn fatal(&self, ctx: &Context, module: &str, message: &str, err: Option<&dyn Error>, fields: &[Field]);

    #[track_caller]
    fn info_with_request(&self, ctx: &Context, module: &str, message: &str, request: RequestInfo<'_>, fields: &[Field]);

    #[track_caller]
    fn error_with_request(
        &self,
        ctx: &Context,
        module: &str,
        message: &str,
        request: RequestInfo<'_>,
        err: Option<&dyn Error>,
        fields: &[Field],
    );
}

/// Request metadata for [`Logger::info_with_request`] and
/// [`Logger::error_with_request`].
///
/// An empty request id is treated as absent, and so is a cost that is not
/// strictly positive: "not measured" and "took 0 ms" render the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestInfo<'a> {
    request_id: Option<&'a str>,
    cost_ms: Option<i64>,
}

impl<'a> RequestInfo<'a> {
    pub fn new(request_id: &'a str, cost_ms: i64) -> Self {
        RequestInfo::default().with_request_id(request_id).with_cost_ms(cost_ms)
    }

    pub fn with_request_id(mut self, request_id: &'a str) -> Self {
        self.request_id = Some(request_id).filter(|id| !id.is_empty());
        self
    }

    pub fn with_cost_ms(mut self, cost_ms: i64) -> Self {
        self.cost_ms = Some(cost_ms).filter(|ms| *ms > 0);
        self
    }

    pub fn request_id(&self) -> Option<&'a str> {
        self.request_id
    }

    pub fn cost_ms(&self) -> Option<i64> {
        self.cost_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_non_positive_values_are_absent() {
        let info = RequestInfo::new("", 0);
        assert_eq!(info.request_id(), None);
        assert_eq!(info.cost_ms(), None);

        let info = RequestInfo::new("req-1", -5);
        assert_eq!(info.request_id(), Some("req-1"));
        assert_eq!(info.cost_ms(), None);

        assert_eq!(RequestInfo::new("req-2", 12).cost_ms(), Some(12));
    }
}
