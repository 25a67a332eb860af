/// Final step of a fatal log call.
///
/// Backends write and flush the fatal record first, then hand over to the
/// terminator. Production code uses [`ProcessExit`]; tests substitute a
/// terminator that only records the request.
pub trait Terminator: Send + Sync {
    fn terminate(&self, code: i32);
}

/// Exit code used for fatal log calls.
pub const FATAL_EXIT_CODE: i32 = 1;

/// Ends the process with `std::process::exit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self, code: i32) {
        std::process::exit(code);
    }
}
