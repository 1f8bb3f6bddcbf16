//! Crash isolation for poller iterations: converts caught panics into
//! reportable errors and hands them to an injected crash-report sink.

use crate::ingest::types::OrchestratorState;
use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A panic caught at an iteration boundary, with the backtrace captured when
/// it was converted.
#[derive(Debug, Clone)]
pub struct PanicError {
    message: String,
    backtrace: Arc<String>,
}

impl PanicError {
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::new(panic_message(payload.as_ref()))
    }

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            backtrace: Arc::new(Backtrace::force_capture().to_string()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn backtrace(&self) -> &str {
        &self.backtrace
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "import session panicked: {}", self.message)
    }
}

impl std::error::Error for PanicError {}

/// Where a crash happened and what the orchestrator last knew.
#[derive(Debug, Clone)]
pub struct CrashContext {
    pub component: &'static str,
    pub last_state: OrchestratorState,
}

/// Crash-aggregation sink. Implementations must not block the caller; a
/// failed report is the sink's problem, never the poller's.
pub trait CrashReporter: Send + Sync + 'static {
    fn report(&self, error: &PanicError, context: &CrashContext);
}

/// Default sink. [`report_crash`] already logs the panic and its stack, so
/// this only records the context at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrashReporter;

impl CrashReporter for LogCrashReporter {
    fn report(&self, _error: &PanicError, context: &CrashContext) {
        tracing::warn!(
            target: "ledgersync::crash",
            component = context.component,
            core_sequence = context.last_state.core_sequence,
            history_sequence = context.last_state.history_sequence,
            "crash report recorded"
        );
    }
}

/// Logs the crash with its stack and forwards it to `reporter`, containing any
/// panic raised by the reporter itself.
pub(crate) fn report_crash(
    reporter: &dyn CrashReporter,
    error: &PanicError,
    context: &CrashContext,
) {
    tracing::error!(
        component = context.component,
        error = %error,
        stack = %error.backtrace(),
        "import session panicked"
    );

    let delivered =
        std::panic::catch_unwind(AssertUnwindSafe(|| reporter.report(error, context)));
    if let Err(payload) = delivered {
        tracing::warn!(
            panic = %panic_message(payload.as_ref()),
            "crash reporter panicked; report dropped"
        );
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
