use std::cell::RefCell;
use std::{sync::Arc, sync::OnceLock};

thread_local! {
    static THREAD_LOG_CONTEXT: RefCell<Option<String>> = const { RefCell::new(None) };
}

tokio::task_local! {
    /// Task-local logging context, scoped by the `safe4337_export` macro around async methods.
    pub static LOG_CONTEXT: RefCell<Option<String>>;
}

/// Receives log messages emitted by this crate.
///
/// Implemented by the host application (Rust or any `UniFFI` target language) and
/// installed once with [`set_logger`].
///
/// # Examples
///
/// ```rust
/// use safe4337::primitives::logger::{Logger, LogLevel};
///
/// struct StdoutLogger;
///
/// impl Logger for StdoutLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         println!("[{level:?}] {message}");
///     }
/// }
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing output.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of the pipeline.
    Info,
    /// Recoverable anomalies.
    Warn,
    /// Failures.
    Error,
}

/// Bridges the `log` facade to the installed [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let is_own_record = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("safe4337"));
        let is_verbose =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;

        // Dependencies (reqwest, hyper, ...) are chatty at debug level.
        if is_verbose && !is_own_record {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs the global logger.
///
/// Only the first call has an effect; later calls are ignored with a warning on stderr.
#[allow(clippy::module_name_repetitions)]
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return;
    }

    static LOGGER: ForeignLogger = ForeignLogger;
    if let Err(e) = log::set_logger(&LOGGER) {
        eprintln!("Failed to register logger: {e}");
        return;
    }
    log::set_max_level(log::LevelFilter::Trace);
}

/// Logs a trace-level message prefixed with the current [`LogContext`].
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::trace!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::trace!($($arg)*)
        }
    };
}

/// Logs a debug-level message prefixed with the current [`LogContext`].
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::debug!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::debug!($($arg)*)
        }
    };
}

/// Logs an info-level message prefixed with the current [`LogContext`].
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::info!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::info!($($arg)*)
        }
    };
}

/// Logs a warning prefixed with the current [`LogContext`].
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::warn!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::warn!($($arg)*)
        }
    };
}

/// Logs an error prefixed with the current [`LogContext`].
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::error!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::error!($($arg)*)
        }
    };
}

enum LogContextStorage {
    TaskLocal,
    ThreadLocal,
}

/// Scope guard setting the logging prefix until dropped.
///
/// ```rust
/// use safe4337::primitives::logger::{get_context, LogContext};
///
/// {
///     let _ctx = LogContext::new("Safe4337Pack");
///     assert_eq!(get_context().as_deref(), Some("[Safe4337][Safe4337Pack]"));
/// }
/// assert_eq!(get_context(), None);
/// ```
pub struct LogContext {
    previous: Option<String>,
    storage: LogContextStorage,
}

impl LogContext {
    /// Enters a logging context for `module`.
    #[must_use]
    pub fn new(module: &str) -> Self {
        let new_context = Some(format!("[Safe4337][{module}]"));

        match LOG_CONTEXT.try_with(|ctx| ctx.replace(new_context.clone())) {
            Ok(previous) => Self {
                previous,
                storage: LogContextStorage::TaskLocal,
            },
            Err(_) => Self {
                previous: THREAD_LOG_CONTEXT.with(|ctx| ctx.replace(new_context)),
                storage: LogContextStorage::ThreadLocal,
            },
        }
    }
}

impl Drop for LogContext {
    fn drop(&mut self) {
        let previous = self.previous.take();
        match self.storage {
            LogContextStorage::TaskLocal => {
                let _ = LOG_CONTEXT.try_with(|ctx| ctx.replace(previous));
            }
            LogContextStorage::ThreadLocal => {
                THREAD_LOG_CONTEXT.with(|ctx| ctx.replace(previous));
            }
        }
    }
}

/// Returns the active logging prefix, if any.
#[must_use]
pub fn get_context() -> Option<String> {
    LOG_CONTEXT
        .try_with(|ctx| ctx.borrow().clone())
        .unwrap_or_else(|_| THREAD_LOG_CONTEXT.with(|ctx| ctx.borrow().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_local_context_nests_and_restores() {
        assert_eq!(get_context(), None);
        {
            let _outer = LogContext::new("Safe4337Pack");
            {
                let _inner = LogContext::new("BundlerClient");
                assert_eq!(get_context().as_deref(), Some("[Safe4337][BundlerClient]"));
            }
            assert_eq!(get_context().as_deref(), Some("[Safe4337][Safe4337Pack]"));
        }
        assert_eq!(get_context(), None);
    }

    #[tokio::test]
    async fn test_task_local_context_survives_await() {
        LOG_CONTEXT
            .scope(RefCell::new(None), async {
                let _ctx = LogContext::new("Safe4337Pack");
                tokio::task::yield_now().await;
                assert_eq!(get_context().as_deref(), Some("[Safe4337][Safe4337Pack]"));
            })
            .await;
    }
}
