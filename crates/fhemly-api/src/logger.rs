// Pluggable log sink
//
// The client reports connection, token and retry events through a
// `Logger` rather than calling `tracing` directly, so embedders can route
// them into their own logging facility.

use std::fmt;

use tracing::Level;

/// Leveled log sink used by [`FhemClient`](crate::FhemClient).
///
/// Only [`log`](Logger::log) is required; the per-level methods forward
/// to it.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, args: fmt::Arguments<'_>);

    fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::DEBUG, args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::INFO, args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::WARN, args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::ERROR, args);
    }
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _args: fmt::Arguments<'_>) {}
}

/// Forwards messages to `tracing` events under the `fhemly_api` target.
///
/// This is the default sink. It stays silent unless the application has
/// installed a subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if level == Level::ERROR {
            tracing::error!(target: "fhemly_api", "{args}");
        } else if level == Level::WARN {
            tracing::warn!(target: "fhemly_api", "{args}");
        } else if level == Level::INFO {
            tracing::info!(target: "fhemly_api", "{args}");
        } else if level == Level::DEBUG {
            tracing::debug!(target: "fhemly_api", "{args}");
        } else {
            tracing::trace!(target: "fhemly_api", "{args}");
        }
    }
}
