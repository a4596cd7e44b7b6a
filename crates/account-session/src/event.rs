//! Unified log-event stream
//!
//! Every session publishes typed log events onto a shared mpsc sink; the pool
//! forwards them to its broadcast channel for subscribers. Each event is also
//! mirrored to `tracing` at the matching level, so embedding processes get
//! structured logs without subscribing.

use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Severity of a [`LogEvent`]. `Stack` carries error detail (original error
/// chains) and maps to `error!` in tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
    Stack,
}

/// One entry on the pool's log-event stream.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub account: String,
    pub level: LogLevel,
    pub message: String,
}

/// Per-session emitter, cloned from the pool's shared sink at spawn time.
#[derive(Clone)]
pub(crate) struct LogSink {
    account: String,
    tx: mpsc::UnboundedSender<LogEvent>,
}

impl LogSink {
    pub(crate) fn new(account: String, tx: mpsc::UnboundedSender<LogEvent>) -> Self {
        Self { account, tx }
    }

    pub(crate) fn debug(&self, message: impl Into<String>) {
        self.emit(LogLevel::Debug, message.into());
    }

    pub(crate) fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message.into());
    }

    pub(crate) fn error(&self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message.into());
    }

    pub(crate) fn stack(&self, detail: impl Into<String>) {
        self.emit(LogLevel::Stack, detail.into());
    }

    fn emit(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Debug => debug!(account = %self.account, "{message}"),
            LogLevel::Info => info!(account = %self.account, "{message}"),
            LogLevel::Error | LogLevel::Stack => error!(account = %self.account, "{message}"),
        }
        // The pool (or a test) may already have dropped the receiver.
        let _ = self.tx.send(LogEvent {
            account: self.account.clone(),
            level,
            message,
        });
    }
}
