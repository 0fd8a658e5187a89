//! Injected diagnostics.
//!
//! Components never reach for a global logger directly. They receive a
//! [`Diagnostics`] handle at construction and report through it; the default
//! [`LogSink`] forwards to the `log` facade, while [`MemorySink`] keeps the
//! messages around so callers (and tests) can inspect them.

use parking_lot::Mutex;
use std::sync::Arc;

/// Severity of a collected diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
}

/// A single collected message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

/// Receiver for non-fatal events raised while reading or writing packages.
pub trait Diagnostics: Send + Sync {
    fn warn(&self, message: &str);

    fn info(&self, message: &str) {
        let _ = message;
    }
}

/// Shared handle passed between components.
pub type SharedDiagnostics = Arc<dyn Diagnostics>;

/// Forwards every event to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl Diagnostics for LogSink {
    fn warn(&self, message: &str) {
        log::warn!("{message}");
    }

    fn info(&self, message: &str) {
        log::info!("{message}");
    }
}

/// Collects events in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<Diagnostic>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected messages in arrival order.
    pub fn messages(&self) -> Vec<Diagnostic> {
        self.messages.lock().clone()
    }

    /// Only the warning texts.
    pub fn warnings(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|d| d.level == Level::Warn)
            .map(|d| d.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    pub fn shared(&self) -> SharedDiagnostics {
        Arc::new(self.clone())
    }

    fn push(&self, level: Level, message: &str) {
        self.messages.lock().push(Diagnostic {
            level,
            message: message.to_string(),
        });
    }
}

impl Diagnostics for MemorySink {
    fn warn(&self, message: &str) {
        self.push(Level::Warn, message);
    }

    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }
}

/// The sink used when a caller does not inject one.
pub fn default_sink() -> SharedDiagnostics {
    Arc::new(LogSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_shares_buffer_between_clones() {
        let sink = MemorySink::new();
        let shared = sink.shared();
        shared.warn("duplicate entry");
        shared.info("opened");

        assert_eq!(sink.warnings(), vec!["duplicate entry".to_string()]);
        assert_eq!(sink.messages().len(), 2);

        sink.clear();
        assert!(sink.messages().is_empty());
    }
}
