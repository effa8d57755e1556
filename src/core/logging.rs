// src/core/logging.rs

//! The sink the engine writes its per-execution lines to.
//!
//! Internal tracing goes straight to the `log` facade like everywhere else in
//! the crate. The one line per executed command is different: callers render
//! it, and tests need to read it back, so it is written to an injected
//! [`LogSink`] instead.

use crate::constants::DISPATCH_LOG_TARGET;
use log::Level;
use std::cell::RefCell;

/// Receives the engine's structured log lines.
pub trait LogSink {
    fn record(&self, level: Level, line: &str);
}

/// Forwards every line to the `log` facade under the `cascade::dispatch` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFacadeSink;

impl LogSink for LogFacadeSink {
    fn record(&self, level: Level, line: &str) {
        log::log!(target: DISPATCH_LOG_TARGET, level, "{}", line);
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: RefCell<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn lines_at(&self, level: Level) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.borrow().iter().any(|(_, l)| l.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn record(&self, level: Level, line: &str) {
        self.lines.borrow_mut().push((level, line.to_string()));
    }
}

/// Renders one argument for a log line, hiding sensitive values.
pub(crate) fn render_value(value: &str, sensitive: bool, mask: &str) -> String {
    if sensitive {
        mask.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.record(Level::Info, "first");
        sink.record(Level::Debug, "second");

        assert_eq!(sink.lines(), vec!["first", "second"]);
        assert_eq!(sink.lines_at(Level::Info), vec!["first"]);
        assert!(sink.contains("sec"));
        assert!(!sink.contains("third"));
    }

    #[test]
    fn test_render_value_masks_sensitive_values() {
        assert_eq!(render_value("hunter2", true, "***"), "***");
        assert_eq!(render_value("alice", false, "***"), "alice");
    }
}
