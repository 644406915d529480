//! User-facing progress lines for the job console.

use std::sync::Mutex;

/// Sink for progress text shown on the job's console.
///
/// Appending never fails from the caller's point of view: implementations
/// swallow their own delivery errors so scheduling is never aborted by a
/// console hiccup.
pub trait ConsoleLog: Send + Sync {
    fn append(&self, line: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConsole;

impl ConsoleLog for NullConsole {
    fn append(&self, _line: &str) {}
}

/// Keeps lines in memory, in order.
#[derive(Debug, Default)]
pub struct BufferConsole {
    lines: Mutex<Vec<String>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl ConsoleLog for BufferConsole {
    fn append(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_keeps_order() {
        let console = BufferConsole::new();
        console.append("first");
        console.append("second");
        assert_eq!(console.lines(), vec!["first", "second"]);
        assert!(console.contains("sec"));
    }

    #[test]
    fn null_console_accepts_anything() {
        let console: &dyn ConsoleLog = &NullConsole;
        console.append("ignored");
    }
}
