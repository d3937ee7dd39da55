//! Bounded buffer of recent gateway output lines

use regex::Regex;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::LazyLock;

/// Default number of lines retained
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// CSI escape sequences (colors, cursor movement, erase)
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").expect("valid ANSI escape pattern")
});

/// Remove ANSI escape sequences from a line of output
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}

/// Fixed-capacity FIFO of output lines. The oldest line is dropped once
/// capacity is reached.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// Copy of the buffered lines, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
