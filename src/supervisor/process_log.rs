use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

pub const DEFAULT_LOG_LINES: usize = 200;

/// Bounded in-memory tail of the backend's combined stdout/stderr.
#[derive(Debug)]
pub struct ProcessLog {
    max_lines: usize,
    dropped_total: AtomicU64,
    lines: RwLock<VecDeque<String>>,
}

impl ProcessLog {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            dropped_total: AtomicU64::new(0),
            lines: RwLock::new(VecDeque::new()),
        }
    }

    pub fn push(&self, line: String) {
        let mut guard = self.lines.write().unwrap_or_else(|p| p.into_inner());
        guard.push_back(line);
        while guard.len() > self.max_lines {
            guard.pop_front();
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Last `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let guard = self.lines.read().unwrap_or_else(|p| p.into_inner());
        let start = guard.len().saturating_sub(n);
        guard.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.lines.write().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

impl Default for ProcessLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_LINES)
    }
}
