//! Rolling window of recently transcribed fragments.
//!
//! The window is the continuation context for the next page: its contents,
//! joined with `"\n"`, are appended to that page's prompt so the model can
//! finish a table, list, or paragraph that started earlier. Only the assembler
//! mutates it, and only after a page's fragment has been produced.

use std::collections::VecDeque;

/// Bounded FIFO of the most recent markdown fragments.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    capacity: usize,
    fragments: VecDeque<String>,
}

impl ContextWindow {
    /// Create an empty window. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            fragments: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a fragment, evicting the oldest one when full.
    pub fn push(&mut self, fragment: impl Into<String>) {
        if self.fragments.len() == self.capacity {
            self.fragments.pop_front();
        }
        self.fragments.push_back(fragment.into());
    }

    /// The window contents, oldest first, joined with `"\n"`.
    /// Empty when nothing has been pushed yet.
    pub fn joined(&self) -> String {
        let parts: Vec<&str> = self.fragments.iter().map(String::as_str).collect();
        parts.join("\n")
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fragments, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().map(String::as_str)
    }
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONTEXT_PAGES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_after_k_pushes_is_min_k_3() {
        let mut w = ContextWindow::default();
        for k in 1..=7 {
            w.push(format!("page {k}"));
            assert_eq!(w.len(), k.min(3), "after page {k}");
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let mut w = ContextWindow::new(3);
        for s in ["a", "b", "c", "d"] {
            w.push(s);
        }
        assert_eq!(w.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
        assert_eq!(w.joined(), "b\nc\nd");
    }

    #[test]
    fn empty_window_joins_to_empty_string() {
        let w = ContextWindow::default();
        assert!(w.is_empty());
        assert_eq!(w.joined(), "");
    }

    #[test]
    fn multi_line_fragments_are_kept_verbatim() {
        let mut w = ContextWindow::new(2);
        w.push("# Title\nHello");
        w.push("World");
        assert_eq!(w.joined(), "# Title\nHello\nWorld");
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut w = ContextWindow::new(0);
        assert_eq!(w.capacity(), 1);
        w.push("x");
        w.push("y");
        assert_eq!(w.joined(), "y");
    }
}
