use serde::Serialize;

/// Per-unit navigation history with a cursor.
///
/// `index()` is `None` until the first `push`, and afterwards always points
/// inside `entries`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct NavigationHistory {
    entries: Vec<String>,
    index: Option<usize>,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything after the cursor, appends `url` and moves onto it.
    pub fn push(&mut self, url: &str) {
        if let Some(index) = self.index {
            self.entries.truncate(index + 1);
        }
        self.entries.push(url.to_string());
        self.index = Some(self.entries.len() - 1);
    }

    /// Steps back one entry. `None` at the start of history.
    pub fn back(&mut self) -> Option<&str> {
        match self.index {
            Some(index) if index > 0 => {
                self.index = Some(index - 1);
                self.current()
            }
            _ => None,
        }
    }

    /// Steps forward one entry. `None` at the end of history.
    pub fn forward(&mut self) -> Option<&str> {
        match self.index {
            Some(index) if index + 1 < self.entries.len() => {
                self.index = Some(index + 1);
                self.current()
            }
            _ => None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.index
            .and_then(|i| self.entries.get(i))
            .map(String::as_str)
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
