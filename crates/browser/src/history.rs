//! Session history with per-entry restoration data.
//!
//! Invariants:
//! - `index < entries.len()` whenever the history is non-empty.
//! - Every entry has its own restoration id; restoration data outlives
//!   traversal but is dropped with entries truncated by a push.
use core_types::ScrollPosition;
use std::collections::HashMap;
use url::Url;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub location: Url,
    pub restoration_id: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RestorationData {
    pub scroll_position: Option<ScrollPosition>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryMethod {
    Push,
    Replace,
}

#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
    index: usize,
    restoration: HashMap<String, RestorationData>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.index)
    }

    pub fn location(&self) -> Option<&Url> {
        self.current().map(|e| &e.location)
    }

    pub fn restoration_id(&self) -> Option<&str> {
        self.current().map(|e| e.restoration_id.as_str())
    }

    pub fn update(&mut self, method: HistoryMethod, location: Url) -> &HistoryEntry {
        match method {
            HistoryMethod::Push => self.push(location),
            HistoryMethod::Replace => self.replace(location),
        }
    }

    /// Add an entry after the current one, dropping any forward entries.
    pub fn push(&mut self, location: Url) -> &HistoryEntry {
        if !self.entries.is_empty() {
            for dropped in self.entries.drain(self.index + 1..) {
                self.restoration.remove(&dropped.restoration_id);
            }
        }
        self.entries.push(HistoryEntry {
            location,
            restoration_id: Uuid::new_v4().to_string(),
        });
        self.index = self.entries.len() - 1;
        log::debug!(target: "browser.history", "push #{} {}", self.index, self.entries[self.index].location);
        &self.entries[self.index]
    }

    /// Overwrite the current entry; pushes when the history is empty.
    pub fn replace(&mut self, location: Url) -> &HistoryEntry {
        if self.entries.is_empty() {
            return self.push(location);
        }
        let entry = HistoryEntry {
            location,
            restoration_id: Uuid::new_v4().to_string(),
        };
        let old = std::mem::replace(&mut self.entries[self.index], entry);
        self.restoration.remove(&old.restoration_id);
        log::debug!(target: "browser.history", "replace #{} {}", self.index, self.entries[self.index].location);
        &self.entries[self.index]
    }

    pub fn can_go_back(&self) -> bool {
        !self.entries.is_empty() && self.index > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn back(&mut self) -> Option<&HistoryEntry> {
        if !self.can_go_back() {
            return None;
        }
        self.index -= 1;
        self.entries.get(self.index)
    }

    pub fn forward(&mut self) -> Option<&HistoryEntry> {
        if !self.can_go_forward() {
            return None;
        }
        self.index += 1;
        self.entries.get(self.index)
    }

    pub fn restoration_data(&self, restoration_id: &str) -> Option<&RestorationData> {
        self.restoration.get(restoration_id)
    }

    /// Record the scroll position of the current entry.
    pub fn save_scroll(&mut self, position: ScrollPosition) {
        let Some(id) = self.restoration_id().map(str::to_string) else {
            return;
        };
        self.restoration.entry(id).or_default().scroll_position = Some(position);
    }
}
