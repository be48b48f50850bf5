//! Recall of previously sent inputs

use std::collections::VecDeque;

use ragdesk_common::{ClientStorage, StorageResult};
use tracing::debug;

/// Default number of remembered inputs
pub const DEFAULT_HISTORY_MAX: usize = 50;

/// Storage key for persisted history
pub const HISTORY_KEY: &str = "input_history";

/// Index of the live draft while navigating
pub const DRAFT_INDEX: isize = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    /// Toward older entries
    Up,
    /// Toward newer entries and finally the draft
    Down,
}

/// Bounded most-recent-first list of sent inputs with draft preservation
///
/// Index [`DRAFT_INDEX`] is the text being typed; index 0 is the most recent
/// entry.
#[derive(Debug, Clone)]
pub struct InputHistory {
    entries: VecDeque<String>,
    max: usize,
    index: isize,
    draft: String,
}

impl Default for InputHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_MAX)
    }
}

impl InputHistory {
    pub fn new(max: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max: max.max(1),
            index: DRAFT_INDEX,
            draft: String::new(),
        }
    }

    /// Build from entries ordered most recent first
    pub fn from_entries<I>(entries: I, max: usize) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut history = Self::new(max);
        let mut entries: Vec<String> = entries.into_iter().collect();
        entries.reverse();
        for entry in entries {
            history.add_to_history(&entry);
        }
        history
    }

    /// Load persisted history; unreadable data yields an empty history
    pub fn load(storage: &ClientStorage, max: usize) -> Self {
        let entries: Vec<String> = storage.get_lossy(HISTORY_KEY).unwrap_or_default();
        debug!("Loaded {} history entries", entries.len());
        Self::from_entries(entries, max)
    }

    pub fn save(&self, storage: &ClientStorage) -> StorageResult<()> {
        let entries: Vec<&str> = self.entries().collect();
        storage.set(HISTORY_KEY, &entries)
    }

    /// Remember a sent input
    ///
    /// Blank input is ignored. An existing copy moves to the front. Resets
    /// navigation and drops the saved draft.
    pub fn add_to_history(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.entries.retain(|entry| entry != text);
        self.entries.push_front(text.to_string());
        self.entries.truncate(self.max);
        self.reset_navigation();
        true
    }

    /// Keep the in-progress text so `Down` past the newest entry restores it
    ///
    /// Ignored once navigation has started.
    pub fn save_current_input(&mut self, text: &str) {
        if self.index == DRAFT_INDEX {
            self.draft = text.to_string();
        }
    }

    /// Move through the history, returning the text to show
    ///
    /// `None` means there is nothing to move to.
    pub fn navigate_history(&mut self, direction: HistoryDirection) -> Option<String> {
        match direction {
            HistoryDirection::Up => {
                let oldest = self.entries.len() as isize - 1;
                if oldest < 0 {
                    return None;
                }
                self.index = (self.index + 1).min(oldest);
                self.entries.get(self.index as usize).cloned()
            }
            HistoryDirection::Down => {
                if self.index == DRAFT_INDEX {
                    return None;
                }
                self.index -= 1;
                if self.index == DRAFT_INDEX {
                    Some(self.draft.clone())
                } else {
                    self.entries.get(self.index as usize).cloned()
                }
            }
        }
    }

    /// Leave navigation and forget the saved draft
    pub fn reset_navigation(&mut self) {
        self.index = DRAFT_INDEX;
        self.draft.clear();
    }

    pub fn index(&self) -> isize {
        self.index
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Entries, most recent first
    pub fn entries(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}
