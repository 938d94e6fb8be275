use std::collections::VecDeque;

pub const HISTORY_CAPACITY: usize = 3;

/// The last few captions shown, newest first. Identical captions are kept;
/// only the capacity evicts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptionHistory {
    entries: VecDeque<String>,
}

impl CaptionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, caption: String) {
        self.entries.push_front(caption);
        self.entries.truncate(HISTORY_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Everything except the newest entry, which is the caption on screen.
    /// Empty until there are at least two entries.
    pub fn previous(&self) -> impl Iterator<Item = &str> {
        self.iter().skip(1)
    }
}
