use std::collections::VecDeque;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::image::ImageHandle;

pub const BACKGROUND_REMOVED_PROMPT: &str = "Background removed";
pub const MANUAL_ADJUSTMENTS_PROMPT: &str = "Manual image adjustments";

/// How a history entry came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrigin {
    Generated,
    BackgroundRemoved,
    ManuallyAdjusted,
}

impl HistoryOrigin {
    /// Fixed prompt text for entries that were not produced from a user prompt.
    pub fn sentinel_prompt(self) -> Option<&'static str> {
        match self {
            Self::Generated => None,
            Self::BackgroundRemoved => Some(BACKGROUND_REMOVED_PROMPT),
            Self::ManuallyAdjusted => Some(MANUAL_ADJUSTMENTS_PROMPT),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::BackgroundRemoved => "background_removed",
            Self::ManuallyAdjusted => "manually_adjusted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub prompt: String,
    pub image: ImageHandle,
    pub origin: HistoryOrigin,
}

/// Newest-first list of image states.
///
/// Ordering is purely by insertion; `id` is a millisecond timestamp kept
/// strictly increasing so it can serve as a display key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    last_id: i64,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        origin: HistoryOrigin,
        prompt: String,
        image: ImageHandle,
    ) -> &HistoryEntry {
        let id = self.next_id(Utc::now().timestamp_millis());
        self.entries.push_front(HistoryEntry {
            id,
            prompt,
            image,
            origin,
        });
        &self.entries[0]
    }

    pub fn entries(&self) -> impl ExactSizeIterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry. Ids keep increasing afterwards.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn next_id(&mut self, now_ms: i64) -> i64 {
        let id = now_ms.max(self.last_id + 1);
        self.last_id = id;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::{History, HistoryOrigin, BACKGROUND_REMOVED_PROMPT, MANUAL_ADJUSTMENTS_PROMPT};
    use crate::image::ImageHandle;

    fn image(byte: u8) -> ImageHandle {
        ImageHandle::new(vec![byte], "image/png")
    }

    #[test]
    fn record_prepends_newest_first() {
        let mut history = History::new();
        history.record(HistoryOrigin::Generated, "first".to_string(), image(1));
        history.record(HistoryOrigin::Generated, "second".to_string(), image(2));

        let prompts: Vec<&str> = history.entries().map(|entry| entry.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["second", "first"]);
        assert_eq!(history.latest().map(|entry| entry.image.clone()), Some(image(2)));
    }

    #[test]
    fn ids_stay_strictly_increasing_when_clock_stalls_or_rewinds() {
        let mut history = History::new();
        assert_eq!(history.next_id(1_000), 1_000);
        assert_eq!(history.next_id(1_000), 1_001);
        assert_eq!(history.next_id(900), 1_002);
        assert_eq!(history.next_id(5_000), 5_000);
    }

    #[test]
    fn clear_keeps_id_sequence_monotonic() {
        let mut history = History::new();
        let first = history
            .record(HistoryOrigin::Generated, "a".to_string(), image(1))
            .id;
        history.clear();
        assert!(history.is_empty());
        let second = history
            .record(HistoryOrigin::ManuallyAdjusted, "b".to_string(), image(2))
            .id;
        assert!(second > first);
    }

    #[test]
    fn sentinel_prompts_match_origins() {
        assert_eq!(HistoryOrigin::Generated.sentinel_prompt(), None);
        assert_eq!(
            HistoryOrigin::BackgroundRemoved.sentinel_prompt(),
            Some(BACKGROUND_REMOVED_PROMPT)
        );
        assert_eq!(
            HistoryOrigin::ManuallyAdjusted.sentinel_prompt(),
            Some(MANUAL_ADJUSTMENTS_PROMPT)
        );
    }
}
