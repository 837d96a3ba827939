//! Unread message counts keyed by peer.

use std::{collections::BTreeMap, num::NonZeroU32};

/// Unread counts keyed by peer username.
///
/// # Invariants
///
/// - Every stored count is at least 1. Absence means zero; there is no
///   explicit zero entry.
/// - Only [`increment`](Self::increment) and [`clear`](Self::clear) mutate
///   counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationAggregator {
    counts: BTreeMap<String, NonZeroU32>,
}

impl NotificationAggregator {
    /// Empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one unread message for `peer`. Returns the new count.
    pub fn increment(&mut self, peer: &str) -> u32 {
        let count = match self.counts.get(peer) {
            Some(count) => count.saturating_add(1),
            None => NonZeroU32::MIN,
        };
        self.counts.insert(peer.to_string(), count);
        count.get()
    }

    /// Remove the entry for `peer`. Returns the count it held.
    pub fn clear(&mut self, peer: &str) -> Option<u32> {
        self.counts.remove(peer).map(NonZeroU32::get)
    }

    /// Unread count for `peer`. `None` means no unread messages.
    pub fn get(&self, peer: &str) -> Option<u32> {
        self.counts.get(peer).map(|count| count.get())
    }

    /// Peers with unread messages, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(peer, count)| (peer.as_str(), count.get()))
    }

    /// Sum of all unread counts.
    pub fn total(&self) -> u64 {
        self.counts.values().map(|count| u64::from(count.get())).sum()
    }

    /// Whether no peer has unread messages.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_creates_then_grows() {
        let mut unread = NotificationAggregator::new();

        assert_eq!(unread.increment("bob"), 1);
        assert_eq!(unread.increment("bob"), 2);
        assert_eq!(unread.increment("carol"), 1);

        assert_eq!(unread.get("bob"), Some(2));
        assert_eq!(unread.total(), 3);
    }

    #[test]
    fn clear_removes_entry() {
        let mut unread = NotificationAggregator::new();
        unread.increment("bob");

        assert_eq!(unread.clear("bob"), Some(1));
        assert_eq!(unread.get("bob"), None);
        assert!(unread.is_empty());
        assert_eq!(unread.clear("bob"), None);
    }

    #[test]
    fn iteration_is_sorted() {
        let mut unread = NotificationAggregator::new();
        unread.increment("zed");
        unread.increment("amy");

        let peers: Vec<_> = unread.iter().collect();
        assert_eq!(peers, [("amy", 1), ("zed", 1)]);
    }
}
