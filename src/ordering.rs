// ⏱️ Ordering - Total order over prepared items
//
// Feeds disagree about time: publication stamps can be coarse or edited,
// while the stream's own message ids only grow. Either can be the primary
// key, the other breaks ties, and the fingerprint makes the order total.

use crate::entities::StatusEvent;
use crate::parser::PreparedItem;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingStrategy {
    /// Publication time, then sequence number, then fingerprint
    #[default]
    PublishedThenSequence,

    /// Sequence number, then publication time, then fingerprint.
    /// Items without a sequence number come after all numbered items,
    /// ordered by publication time.
    SequenceThenPublished,
}

impl OrderingStrategy {
    pub fn compare(&self, a: &PreparedItem, b: &PreparedItem) -> Ordering {
        match self {
            OrderingStrategy::PublishedThenSequence => a
                .published
                .cmp(&b.published)
                .then_with(|| a.sequence.cmp(&b.sequence))
                .then_with(|| a.fingerprint.cmp(&b.fingerprint)),
            OrderingStrategy::SequenceThenPublished => {
                let a_key = (a.sequence.is_none(), a.sequence);
                let b_key = (b.sequence.is_none(), b.sequence);
                a_key
                    .cmp(&b_key)
                    .then_with(|| a.published.cmp(&b.published))
                    .then_with(|| a.fingerprint.cmp(&b.fingerprint))
            }
        }
    }

    /// Order of events inside one location's log.
    ///
    /// No fingerprint survives into the log, so events that compare equal
    /// keep their arrival order.
    pub fn compare_events(&self, a: &StatusEvent, b: &StatusEvent) -> Ordering {
        match self {
            OrderingStrategy::PublishedThenSequence => a.timestamp.cmp(&b.timestamp),
            OrderingStrategy::SequenceThenPublished => {
                let a_key = (a.sequence.is_none(), a.sequence);
                let b_key = (b.sequence.is_none(), b.sequence);
                a_key.cmp(&b_key).then_with(|| a.timestamp.cmp(&b.timestamp))
            }
        }
    }

    /// Sort items in processing order
    pub fn sort(&self, items: &mut [PreparedItem]) {
        items.sort_by(|a, b| self.compare(a, b));
    }
}

// ============================================================================
// TESTS
// ============================================================================
