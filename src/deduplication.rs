// 🔍 Deduplication - Duplicate items and duplicate events
//
// Two levels:
// 1. Items: a feed page may carry the same notice twice → process once
// 2. Events: re-running over an already processed feed re-detects the same
//    (timestamp, status) pairs → policy decides whether they are appended

use crate::parser::PreparedItem;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

// ============================================================================
// DUPLICATE EVENT POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Drop an event whose (timestamp, status) already exists in the log.
    /// Makes re-processing the same feed idempotent.
    #[default]
    Suppress,

    /// Append every detection, even repeats of an already logged event
    Accumulate,
}

impl DuplicatePolicy {
    pub fn suppresses(&self) -> bool {
        matches!(self, DuplicatePolicy::Suppress)
    }
}

// ============================================================================
// ITEM FINGERPRINTS
// ============================================================================

/// Fingerprint of one notice: SHA-256 over publication string + normalized text.
///
/// NOTE: this is for DEDUPLICATION only. Two edits of the same message with
/// different text are different items.
pub fn item_fingerprint(published: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(published.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Keep the first occurrence of every fingerprint.
///
/// Returns the surviving items (input order preserved) and how many were dropped.
pub fn dedup_items(items: Vec<PreparedItem>) -> (Vec<PreparedItem>, usize) {
    let mut seen = HashSet::new();
    let before = items.len();

    let unique: Vec<PreparedItem> = items
        .into_iter()
        .filter(|item| seen.insert(item.fingerprint.clone()))
        .collect();

    let dropped = before - unique.len();
    (unique, dropped)
}

// ============================================================================
// TESTS
// ============================================================================
