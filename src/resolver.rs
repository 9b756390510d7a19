// 🧭 Entity Resolver - Which locations does a notice talk about?
//
// Two passes over every text:
// a) "Name (… CODE)" mentions: confirmed name → code pairs, learned into
//    the directory on the spot
// b) Bare names: every directory name whose inflection pattern occurs,
//    including names learned in pass (a) from the same text
//
// Candidates are keyed by EntityKey; when both passes produce the same key
// the pass (a) candidate is kept.

use crate::entities::{EntityKey, NameDirectory};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Capitalised word run right before a parenthesised 4-letter code
fn code_mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?P<name>\p{Lu}[\p{L}-]*(?:[ \t\u{2013}\u{2014}-]+\p{Lu}[\p{L}-]*)*)\s*\([^)]*?\b(?P<code>[A-Z]{4})\)",
        )
        .expect("valid code mention regex")
    })
}

/// Words that introduce a name rather than belong to it
fn is_descriptor(word: &str) -> bool {
    let lower = word.to_lowercase();
    word.chars().count() <= 2 || lower.starts_with("аэропорт") || lower.starts_with("airport")
}

// ============================================================================
// CANDIDATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub key: EntityKey,
    pub name: String,
    pub identifier: Option<String>,
}

impl Candidate {
    pub fn new(name: &str, identifier: Option<&str>) -> Self {
        Candidate {
            key: EntityKey::resolve(name, identifier),
            name: name.to_string(),
            identifier: identifier.map(str::to_string),
        }
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

#[derive(Debug, Default)]
pub struct EntityResolver;

impl EntityResolver {
    pub fn new() -> Self {
        EntityResolver
    }

    /// Candidates mentioned in `text`, sorted by key.
    ///
    /// Learns every "name (CODE)" pair into `directory` before matching
    /// bare names, so the result depends only on the text and the
    /// directory state passed in.
    pub fn resolve(&self, text: &str, directory: &mut NameDirectory) -> Vec<Candidate> {
        let mut found: BTreeMap<EntityKey, Candidate> = BTreeMap::new();

        // Pass a: name + code
        for (name, code) in self.code_mentions(text, directory) {
            if directory.learn(&name, Some(&code)) {
                debug!(name = %name, code = %code, "learned name from mention");
            }
            let candidate = Candidate::new(&name, Some(&code));
            found.entry(candidate.key.clone()).or_insert(candidate);
        }

        // Pass b: bare names
        for entry in directory.mentioned_in(text) {
            let candidate = Candidate::new(&entry.name, entry.identifier.as_deref());
            found.entry(candidate.key.clone()).or_insert(candidate);
        }

        found.into_values().collect()
    }

    /// Raw "name (… CODE)" pairs in order of appearance
    pub fn code_mentions(&self, text: &str, directory: &NameDirectory) -> Vec<(String, String)> {
        code_mention_regex()
            .captures_iter(text)
            .filter_map(|caps| {
                let name = self.extract_name(&caps["name"], directory)?;
                Some((name, caps["code"].to_string()))
            })
            .collect()
    }

    /// Trim the captured word run down to the location name.
    ///
    /// The longest trailing word sequence already known to the directory
    /// wins; otherwise leading descriptor words ("Аэропорт", "В") are dropped.
    fn extract_name(&self, captured: &str, directory: &NameDirectory) -> Option<String> {
        let words: Vec<&str> = captured
            .split(|c: char| c.is_whitespace() || c == '\u{2013}' || c == '\u{2014}')
            .map(|w| w.trim_matches('-'))
            .filter(|w| !w.is_empty())
            .collect();

        for start in 0..words.len() {
            let suffix = words[start..].join(" ");
            if directory.contains(&suffix) {
                return Some(suffix);
            }
        }

        let start = words
            .iter()
            .position(|w| !is_descriptor(w))
            .unwrap_or(words.len());
        if start == words.len() {
            return None;
        }

        Some(words[start..].join(" "))
    }
}

// ============================================================================
// TESTS
// ============================================================================
